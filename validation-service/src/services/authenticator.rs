use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::utils::signature::verify_signature;

/// Header carrying hex(HMAC-SHA256(secret, body)) on push notifications.
pub const SIGNATURE_HEADER: &str = "X-Gogs-Signature";

/// Checks that push bodies were signed with the shared hook secret.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    secret: Secret<String>,
}

impl WebhookAuthenticator {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        let Some(signature) = signature else {
            tracing::warn!("Push notification without signature header");
            return Err(AppError::BadRequest(anyhow::anyhow!("Missing signature")));
        };

        let valid = verify_signature(self.secret.expose_secret().as_bytes(), body, signature)
            .map_err(AppError::InternalError)?;
        if !valid {
            tracing::warn!(body_len = body.len(), "Push notification signature mismatch");
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid signature")));
        }
        Ok(())
    }
}
