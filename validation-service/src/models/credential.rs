use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use secrecy::Secret;

/// Opaque token for acting on the remote host on behalf of `username`.
#[derive(Debug, Clone)]
pub struct AccessCredential {
    pub username: String,
    pub token: Secret<String>,
}

impl AccessCredential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: Secret::new(token.into()),
        }
    }
}

/// Browser session bound to a stored credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

const SESSION_ID_BYTES: usize = 64;

impl Session {
    /// Mint a session with a 512-bit random identifier.
    pub fn generate(username: impl Into<String>, ttl_days: i64) -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);

        Self {
            id: URL_SAFE_NO_PAD.encode(bytes),
            username: username.into(),
            expires_at: Utc::now() + Duration::days(ttl_days),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
