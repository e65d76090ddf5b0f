use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the webhook body signature: lowercase hex of HMAC-SHA256(secret, body).
pub fn generate_signature(secret: &[u8], body: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(body);
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a hex body signature using constant-time comparison.
///
/// The provided signature is compared case-insensitively as hex; anything that
/// is not the exact digest of `body` under `secret` is rejected.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected_signature = generate_signature(secret, body)?;
    let provided = signature.trim().to_ascii_lowercase();

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = provided.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}
