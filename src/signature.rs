use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::error;

type HmacSha1 = Hmac<Sha1>;

/// Prefix of every signature header value
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Lowercase hex HMAC-SHA1 of `body` keyed by `secret`.
/// Returns None for an empty secret: the payload then goes out unsigned.
pub fn hmac_sha1_hex(secret: &str, body: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Header value (`sha1=<hex>`) for `body`, if a secret is configured
pub fn signature_header_value(secret: &str, body: &[u8]) -> Option<String> {
    hmac_sha1_hex(secret, body).map(|digest| format!("{SIGNATURE_PREFIX}{digest}"))
}

/// Checks a `sha1=<hex>` header against the received body
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(signature) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);

    match hex_decode(signature) {
        Ok(signature_bytes) => mac.verify_slice(&signature_bytes).is_ok(),
        Err(_) => {
            error!("Signature is not valid hex");
            false
        }
    }
}
