use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use saferide_core::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the gateway's signature: `t=<unix>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "pay-signature";

/// Compute the hex signature over `{timestamp}.{payload}`. Used by the test
/// suite to forge valid deliveries; the gateway does the same on its side.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={timestamp},v1={}", sign(secret, timestamp, payload))
}

/// Verify a signature header against the raw payload.
///
/// Rejects malformed headers, stale timestamps (replay prevention) and
/// signatures that do not match; the comparison itself is constant-time via
/// the hmac verifier.
pub fn verify(
    secret: &str,
    header: &str,
    payload: &[u8],
    tolerance_seconds: i64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let mut timestamp: Option<i64> = None;
    let mut provided: Option<Vec<u8>> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            Some(("v1", value)) => {
                provided = hex::decode(value).ok();
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| EngineError::validation("malformed signature header"))?;
    let provided =
        provided.ok_or_else(|| EngineError::validation("malformed signature header"))?;

    let age = (now.timestamp() - timestamp).abs();
    if age > tolerance_seconds {
        return Err(EngineError::Authorization(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&provided)
        .map_err(|_| EngineError::Authorization("signature mismatch".to_string()))
}
