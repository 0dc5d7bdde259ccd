//! Provenance verification for script invocations
//!
//! A request is attributable when its signature is the base64 HMAC-SHA256 of
//! the canonical claim and timestamp under a shared secret. Verification is
//! opt-in: missing inputs mean "unverified", never an error.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::script::ScriptDefinition;

type HmacSha256 = Hmac<Sha256>;

/// Canonical claim describing an invocation of `script`.
pub fn claim_for(script: &ScriptDefinition) -> String {
    format!(
        "MoScript {} triggered={} sass={}",
        script.id, script.trigger, script.strict_scan
    )
}

/// Payload covered by a provenance signature.
pub fn signing_message(claim: &str, timestamp: &str) -> String {
    format!("{claim}\n{timestamp}")
}

/// Compute the base64 HMAC-SHA256 of `message` under `secret`.
pub fn sign(message: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(message.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Check `signature` against `message` and `secret`.
///
/// Returns `false` for an absent or empty signature or secret, an undecodable
/// signature, or a mismatch. The comparison runs in constant time.
pub fn verify(message: &str, signature: Option<&str>, secret: Option<&str>) -> bool {
    let (signature, secret) = match (signature, secret) {
        (Some(sig), Some(sec)) if !sig.is_empty() && !sec.is_empty() => (sig, sec),
        _ => return false,
    };

    let signature_bytes = match STANDARD.decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(message.as_bytes());

    mac.verify_slice(&signature_bytes).is_ok()
}
