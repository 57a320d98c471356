//! HMAC-SHA256 signature verification for inbound payment webhooks.
//!
//! The payment provider signs the raw request body with a shared secret and
//! puts the hex-encoded HMAC-SHA256 digest in a signature header. Verification
//! recomputes the digest over the exact bytes received and compares it to the
//! claimed signature in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Policy applied when no shared secret is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretPolicy {
    /// Reject every request. This is the default.
    FailClosed,
    /// Accept every request without verification. Explicit opt-in for
    /// development environments only; every accepted request is logged.
    FailOpen,
}

/// Verifies that an inbound notification was signed with the shared secret.
pub struct SignatureVerifier {
    secret: Option<Vec<u8>>,
    policy: SecretPolicy,
}

impl SignatureVerifier {
    /// An empty secret counts as unset.
    pub fn new(secret: Option<String>, policy: SecretPolicy) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(String::into_bytes),
            policy,
        }
    }

    /// Whether inbound requests must carry a signature header.
    pub fn requires_signature(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a hex-encoded HMAC-SHA256 signature over the raw request body.
    ///
    /// Never panics on malformed input; anything that is not the expected
    /// digest is simply `false`.
    pub fn verify(&self, body: &[u8], claimed: &str) -> bool {
        let Some(secret) = &self.secret else {
            return match self.policy {
                SecretPolicy::FailClosed => false,
                SecretPolicy::FailOpen => {
                    tracing::warn!("no webhook secret configured, accepting unverified request (fail-open)");
                    true
                }
            };
        };

        let expected = match sign(body, secret) {
            Some(s) => s,
            None => return false,
        };

        constant_time_eq(expected.as_bytes(), claimed.trim().as_bytes())
    }
}

/// Compute the hex-encoded HMAC-SHA256 digest of `body` under `secret`.
pub fn sign(body: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(hex_encode(&mac.finalize().into_bytes()))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
