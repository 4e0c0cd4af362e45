//! Message digest strategy used to bind a token to a body

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Label carried in the `hash-alg` claim by [`Sha256Hasher`]
pub const SHA256_LABEL: &str = "SHA256";

/// Computes the body hash embedded in signed tokens.
///
/// The signer and the verifier must agree on the implementation: the verifier
/// rejects tokens whose `hash-alg` claim differs from its own
/// [`algorithm`](Hasher::algorithm). Implementations must be preimage and
/// collision resistant.
pub trait Hasher: Send + Sync {
    /// Digest of `body`, in its textual claim form.
    fn hash(&self, body: &[u8]) -> String;

    /// Label written to / expected in the `hash-alg` claim.
    fn algorithm(&self) -> &str;
}

/// SHA-256, base64url encoded without padding
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, body: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(body))
    }

    fn algorithm(&self) -> &str {
        SHA256_LABEL
    }
}
