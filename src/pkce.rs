use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// Random 64-character verifier (RFC 7636 allows 43-128).
    #[must_use]
    pub fn generate() -> Self {
        let random_bytes: [u8; 48] = rand::rng().random();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(random_bytes))
    }

    /// `challenge = BASE64URL(SHA256(verifier))`
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Random `state` parameter: 16 bytes, base64url (22 chars).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}
