//! Ed25519 challenge-response material

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use openapi_client::models::AuthRequest;
use rand::RngCore;

use crate::errors::BootstrapError;
use crate::secrets::SecretGenerator;

pub const CHALLENGE_LEN: usize = 32;

/// Fresh keypair and challenge for a single authentication attempt
///
/// Dropped after the attempt; the signing key zeroizes itself.
pub struct Handshake {
    signing_key: SigningKey,
    challenge: [u8; CHALLENGE_LEN],
}

impl Handshake {
    pub fn new<R: RngCore>(generator: &mut SecretGenerator<R>) -> Result<Self, BootstrapError> {
        let seed = generator.random_bytes::<32>()?;
        let challenge = generator.random_bytes::<CHALLENGE_LEN>()?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
            challenge,
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn challenge(&self) -> &[u8; CHALLENGE_LEN] {
        &self.challenge
    }

    /// Sign the raw challenge bytes and encode everything as standard base64
    pub fn request(&self) -> AuthRequest {
        let signature = self.signing_key.sign(&self.challenge);
        AuthRequest {
            public_key: STANDARD.encode(self.verifying_key().as_bytes()),
            challenge: STANDARD.encode(self.challenge),
            signature: STANDARD.encode(signature.to_bytes()),
        }
    }
}
