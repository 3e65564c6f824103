//! Random secret generation
//!
//! Secrets are drawn from the operating system's entropy source and encoded
//! into `[A-Za-z0-9]` so they survive inside URLs and `KEY=value` files
//! without quoting. There is no fallback generator: if the OS source fails,
//! the error propagates.

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretString;

use crate::errors::BootstrapError;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Bytes at or above this value are discarded (248 = 4 * 62), keeping the
/// mapping onto the alphabet uniform.
const REJECTION_LIMIT: u8 = 248;

/// Secret length profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretProfile {
    /// Bearer and master secrets
    Long,

    /// Datastore passwords embedded in connection-string URLs
    Short,
}

impl SecretProfile {
    pub const fn length(&self) -> usize {
        match self {
            SecretProfile::Long => 32,
            SecretProfile::Short => 24,
        }
    }
}

/// Secret generator over an entropy source
#[derive(Debug, Clone)]
pub struct SecretGenerator<R = OsRng> {
    rng: R,
}

impl SecretGenerator<OsRng> {
    /// Generator backed by the OS entropy source
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for SecretGenerator<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> SecretGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Generate an alphanumeric secret of exactly `len` characters
    pub fn generate(&mut self, len: usize) -> Result<SecretString, BootstrapError> {
        let mut out = String::with_capacity(len);
        let mut buf = [0u8; 64];

        while out.len() < len {
            self.fill(&mut buf)?;
            for byte in buf.iter().copied().filter(|b| *b < REJECTION_LIMIT) {
                out.push(ALPHABET[(byte % 62) as usize] as char);
                if out.len() == len {
                    break;
                }
            }
        }

        Ok(SecretString::from(out))
    }

    /// Generate a secret with the length of the given profile
    pub fn generate_profile(&mut self, profile: SecretProfile) -> Result<SecretString, BootstrapError> {
        self.generate(profile.length())
    }

    /// Raw random bytes for key material
    pub fn random_bytes<const N: usize>(&mut self) -> Result<[u8; N], BootstrapError> {
        let mut bytes = [0u8; N];
        self.fill(&mut bytes)?;
        Ok(bytes)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), BootstrapError> {
        self.rng
            .try_fill_bytes(buf)
            .map_err(|e| BootstrapError::Entropy(e.to_string()))
    }
}
