//! Access credential issuance

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openapi_client::models::{AccessKey, AuthResponse};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};

use crate::authn::handshake::Handshake;
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::http::client::HttpClient;
use crate::secrets::SecretGenerator;

/// Result of a successful bootstrap
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub key_file: File,
}

/// Obtains an access token from the application service and stores it
pub struct CredentialBootstrapper<R: RngCore = OsRng> {
    client: HttpClient,
    auth_path: String,
    generator: SecretGenerator<R>,
}

impl CredentialBootstrapper<OsRng> {
    pub fn new(client: HttpClient, auth_path: &str) -> Self {
        Self::with_generator(client, auth_path, SecretGenerator::new())
    }
}

impl<R: RngCore> CredentialBootstrapper<R> {
    pub fn with_generator(client: HttpClient, auth_path: &str, generator: SecretGenerator<R>) -> Self {
        Self {
            client,
            auth_path: auth_path.to_string(),
            generator,
        }
    }

    /// Run the handshake and persist the access key
    ///
    /// Nothing is written unless the service answered with a non-empty
    /// token and `success: true`.
    pub async fn bootstrap(&mut self, key_file: &File) -> Result<IssuedCredential, BootstrapError> {
        let token = self.request_token().await?;

        let secret = self.generator.random_bytes::<32>()?;
        let access_key = AccessKey {
            secret: STANDARD.encode(secret),
            token,
        };
        key_file.write_json_private(&access_key).await?;

        info!("Access key written to {}", key_file.path().display());
        Ok(IssuedCredential {
            key_file: key_file.clone(),
        })
    }

    async fn request_token(&mut self) -> Result<String, BootstrapError> {
        let handshake = Handshake::new(&mut self.generator)?;
        let request = handshake.request();
        let url = self.client.url(&self.auth_path);

        let response = self
            .client
            .post_json(&self.auth_path, &request)
            .await
            .map_err(|e| BootstrapError::CredentialError(format!("{} unreachable: {}", url, e)))?;

        debug!("{} answered {}", url, response.status);
        if !response.status.is_success() {
            return Err(BootstrapError::CredentialError(format!(
                "{} answered {}",
                url, response.status
            )));
        }

        let parsed: AuthResponse = serde_json::from_str(&response.body).map_err(|e| {
            BootstrapError::CredentialError(format!("unexpected response from {}: {}", url, e))
        })?;

        parsed
            .issued_token()
            .map(str::to_string)
            .ok_or_else(|| BootstrapError::CredentialError(format!("{} rejected the handshake", url)))
    }
}
