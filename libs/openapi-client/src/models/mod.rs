//! API models

use serde::{Deserialize, Serialize};

/// Challenge-response authentication request (`POST /v1/auth`)
///
/// All three fields are standard (padded) base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub public_key: String,
    pub challenge: String,
    pub signature: String,
}

/// Authentication response
///
/// Only `{"success": true, "token": "..."}` counts as an issued credential.
/// Any other shape, including a missing `success` field, is a rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub token: Option<String>,
}

impl AuthResponse {
    /// The issued token, if the response is a successful one
    pub fn issued_token(&self) -> Option<&str> {
        match (self.success, self.token.as_deref()) {
            (true, Some(token)) if !token.is_empty() => Some(token),
            _ => None,
        }
    }
}

/// Persisted client access key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    /// Base64 of the 32-byte client-side symmetric secret
    pub secret: String,

    /// Opaque token issued by the service
    pub token: String,
}
