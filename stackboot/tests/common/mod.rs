//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use openapi_client::models::AuthRequest;
use serde_json::{json, Value};

use stackboot::errors::BootstrapError;
use stackboot::installer::prereqs::{PackageInstaller, Prerequisite};
use stackboot::installer::repository::RepositorySource;
use stackboot::installer::runtime::ContainerRuntime;

pub const ISSUED_TOKEN: &str = "tok-4f9c2a";

/// How the mock answers `POST /v1/auth`
#[derive(Debug, Clone, Copy)]
pub enum AuthBehaviour {
    /// Verify the signature and issue a token if it checks out
    Verify,
    /// Always answer `{"success": false}`
    Reject,
    /// Answer 200 with a body that is not JSON
    Garbage,
}

#[derive(Clone)]
struct MockState {
    behaviour: AuthBehaviour,
    requests: Arc<Mutex<Vec<AuthRequest>>>,
}

/// In-process stand-in for the application service
pub struct MockApp {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<AuthRequest>>>,
}

impl MockApp {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

pub async fn spawn_app(behaviour: AuthBehaviour) -> MockApp {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        behaviour,
        requests: requests.clone(),
    };

    let router = Router::new()
        .route("/", get(|| async { "Welcome to the application service" }))
        .route("/health", get(|| async { "ok" }))
        .route("/v1/auth", post(auth))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    MockApp { addr, requests }
}

async fn auth(State(state): State<MockState>, Json(request): Json<AuthRequest>) -> (StatusCode, String) {
    state.requests.lock().unwrap().push(request.clone());

    match state.behaviour {
        AuthBehaviour::Verify => match verify_request(&request) {
            Ok(()) => (
                StatusCode::OK,
                json!({ "success": true, "token": ISSUED_TOKEN }).to_string(),
            ),
            Err(_) => (StatusCode::OK, json!({ "success": false }).to_string()),
        },
        AuthBehaviour::Reject => (StatusCode::OK, json!({ "success": false }).to_string()),
        AuthBehaviour::Garbage => (StatusCode::OK, "<html>oops</html>".to_string()),
    }
}

/// A local port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Every prerequisite is already installed
pub struct PresentInstaller;

#[async_trait]
impl PackageInstaller for PresentInstaller {
    async fn is_present(&self, _prerequisite: &Prerequisite) -> bool {
        true
    }

    async fn install(&self, _prerequisite: &Prerequisite) -> Result<(), BootstrapError> {
        Ok(())
    }
}

/// Writes a minimal checkout instead of cloning
#[derive(Default)]
pub struct FakeRepository {
    pub fetches: Mutex<u32>,
}

#[async_trait]
impl RepositorySource for FakeRepository {
    async fn fetch(&self, _url: &str, target: &Path) -> Result<(), BootstrapError> {
        *self.fetches.lock().unwrap() += 1;
        tokio::fs::create_dir_all(target).await?;
        tokio::fs::write(target.join("Dockerfile"), "FROM scratch\n").await?;
        Ok(())
    }
}

/// Records runtime calls without running containers
#[derive(Default)]
pub struct RecordingRuntime {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn build(&self, _project_dir: &Path) -> Result<(), BootstrapError> {
        self.calls.lock().unwrap().push("build".to_string());
        Ok(())
    }

    async fn up(&self, _project_dir: &Path) -> Result<(), BootstrapError> {
        self.calls.lock().unwrap().push("up".to_string());
        Ok(())
    }
}

/// `KEY=value` lines of an environment file, comments skipped
pub fn env_lines(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Check an [`AuthRequest`] the way the application service does
pub fn verify_request(request: &AuthRequest) -> Result<(), String> {
    let public_key: [u8; 32] = STANDARD
        .decode(&request.public_key)
        .map_err(|e| format!("public key: {}", e))?
        .try_into()
        .map_err(|_| "public key must be 32 bytes".to_string())?;
    let signature: [u8; 64] = STANDARD
        .decode(&request.signature)
        .map_err(|e| format!("signature: {}", e))?
        .try_into()
        .map_err(|_| "signature must be 64 bytes".to_string())?;
    let challenge = STANDARD
        .decode(&request.challenge)
        .map_err(|e| format!("challenge: {}", e))?;

    let key = VerifyingKey::from_bytes(&public_key).map_err(|e| e.to_string())?;
    key.verify(&challenge, &Signature::from_bytes(&signature))
        .map_err(|e| e.to_string())
}
