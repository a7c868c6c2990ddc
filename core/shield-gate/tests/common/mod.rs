//! Shared fixtures for gate tests: a scripted licensing server and a
//! harness wiring a gate to in-memory collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use shield_gate::{LicenseGate, ManualConnectivity};
use shield_license::{LicenseConfig, LicenseStateMachine, ManualClock, MemoryStore, Reachability};
use shield_server::{LicenseServer, ServerError, ServerRequest, ServerResponse, ServerResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn offline_config() -> LicenseConfig {
    LicenseConfig::default()
}

pub fn server_config() -> LicenseConfig {
    LicenseConfig {
        server_enabled: true,
        server_url: "https://licenses.example.com/api".to_string(),
        ..Default::default()
    }
}

/// What the scripted server does for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(ServerResponse),
    Timeout,
    Unreachable,
    Garbage,
}

#[derive(Debug, Clone)]
struct Step {
    reply: Reply,
    delay: Duration,
}

/// A licensing server that plays back queued replies, then a fallback.
pub struct ScriptedServer {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    verify_calls: AtomicUsize,
    activate_calls: AtomicUsize,
    requests: Mutex<Vec<ServerRequest>>,
}

impl ScriptedServer {
    /// Answers every request with `reply`.
    pub fn always(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Step {
                reply,
                delay: Duration::ZERO,
            },
            verify_calls: AtomicUsize::new(0),
            activate_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Confirms without extension unless scripted otherwise.
    pub fn confirming() -> Arc<Self> {
        Self::always(Reply::Respond(ServerResponse::ok(None)))
    }

    /// Queues a reply delivered after `delay`.
    pub fn push(&self, reply: Reply, delay: Duration) {
        self.steps.lock().unwrap().push_back(Step { reply, delay });
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn activate_calls(&self) -> usize {
        self.activate_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ServerRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn play(&self, request: ServerRequest) -> ServerResult<ServerResponse> {
        self.requests.lock().unwrap().push(request);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        match step.reply {
            Reply::Respond(response) => Ok(response),
            Reply::Timeout => Err(ServerError::Timeout),
            Reply::Unreachable => Err(ServerError::Unreachable("connection refused".to_string())),
            Reply::Garbage => Err(ServerError::Decode("expected value at line 1".to_string())),
        }
    }
}

#[async_trait]
impl LicenseServer for ScriptedServer {
    async fn activate(&self, request: ServerRequest) -> ServerResult<ServerResponse> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        self.play(request).await
    }

    async fn verify(&self, request: ServerRequest) -> ServerResult<ServerResponse> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.play(request).await
    }
}

/// A gate plus handles on every collaborator.
pub struct Harness {
    pub gate: LicenseGate,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub connectivity: Arc<ManualConnectivity>,
    pub server: Arc<ScriptedServer>,
}

impl Harness {
    pub fn new(config: LicenseConfig, server: Arc<ScriptedServer>) -> Self {
        Self::on_store(config, server, Arc::new(MemoryStore::new()), t0())
    }

    /// Builds a gate over an existing store, with the clock at `now`.
    pub fn on_store(
        config: LicenseConfig,
        server: Arc<ScriptedServer>,
        store: Arc<MemoryStore>,
        now: DateTime<Utc>,
    ) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(now));
        let connectivity = Arc::new(ManualConnectivity::new(Reachability::Full));
        let gate = LicenseGate::builder(config)
            .store(store.clone())
            .server(server.clone())
            .connectivity(connectivity.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        Self {
            gate,
            store,
            clock,
            connectivity,
            server,
        }
    }

    /// Expiry currently on record.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.gate.machine().record().expires_at
    }
}

/// A store holding a license activated at `at` for `days` days.
pub fn store_with_license(config: &LicenseConfig, at: DateTime<Utc>, days: i64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let machine = LicenseStateMachine::new(config.clone(), store.clone());
    machine.extend(at, days).unwrap();
    store
}

/// Deterministic Ed25519 key pair and its base64 public key.
pub fn test_keypair() -> (SigningKey, String) {
    let signing_key = SigningKey::from_bytes(&[7u8; 32]);
    let public_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());
    (signing_key, public_b64)
}

pub fn sign_payload(signing_key: &SigningKey, payload_json: &str) -> String {
    let signature = signing_key.sign(payload_json.as_bytes());
    format!("{payload_json}|{}", STANDARD.encode(signature.to_bytes()))
}
