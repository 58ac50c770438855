// wpt-stub/src/state.rs

use std::{
    collections::HashMap,
    env,
    sync::{Arc, Mutex},
};

pub type TestId = String;

/// Comportamiento del stub, leído de variables de entorno en el binario.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Si está, runtest.php exige `k` igual a esta key.
    pub api_key: Option<String>,
    /// Lugares en cola con los que arranca cada test.
    pub queue_depth: u64,
    /// Polls "corriendo" (101 sin behindCount) antes de terminar.
    pub running_polls: u32,
    /// Cada k-ésimo test devuelve un reporte sin métricas.
    pub invalid_every: Option<u64>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            queue_depth: 2,
            running_polls: 1,
            invalid_every: None,
        }
    }
}

impl StubConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env::var("STUB_API_KEY").ok().filter(|k| !k.is_empty()),
            queue_depth: env::var("STUB_QUEUE_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.queue_depth),
            running_polls: env::var("STUB_RUNNING_POLLS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.running_polls),
            invalid_every: env::var("STUB_INVALID_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|k: &u64| *k > 0),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: StubConfig,
    pub tests: Arc<Mutex<HashMap<TestId, StubTest>>>,
    // cantidad de tests aceptados desde que arrancó el stub
    pub submitted: Arc<Mutex<u64>>,
}

impl AppState {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config,
            tests: Arc::new(Mutex::new(HashMap::new())),
            submitted: Arc::new(Mutex::new(0)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StubTest {
    pub url: String,
    pub seq: u64,
    pub behind: u64,
    pub running_polls_left: u32,
    pub invalid: bool,
    pub polls: u32,
}
