use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Espera base (en unidades de poll) cuando el test no tiene cola delante.
pub const POLL_WAIT_BASE: u64 = 30;
/// Unidades extra por cada test delante en la cola.
pub const POLL_WAIT_PER_QUEUED: u64 = 10;
/// Tope de espera entre polls.
pub const POLL_WAIT_MAX: u64 = 10_000;

/// Nombre del archivo de trace que se pide a getgzip.php.
pub const TRACE_FILE: &str = "lighthouse_trace.json";

/// Unidades a esperar antes del siguiente poll: `min(30 + 10 * cola, 10000)`.
pub fn poll_wait_units(queue_depth: Option<u64>) -> u64 {
    let depth = queue_depth.unwrap_or(0);
    POLL_WAIT_BASE
        .saturating_add(POLL_WAIT_PER_QUEUED.saturating_mul(depth))
        .min(POLL_WAIT_MAX)
}

/* --------- runtest.php --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status_code: u16,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub data: Option<SubmitData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitData {
    pub test_id: String,
    pub json_url: String,
}

/* --------- jsonResult.php --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status_code: u16,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub data: Option<PollData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollData {
    /// Cantidad de tests delante en la cola del agente.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behind_count: Option<u64>,
    /// LHR, sólo presente con statusCode 200.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighthouse: Option<Value>,
}

/// Interpretación de un statusCode de poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    InProgress { queue_depth: Option<u64> },
    Complete,
    Error(u16),
}

impl PollResponse {
    pub fn status(&self) -> PollStatus {
        match self.status_code {
            100..=199 => PollStatus::InProgress {
                queue_depth: self.data.as_ref().and_then(|d| d.behind_count),
            },
            200 => PollStatus::Complete,
            other => PollStatus::Error(other),
        }
    }
}

impl PollStatus {
    /// "Corriendo o terminado": la condición que dispara la señal de inicio.
    pub fn is_active(&self) -> bool {
        match self {
            PollStatus::InProgress { queue_depth } => queue_depth.unwrap_or(0) == 0,
            PollStatus::Complete => true,
            PollStatus::Error(_) => false,
        }
    }
}

/* --------- getgzip.php --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePayload {
    #[serde(default)]
    pub trace_events: Vec<Value>,
}

impl TracePayload {
    /// El servicio a veces antepone registros vacíos (`{}`); se descartan.
    pub fn into_events(self) -> Vec<Value> {
        let mut events = self.trace_events;
        let leading_empty = events
            .iter()
            .take_while(|e| e.as_object().map(|o| o.is_empty()).unwrap_or(false))
            .count();
        events.drain(..leading_empty);
        events
    }
}
