use common::{SampleKind, Target, ValidationError};
use thiserror::Error;

/// Fallo de un intento de muestra. Casi todos son transitorios y el runner
/// los reintenta; ver [`SampleError::is_transient`].
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("el servicio rechazó el test (status {status}): {text}")]
    ServiceStatus { status: u16, text: String },
    #[error("status de poll inesperado: {0}")]
    BadPollStatus(u16),
    #[error("respuesta mal formada: {0}")]
    Decode(String),
    #[error("muestra inválida: {0}")]
    Invalid(#[from] ValidationError),
    #[error("el proceso local terminó con {0}")]
    ProcessFailed(String),
    #[error("falta el artefacto {0}")]
    MissingArtifact(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("no se pudo lanzar el programa local {program}: {reason}")]
    ToolUnavailable { program: String, reason: String },
}

impl SampleError {
    /// Clasificador para el retry: sólo un programa local inexistente es fatal.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SampleError::ToolUnavailable { .. })
    }
}

/// Errores que abortan toda la corrida.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("falta la credencial del servicio remoto (variable {0})")]
    MissingCredential(&'static str),
    #[error("{target}: se esperaban {expected} muestras {kind} y hay {actual}")]
    CountMismatch {
        target: Target,
        kind: SampleKind,
        expected: usize,
        actual: usize,
    },
    #[error("{target}: error fatal en muestra {kind}: {source}")]
    Sample {
        target: Target,
        kind: SampleKind,
        #[source]
        source: SampleError,
    },
    #[error("no se pudo guardar el checkpoint: {0}")]
    Checkpoint(#[from] std::io::Error),
    #[error("una ejecución terminó con panic: {0}")]
    Join(#[from] tokio::task::JoinError),
}
