use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::validate::{validate_report, ValidationError};

/// Identificador opaco de lo que se mide (normalmente una URL).
pub type Target = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Remote,
    Local,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Remote => "remote",
            SampleKind::Local => "local",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resultado de un intento de medición ya validado.
///
/// Sólo se construye a través de [`Sample::new`], que rechaza reportes sin
/// métricas de tiempo o con `runtimeError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub kind: SampleKind,
    /// Reporte de medición serializado (LHR).
    pub report: Value,
    /// Eventos de trace crudos, si el origen los entrega.
    pub trace: Option<Vec<Value>>,
    /// Log crudo de devtools (sólo muestras locales).
    pub log: Option<Value>,
    /// Uso de CPU del host justo antes de la corrida (sólo muestras locales).
    pub host_cpu_percent: Option<f32>,
    pub recorded_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(
        kind: SampleKind,
        report: Value,
        trace: Option<Vec<Value>>,
        log: Option<Value>,
    ) -> Result<Self, ValidationError> {
        validate_report(&report)?;
        Ok(Self {
            kind,
            report,
            trace,
            log,
            host_cpu_percent: None,
            recorded_at: Utc::now(),
        })
    }

    pub fn with_host_cpu(mut self, cpu_percent: f32) -> Self {
        self.host_cpu_percent = Some(cpu_percent);
        self
    }
}
