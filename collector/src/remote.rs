use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::wpt::{PollData, TRACE_FILE};
use common::{poll_wait_units, PollResponse, PollStatus, Sample, SampleKind, SubmitResponse, TracePayload};
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::SampleError;
use crate::retry::retry_forever;
use crate::task::StartedSignal;

/// Test aceptado por el servicio remoto.
#[derive(Debug, Clone)]
pub struct Submission {
    pub test_id: String,
    pub json_url: String,
}

/// Servicio remoto de mediciones basado en cola (WebPageTest o compatible).
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn submit(&self, target: &str) -> Result<Submission, SampleError>;
    async fn poll(&self, submission: &Submission) -> Result<PollResponse, SampleError>;
    async fn fetch_trace(&self, test_id: &str) -> Result<Vec<Value>, SampleError>;
}

/// Cliente HTTP contra la API de WebPageTest.
pub struct HttpRemoteService {
    client: Client,
    base_url: String,
    api_key: String,
    location: Option<String>,
}

impl HttpRemoteService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, location: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            location,
        }
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn submit(&self, target: &str) -> Result<Submission, SampleError> {
        let url = format!("{}/runtest.php", self.base_url);
        let mut query: Vec<(&str, &str)> = vec![
            ("url", target),
            ("k", self.api_key.as_str()),
            ("f", "json"),
            ("lighthouse", "1"),
            ("runs", "1"),
        ];
        if let Some(ref location) = self.location {
            query.push(("location", location.as_str()));
        }

        let resp = self.client.get(&url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SampleError::ServiceStatus {
                status: status.as_u16(),
                text,
            });
        }

        let body: SubmitResponse = resp.json().await?;
        if body.status_code != 200 {
            return Err(SampleError::ServiceStatus {
                status: body.status_code,
                text: body.status_text.unwrap_or_default(),
            });
        }

        let data = body
            .data
            .ok_or_else(|| SampleError::Decode("runtest.php respondió sin data".to_string()))?;

        Ok(Submission {
            test_id: data.test_id,
            json_url: data.json_url,
        })
    }

    async fn poll(&self, submission: &Submission) -> Result<PollResponse, SampleError> {
        let resp = self.client.get(&submission.json_url).send().await?;
        if !resp.status().is_success() {
            return Err(SampleError::BadPollStatus(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }

    async fn fetch_trace(&self, test_id: &str) -> Result<Vec<Value>, SampleError> {
        let url = format!("{}/getgzip.php", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("test", test_id), ("file", TRACE_FILE)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SampleError::ServiceStatus {
                status: resp.status().as_u16(),
                text: format!("getgzip.php para test {}", test_id),
            });
        }
        let payload: TracePayload = resp.json().await?;
        Ok(payload.into_events())
    }
}

/// Ciclo completo de una muestra remota: submit → poll → trace, con retry infinito.
pub struct RemoteSampleRunner<S> {
    service: Arc<S>,
    /// Unidad de tiempo de la fórmula de espera entre polls.
    poll_unit: Duration,
}

impl<S> Clone for RemoteSampleRunner<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            poll_unit: self.poll_unit,
        }
    }
}

impl<S: RemoteService> RemoteSampleRunner<S> {
    pub fn new(service: Arc<S>, poll_unit: Duration) -> Self {
        Self { service, poll_unit }
    }

    /// Devuelve exactamente una muestra válida.
    ///
    /// `started` se dispara la primera vez que un poll ve el test corriendo o
    /// terminado, o al fallar el primer intento, lo que ocurra antes.
    pub async fn run(&self, target: &str, started: &StartedSignal) -> Result<Sample, SampleError> {
        let what = format!("remoto {}", target);
        retry_forever(&what, SampleError::is_transient, |attempt| async move {
            let result = self.attempt(target, started).await;
            if attempt == 1 && result.is_err() {
                started.fire();
            }
            result
        })
        .await
    }

    async fn attempt(&self, target: &str, started: &StartedSignal) -> Result<Sample, SampleError> {
        let submission = self.service.submit(target).await?;
        debug!("{}: test {} enviado", target, submission.test_id);

        loop {
            let resp = self.service.poll(&submission).await?;
            let status = resp.status();

            if status.is_active() && started.fire() {
                info!("{}: trabajo remoto iniciado (test {})", target, submission.test_id);
            }

            match status {
                PollStatus::Complete => {
                    let report = resp
                        .data
                        .and_then(|PollData { lighthouse, .. }| lighthouse)
                        .ok_or_else(|| {
                            SampleError::Decode(format!("test {} terminó sin reporte", submission.test_id))
                        })?;
                    common::validate_report(&report)?;

                    let trace = self.service.fetch_trace(&submission.test_id).await?;
                    return Ok(Sample::new(SampleKind::Remote, report, Some(trace), None)?);
                }
                PollStatus::InProgress { queue_depth } => {
                    let units = poll_wait_units(queue_depth);
                    let wait = self.poll_unit.saturating_mul(units as u32);
                    debug!(
                        "{}: test {} en curso (cola={:?}), esperando {:?}",
                        target, submission.test_id, queue_depth, wait
                    );
                    sleep(wait).await;
                }
                PollStatus::Error(code) => return Err(SampleError::BadPollStatus(code)),
            }
        }
    }
}
