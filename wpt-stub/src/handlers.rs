use axum::{
    extract::{Query, State},
    http::{header::HOST, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use common::wpt::{PollData, SubmitData, TRACE_FILE};
use common::{PollResponse, SubmitResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::state::{AppState, StubTest};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/runtest.php", get(runtest))
        .route("/jsonResult.php", get(json_result))
        .route("/getgzip.php", get(getgzip))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct RuntestParams {
    url: Option<String>,
    k: Option<String>,
    location: Option<String>,
}

fn submit_error(status_code: u16, text: &str) -> Json<SubmitResponse> {
    Json(SubmitResponse {
        status_code,
        status_text: Some(text.to_string()),
        data: None,
    })
}

// Acepta un test nuevo y lo deja en cola
async fn runtest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RuntestParams>,
) -> Json<SubmitResponse> {
    if let Some(ref expected) = state.config.api_key {
        if params.k.as_deref() != Some(expected.as_str()) {
            warn!("runtest con API key inválida");
            return submit_error(400, "Invalid API Key");
        }
    }

    let url = match params.url {
        Some(u) if !u.trim().is_empty() => u,
        _ => return submit_error(400, "Invalid URL, please try submitting your test request again."),
    };

    let seq = {
        let mut submitted = state.submitted.lock().unwrap();
        *submitted += 1;
        *submitted
    };
    let invalid = state
        .config
        .invalid_every
        .map(|k| seq % k == 0)
        .unwrap_or(false);

    let test_id = uuid::Uuid::new_v4().simple().to_string();
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");
    let json_url = format!("http://{}/jsonResult.php?test={}", host, test_id);

    {
        let mut tests = state.tests.lock().unwrap();
        tests.insert(
            test_id.clone(),
            StubTest {
                url: url.clone(),
                seq,
                behind: state.config.queue_depth,
                running_polls_left: state.config.running_polls,
                invalid,
                polls: 0,
            },
        );
    }

    info!(
        "test {} aceptado para {} (location={:?}, cola={}, inválido={})",
        test_id, url, params.location, state.config.queue_depth, invalid
    );

    Json(SubmitResponse {
        status_code: 200,
        status_text: Some("Ok".to_string()),
        data: Some(SubmitData { test_id, json_url }),
    })
}

#[derive(Debug, Deserialize)]
struct TestParams {
    test: String,
}

/// Reporte sintético; los inválidos no traen métricas.
fn synthetic_report(test: &StubTest) -> Value {
    if test.invalid {
        return json!({
            "requestedUrl": test.url,
            "audits": {}
        });
    }
    let jitter = (test.seq % 7) as f64 * 13.0;
    json!({
        "requestedUrl": test.url,
        "finalUrl": test.url,
        "audits": {
            "metrics": {
                "details": {
                    "items": [{
                        "firstContentfulPaint": 900.0 + jitter,
                        "largestContentfulPaint": 1500.0 + jitter,
                        "interactive": 2400.0 + jitter
                    }]
                }
            }
        }
    })
}

// Avanza el test un paso por poll: cola → corriendo → terminado
async fn json_result(
    State(state): State<AppState>,
    Query(params): Query<TestParams>,
) -> Json<PollResponse> {
    let mut tests = state.tests.lock().unwrap();
    let Some(test) = tests.get_mut(&params.test) else {
        return Json(PollResponse {
            status_code: 400,
            status_text: Some("Test not found".to_string()),
            data: None,
        });
    };
    test.polls += 1;

    let resp = if test.behind > 0 {
        let behind = test.behind;
        test.behind -= 1;
        PollResponse {
            status_code: 100,
            status_text: Some(format!("Waiting behind {} other tests...", behind)),
            data: Some(PollData {
                behind_count: Some(behind),
                lighthouse: None,
            }),
        }
    } else if test.running_polls_left > 0 {
        test.running_polls_left -= 1;
        PollResponse {
            status_code: 101,
            status_text: Some("Test Started".to_string()),
            data: None,
        }
    } else {
        PollResponse {
            status_code: 200,
            status_text: Some("Test Complete".to_string()),
            data: Some(PollData {
                behind_count: None,
                lighthouse: Some(synthetic_report(test)),
            }),
        }
    };

    debug!("poll {} de {}: status {}", test.polls, params.test, resp.status_code);
    Json(resp)
}

#[derive(Debug, Deserialize)]
struct GetgzipParams {
    test: String,
    file: String,
}

// Trace del test; arranca con un registro vacío como el servicio real
async fn getgzip(
    State(state): State<AppState>,
    Query(params): Query<GetgzipParams>,
) -> Result<Json<Value>, StatusCode> {
    if params.file != TRACE_FILE {
        return Err(StatusCode::NOT_FOUND);
    }
    let tests = state.tests.lock().unwrap();
    if !tests.contains_key(&params.test) {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(json!({
        "traceEvents": [
            {},
            {"name": "TracingStartedInBrowser", "ph": "I", "ts": 1},
            {"name": "navigationStart", "ph": "R", "ts": 10},
            {"name": "firstContentfulPaint", "ph": "R", "ts": 900}
        ]
    })))
}
