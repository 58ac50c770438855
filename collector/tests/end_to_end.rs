//! Corrida completa contra el wpt-stub por HTTP, con una herramienta local falsa.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use collector::archive::ManifestArchiver;
use collector::local::{LocalSampleRunner, LocalTool, LOCAL_LOG, LOCAL_REPORT, LOCAL_TRACE};
use collector::remote::{HttpRemoteService, RemoteSampleRunner};
use collector::store::{CheckpointStore, FsCheckpointStore};
use collector::{Orchestrator, SampleError};
use serde_json::json;
use wpt_stub::{AppState, StubConfig};

const KEY: &str = "clave-de-prueba";

fn temp_dir(sub: &str) -> PathBuf {
    let base = env::temp_dir().join("collector_e2e").join(sub);
    let _ = fs::remove_dir_all(&base);
    fs::create_dir_all(&base).unwrap();
    base
}

/// Deja en el workdir los mismos tres archivos que lighthouse.
struct ScriptedLighthouse {
    calls: AtomicUsize,
}

#[async_trait]
impl LocalTool for ScriptedLighthouse {
    async fn invoke(&self, target: &str, workdir: &Path) -> Result<(), SampleError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as f64;
        let report = json!({
            "requestedUrl": target,
            "audits": {"metrics": {"details": {"items": [{
                "firstContentfulPaint": 800.0 + n,
                "largestContentfulPaint": 1200.0 + n,
                "interactive": 2000.0 + n
            }]}}}
        });
        fs::write(workdir.join(LOCAL_REPORT), report.to_string())?;
        fs::write(workdir.join(LOCAL_LOG), json!([{"method": "Page.loadEventFired"}]).to_string())?;
        fs::write(
            workdir.join(LOCAL_TRACE),
            json!({"traceEvents": [{"name": "navigationStart", "ts": 1}]}).to_string(),
        )?;
        Ok(())
    }
}

fn orchestrator(
    addr: std::net::SocketAddr,
    out: &Path,
    tool: Arc<ScriptedLighthouse>,
) -> Orchestrator<HttpRemoteService, ScriptedLighthouse, FsCheckpointStore> {
    let service = Arc::new(HttpRemoteService::new(format!("http://{addr}"), KEY, None));
    Orchestrator::new(
        RemoteSampleRunner::new(service, Duration::from_millis(1)),
        LocalSampleRunner::new(tool, out.join(".local-run")),
        Arc::new(FsCheckpointStore::new(out)),
        Arc::new(ManifestArchiver::new(out)),
        2,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn corrida_completa_y_reanudacion_contra_el_stub() {
    let out = temp_dir("completa");
    let state = AppState::new(StubConfig {
        api_key: Some(KEY.to_string()),
        queue_depth: 2,
        running_polls: 1,
        // la tercera submisión trae un reporte sin métricas
        invalid_every: Some(3),
    });
    let addr = wpt_stub::spawn_with_state(state.clone()).await.unwrap();
    let tool = Arc::new(ScriptedLighthouse {
        calls: AtomicUsize::new(0),
    });
    let targets = vec!["https://a.test/".to_string(), "https://b.test/".to_string()];

    let report = orchestrator(addr, &out, Arc::clone(&tool))
        .run(&targets)
        .await
        .unwrap();

    assert_eq!(report.measured.len(), 2);
    assert!(report.skipped.is_empty());
    // 4 muestras remotas + 1 reenvío por el reporte inválido
    assert_eq!(*state.submitted.lock().unwrap(), 5);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 4);

    let run_set = FsCheckpointStore::new(&out).load().unwrap();
    assert_eq!(run_set.entries.len(), 2);
    for entry in &run_set.entries {
        assert!(entry.is_complete(2), "{:?}", entry);
        for reference in entry.remote.iter().chain(&entry.local) {
            assert!(out.join(reference).join("lhr.json").is_file());
            assert!(out.join(reference).join("trace.json").is_file());
        }
    }
    let trace: serde_json::Value =
        serde_json::from_slice(&fs::read(out.join(&run_set.entries[0].remote[0]).join("trace.json")).unwrap())
            .unwrap();
    // el registro vacío del servicio no llega al disco
    assert_ne!(trace["traceEvents"][0], json!({}));
    assert!(report.manifest.is_file());

    // segunda corrida: todo tiene checkpoint, no se mide nada
    let again = orchestrator(addr, &out, Arc::clone(&tool))
        .run(&targets)
        .await
        .unwrap();

    assert_eq!(again.skipped.len(), 2);
    assert!(again.measured.is_empty());
    assert_eq!(*state.submitted.lock().unwrap(), 5);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_key_rechazada_se_reintenta_hasta_que_se_corta() {
    let out = temp_dir("key_rechazada");
    let state = AppState::new(StubConfig {
        api_key: Some("otra".to_string()),
        queue_depth: 0,
        running_polls: 0,
        invalid_every: None,
    });
    let addr = wpt_stub::spawn_with_state(state.clone()).await.unwrap();
    let tool = Arc::new(ScriptedLighthouse {
        calls: AtomicUsize::new(0),
    });
    let targets = vec!["https://a.test/".to_string()];
    let orch = orchestrator(addr, &out, Arc::clone(&tool));

    // el rechazo es transitorio: la corrida no termina sola
    let run = tokio::time::timeout(Duration::from_millis(300), orch.run(&targets)).await;

    assert!(run.is_err());
    assert!(*state.submitted.lock().unwrap() == 0);
    assert!(FsCheckpointStore::new(&out).load().unwrap().entries.is_empty());
}
