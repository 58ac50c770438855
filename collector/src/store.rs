use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use common::checkpoint::{LOG_FILE, REPORT_FILE, TRACE_FILE};
use common::{artifact_ref, ArtifactRef, CheckpointEntry, RunSet, Sample, SampleKind};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::RunError;
use crate::task::Task;

pub const RUN_SET_FILE: &str = "runset.json";

/// Persistencia del estado reanudable y de los artefactos de cada muestra.
pub trait CheckpointStore: Send + Sync + 'static {
    fn load(&self) -> io::Result<RunSet>;
    /// Sobrescribe el RunSet completo.
    fn save(&self, run_set: &RunSet) -> io::Result<()>;
    /// Guarda los artefactos de una muestra bajo un nombre derivado de
    /// (target, tipo, índice) y devuelve la referencia.
    fn persist_sample(
        &self,
        target: &str,
        kind: SampleKind,
        index: usize,
        sample: &Sample,
    ) -> io::Result<ArtifactRef>;
}

pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_set_path(&self) -> PathBuf {
        self.root.join(RUN_SET_FILE)
    }
}

/// Escribe a un archivo temporal y lo renombra encima del destino.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

fn to_json_bytes<T: serde::Serialize>(value: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

impl CheckpointStore for FsCheckpointStore {
    fn load(&self) -> io::Result<RunSet> {
        let path = self.run_set_path();
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RunSet::default()),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} mal formado: {e}", path.display()),
            )
        })
    }

    fn save(&self, run_set: &RunSet) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(run_set)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        atomic_write(&self.run_set_path(), &bytes)
    }

    fn persist_sample(
        &self,
        target: &str,
        kind: SampleKind,
        index: usize,
        sample: &Sample,
    ) -> io::Result<ArtifactRef> {
        let reference = artifact_ref(target, kind, index);
        let dir = self.root.join(&reference);
        fs::create_dir_all(&dir)?;

        atomic_write(&dir.join(REPORT_FILE), &to_json_bytes(&sample.report)?)?;
        if let Some(ref events) = sample.trace {
            atomic_write(&dir.join(TRACE_FILE), &to_json_bytes(&json!({ "traceEvents": events }))?)?;
        }
        if let Some(ref log) = sample.log {
            atomic_write(&dir.join(LOG_FILE), &to_json_bytes(log)?)?;
        }
        Ok(reference)
    }
}

/// Commits por task contra el store. Los commits pueden resolverse en paralelo;
/// la lectura-modificación-escritura del RunSet se serializa con un mutex.
pub struct Checkpointer<C> {
    store: Arc<C>,
    run_set: Mutex<RunSet>,
}

impl<C: CheckpointStore> Checkpointer<C> {
    pub fn new(store: Arc<C>, run_set: RunSet) -> Self {
        Self {
            store,
            run_set: Mutex::new(run_set),
        }
    }

    /// Persiste los artefactos de la task y agrega su entrada al RunSet.
    pub async fn commit(&self, task: &Task) -> Result<CheckpointEntry, RunError> {
        let store = Arc::clone(&self.store);
        let target = task.target().to_string();
        let remote = task.remote_samples();
        let local = task.local_samples();

        let entry = tokio::task::spawn_blocking(move || -> io::Result<CheckpointEntry> {
            let remote = remote
                .iter()
                .enumerate()
                .map(|(i, s)| store.persist_sample(&target, SampleKind::Remote, i, s))
                .collect::<io::Result<Vec<_>>>()?;
            let local = local
                .iter()
                .enumerate()
                .map(|(i, s)| store.persist_sample(&target, SampleKind::Local, i, s))
                .collect::<io::Result<Vec<_>>>()?;
            Ok(CheckpointEntry {
                target,
                remote,
                local,
            })
        })
        .await??;

        let mut run_set = self.run_set.lock().await;
        run_set.upsert(entry.clone());
        self.store.save(&run_set)?;
        info!(
            "checkpoint: {} guardado ({} entradas en total)",
            entry.target,
            run_set.entries.len()
        );
        Ok(entry)
    }

    pub async fn run_set(&self) -> RunSet {
        self.run_set.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::tests::temp_dir;
    use crate::task::tests::sample;
    use serde_json::Value;

    fn full_task(target: &str, n: usize) -> Task {
        let task = Task::new(target.to_string(), n);
        for i in 0..n {
            task.record_remote_sample(i, sample(SampleKind::Remote, 100 + i as u64));
            task.record_local_sample(sample(SampleKind::Local, 200 + i as u64));
        }
        task
    }

    #[test]
    fn load_sin_archivo_da_runset_vacio() {
        let dir = temp_dir("store_empty");
        let store = FsCheckpointStore::new(&dir);
        assert!(store.load().unwrap().entries.is_empty());
    }

    #[test]
    fn load_de_json_roto_es_error() {
        let dir = temp_dir("store_broken");
        fs::write(dir.join(RUN_SET_FILE), "{not json").unwrap();
        let err = FsCheckpointStore::new(&dir).load().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn persist_sample_usa_nombre_deterministico() {
        let dir = temp_dir("store_persist");
        let store = FsCheckpointStore::new(&dir);
        let mut s = sample(SampleKind::Local, 10);
        s.trace = Some(vec![json!({"name": "x"})]);
        s.log = Some(json!([]));

        let r = store
            .persist_sample("https://a.test/", SampleKind::Local, 1, &s)
            .unwrap();

        assert_eq!(r, artifact_ref("https://a.test/", SampleKind::Local, 1));
        assert!(r.ends_with("/local-1"));
        assert!(dir.join(&r).join(REPORT_FILE).is_file());
        assert!(dir.join(&r).join(TRACE_FILE).is_file());
        assert!(dir.join(&r).join(LOG_FILE).is_file());
    }

    fn fcp_on_disk(dir: &Path, reference: &str) -> Value {
        let report: Value =
            serde_json::from_slice(&fs::read(dir.join(reference).join(REPORT_FILE)).unwrap()).unwrap();
        report["audits"]["metrics"]["details"]["items"][0]["firstContentfulPaint"].clone()
    }

    #[test]
    fn targets_que_sanitizan_igual_no_se_pisan() {
        let dir = temp_dir("store_collision");
        let store = FsCheckpointStore::new(&dir);

        let ra = store
            .persist_sample("https://a.test/x-y", SampleKind::Remote, 0, &sample(SampleKind::Remote, 111))
            .unwrap();
        let rb = store
            .persist_sample("https://a.test/x/y", SampleKind::Remote, 0, &sample(SampleKind::Remote, 222))
            .unwrap();

        assert_ne!(ra, rb);
        assert_eq!(fcp_on_disk(&dir, &ra), json!(111));
        assert_eq!(fcp_on_disk(&dir, &rb), json!(222));
    }

    #[test]
    fn target_largo_se_persiste() {
        let dir = temp_dir("store_long_target");
        let store = FsCheckpointStore::new(&dir);
        let target = format!("https://a.test/buscar?q={}&utm_source=x", "palabra".repeat(45));
        assert!(target.len() > 300);

        let r = store
            .persist_sample(&target, SampleKind::Local, 0, &sample(SampleKind::Local, 10))
            .unwrap();

        assert!(dir.join(&r).join(REPORT_FILE).is_file());
    }

    #[tokio::test]
    async fn commit_persiste_y_guarda_runset() {
        let dir = temp_dir("store_commit");
        let store = Arc::new(FsCheckpointStore::new(&dir));
        let cp = Checkpointer::new(Arc::clone(&store), RunSet::default());

        let entry = cp.commit(&full_task("https://a.test/", 2)).await.unwrap();

        assert!(entry.is_complete(2));
        let on_disk = store.load().unwrap();
        assert_eq!(on_disk.entries, vec![entry]);
    }

    #[tokio::test]
    async fn commits_concurrentes_no_pierden_entradas() {
        let dir = temp_dir("store_concurrent");
        let store = Arc::new(FsCheckpointStore::new(&dir));
        let cp = Arc::new(Checkpointer::new(Arc::clone(&store), RunSet::default()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let cp = Arc::clone(&cp);
            handles.push(tokio::spawn(async move {
                let task = full_task(&format!("https://site{i}.test/"), 1);
                cp.commit(&task).await.map(|_| ())
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.load().unwrap().entries.len(), 8);
        assert_eq!(cp.run_set().await.entries.len(), 8);
    }
}
