use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use common::{CheckpointEntry, RunSet, SampleKind, Target};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{info, warn};

use crate::archive::Archiver;
use crate::error::{RunError, SampleError};
use crate::local::{LocalSampleRunner, LocalTool};
use crate::progress::ProgressReporter;
use crate::remote::{RemoteSampleRunner, RemoteService};
use crate::store::{CheckpointStore, Checkpointer};
use crate::task::Task;

type RemoteHandle = JoinHandle<Result<(), SampleError>>;

/// Corta las ejecuciones remotas que sigan vivas cuando `run` termina, también
/// si sale antes por un error.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Resultado de una corrida completa.
#[derive(Debug)]
pub struct RunReport {
    pub run_set: RunSet,
    /// Targets medidos en esta corrida.
    pub measured: Vec<Target>,
    /// Targets que ya tenían un checkpoint completo.
    pub skipped: Vec<Target>,
    pub manifest: PathBuf,
}

/// Lleva la corrida entera: muestras remotas en paralelo sin tope, muestras
/// locales de a una en todo el proceso, y un commit por target.
pub struct Orchestrator<S, T, C> {
    remote: RemoteSampleRunner<S>,
    /// El lock es el recurso local exclusivo: quien lo tiene es la única
    /// corrida local en vuelo.
    local: Mutex<LocalSampleRunner<T>>,
    store: Arc<C>,
    archiver: Arc<dyn Archiver>,
    samples: usize,
}

fn host_name() -> String {
    hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

impl<S, T, C> Orchestrator<S, T, C>
where
    S: RemoteService + 'static,
    T: LocalTool,
    C: CheckpointStore,
{
    pub fn new(
        remote: RemoteSampleRunner<S>,
        local: LocalSampleRunner<T>,
        store: Arc<C>,
        archiver: Arc<dyn Archiver>,
        samples: usize,
    ) -> Self {
        Self {
            remote,
            local: Mutex::new(local),
            store,
            archiver,
            samples,
        }
    }

    pub async fn run(&self, targets: &[Target]) -> Result<RunReport, RunError> {
        // 1) Estado previo: sólo cuentan las entradas completas
        let mut run_set = self.store.load()?;
        for target in run_set.retain_complete(self.samples) {
            warn!("{}: checkpoint incompleto, se vuelve a medir", target);
        }
        if run_set.collected_on.is_none() {
            run_set.collected_on = Some(host_name());
        }

        let done: HashSet<String> = run_set
            .completed_targets(self.samples)
            .into_iter()
            .map(str::to_string)
            .collect();
        // un target repetido se mide una sola vez
        let mut seen = HashSet::new();
        let requested: Vec<Target> = targets
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();
        let (skipped, pending_targets): (Vec<Target>, Vec<Target>) =
            requested.iter().cloned().partition(|t| done.contains(t));
        info!(
            "{} targets pedidos: {} ya medidos, {} por medir (N={})",
            requested.len(),
            skipped.len(),
            pending_targets.len(),
            self.samples
        );

        // 2) Una task por target y todas sus muestras remotas arrancan ya
        let tasks: Vec<Arc<Task>> = pending_targets
            .iter()
            .map(|t| Arc::new(Task::new(t.clone(), self.samples)))
            .collect();
        let reporter = Arc::new(ProgressReporter::new(tasks.clone()));
        let mut remote_handles: Vec<Vec<RemoteHandle>> = tasks
            .iter()
            .map(|task| self.spawn_remote(task, &reporter))
            .collect();
        let _remote_guard = AbortOnDrop(
            remote_handles
                .iter()
                .flatten()
                .map(JoinHandle::abort_handle)
                .collect(),
        );

        let checkpointer = Arc::new(Checkpointer::new(Arc::clone(&self.store), run_set));

        // 3) Fan-in sobre las señales de inicio remoto de las tasks pendientes
        let mut started: JoinSet<usize> = JoinSet::new();
        for (idx, task) in tasks.iter().enumerate() {
            let signal = task.started().clone();
            started.spawn(async move {
                signal.wait().await;
                idx
            });
        }

        let mut commits: JoinSet<Result<CheckpointEntry, RunError>> = JoinSet::new();
        let mut pending = tasks.len();

        while let Some(joined) = started.join_next().await {
            let idx = joined?;
            let task = Arc::clone(&tasks[idx]);
            pending -= 1;
            reporter.set_pending(pending);
            reporter.set_current(Some(Arc::clone(&task)));
            info!("{}: remoto en marcha, empieza el trabajo local", task.target());

            self.run_local(&task, &reporter).await?;

            let handles = std::mem::take(&mut remote_handles[idx]);
            let commit_checkpointer = Arc::clone(&checkpointer);
            let commit_reporter = Arc::clone(&reporter);
            commits.spawn(async move {
                await_remote(&task, handles).await?;
                let entry = commit_checkpointer.commit(&task).await?;
                commit_reporter.refresh();
                Ok(entry)
            });

            // un commit fallido aborta sin esperar al resto
            while let Some(res) = commits.try_join_next() {
                res??;
            }
        }

        reporter.set_current(None);
        while let Some(res) = commits.join_next().await {
            res??;
        }

        // 4) Verificación final de conteos
        let run_set = checkpointer.run_set().await;
        verify_counts(&run_set, self.samples)?;

        // 5) Archivo
        let manifest = self.archiver.archive(&run_set, self.samples)?;

        Ok(RunReport {
            run_set,
            measured: pending_targets,
            skipped,
            manifest,
        })
    }

    fn spawn_remote(&self, task: &Arc<Task>, reporter: &Arc<ProgressReporter>) -> Vec<RemoteHandle> {
        (0..self.samples)
            .map(|execution| {
                let runner = self.remote.clone();
                let task = Arc::clone(task);
                let reporter = Arc::clone(reporter);
                tokio::spawn(async move {
                    let sample = runner.run(task.target(), task.started()).await?;
                    task.record_remote_sample(execution, sample);
                    reporter.refresh();
                    Ok(())
                })
            })
            .collect()
    }

    /// Las N muestras locales de la task, estrictamente en secuencia.
    async fn run_local(&self, task: &Task, reporter: &ProgressReporter) -> Result<(), RunError> {
        for _ in 0..task.samples() {
            let sample = {
                let runner = self.local.lock().await;
                runner.run(task.target()).await.map_err(|source| RunError::Sample {
                    target: task.target().to_string(),
                    kind: SampleKind::Local,
                    source,
                })?
            };
            task.record_local_sample(sample);
            reporter.refresh();
        }
        Ok(())
    }
}

async fn await_remote(task: &Task, handles: Vec<RemoteHandle>) -> Result<(), RunError> {
    for handle in handles {
        handle.await?.map_err(|source| RunError::Sample {
            target: task.target().to_string(),
            kind: SampleKind::Remote,
            source,
        })?;
    }
    Ok(())
}

/// Cada entrada debe tener exactamente N referencias de cada tipo.
pub fn verify_counts(run_set: &RunSet, samples: usize) -> Result<(), RunError> {
    for entry in &run_set.entries {
        for kind in [SampleKind::Remote, SampleKind::Local] {
            let actual = entry.refs(kind).len();
            if actual != samples {
                return Err(RunError::CountMismatch {
                    target: entry.target.clone(),
                    kind,
                    expected: samples,
                    actual,
                });
            }
        }
    }
    Ok(())
}
