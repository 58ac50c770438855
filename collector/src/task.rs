use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use common::{Sample, Target};
use tokio::sync::watch;

/// Señal de un solo disparo: "el trabajo remoto ya empezó".
///
/// Dispararla más de una vez no hace nada; guarda el instante del primer disparo.
#[derive(Clone)]
pub struct StartedSignal {
    tx: Arc<watch::Sender<Option<Instant>>>,
}

impl StartedSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Devuelve true sólo para la llamada que efectivamente disparó la señal.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired_at| {
            if fired_at.is_none() {
                *fired_at = Some(Instant::now());
                true
            } else {
                false
            }
        })
    }

    pub fn fired_at(&self) -> Option<Instant> {
        *self.tx.borrow()
    }

    /// Espera al disparo (retorna en seguida si ya ocurrió).
    pub async fn wait(&self) -> Option<Instant> {
        let mut rx = self.tx.subscribe();
        let fired_at = rx.wait_for(|v| v.is_some()).await.ok().and_then(|v| *v);
        fired_at
    }
}

impl Default for StartedSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Estado de un target: N muestras remotas (llegan en cualquier orden),
/// N locales (en orden) y la señal de inicio remoto.
///
/// No hace control de concurrencia más allá de los mutex de cada lista: el
/// orchestrator garantiza que las muestras locales se agregan de a una.
pub struct Task {
    target: Target,
    samples: usize,
    /// (índice de la ejecución remota, muestra), en orden de llegada.
    remote: Mutex<Vec<(usize, Sample)>>,
    local: Mutex<Vec<Sample>>,
    started: StartedSignal,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Task {
    pub fn new(target: Target, samples: usize) -> Self {
        Self {
            target,
            samples,
            remote: Mutex::new(Vec::with_capacity(samples)),
            local: Mutex::new(Vec::with_capacity(samples)),
            started: StartedSignal::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn started(&self) -> &StartedSignal {
        &self.started
    }

    /// Agrega una muestra remota y dispara la señal de inicio (primer éxito).
    pub fn record_remote_sample(&self, execution: usize, sample: Sample) -> usize {
        let count = {
            let mut remote = lock(&self.remote);
            remote.push((execution, sample));
            remote.len()
        };
        self.started.fire();
        count
    }

    pub fn record_local_sample(&self, sample: Sample) -> usize {
        let mut local = lock(&self.local);
        local.push(sample);
        local.len()
    }

    pub fn remote_count(&self) -> usize {
        lock(&self.remote).len()
    }

    pub fn local_count(&self) -> usize {
        lock(&self.local).len()
    }

    pub fn is_remote_complete(&self) -> bool {
        self.remote_count() == self.samples
    }

    pub fn is_local_complete(&self) -> bool {
        self.local_count() == self.samples
    }

    pub fn is_done(&self) -> bool {
        self.is_remote_complete() && self.is_local_complete()
    }

    /// Muestras remotas ordenadas por índice de ejecución (orden de creación).
    pub fn remote_samples(&self) -> Vec<Sample> {
        let mut remote: Vec<(usize, Sample)> = lock(&self.remote).clone();
        remote.sort_by_key(|(execution, _)| *execution);
        remote.into_iter().map(|(_, s)| s).collect()
    }

    pub fn local_samples(&self) -> Vec<Sample> {
        lock(&self.local).clone()
    }
}
