use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::task::Task;

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentProgress {
    pub target: String,
    pub local_done: usize,
    pub remote_done: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub remote_done: usize,
    pub remote_expected: usize,
    pub pending: usize,
    pub current: Option<CurrentProgress>,
}

/// Conteos actuales a partir del estado de las tasks; no guarda nada.
pub fn snapshot(tasks: &[Arc<Task>], pending: usize, current: Option<&Task>) -> ProgressSnapshot {
    ProgressSnapshot {
        remote_done: tasks.iter().map(|t| t.remote_count()).sum(),
        remote_expected: tasks.iter().map(|t| t.samples()).sum(),
        pending,
        current: current.map(|t| CurrentProgress {
            target: t.target().to_string(),
            local_done: t.local_count(),
            remote_done: t.remote_count(),
            samples: t.samples(),
        }),
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remoto {}/{} | pendientes {}",
            self.remote_done, self.remote_expected, self.pending
        )?;
        if let Some(ref c) = self.current {
            write!(
                f,
                " | actual {} local {}/{} remoto {}/{}",
                c.target, c.local_done, c.samples, c.remote_done, c.samples
            )?;
        }
        Ok(())
    }
}

/// Reporter explícito de la corrida; se comparte entre orchestrator y runners.
pub struct ProgressReporter {
    tasks: Vec<Arc<Task>>,
    pending: AtomicUsize,
    current: Mutex<Option<Arc<Task>>>,
}

impl ProgressReporter {
    pub fn new(tasks: Vec<Arc<Task>>) -> Self {
        let pending = tasks.len();
        Self {
            tasks,
            pending: AtomicUsize::new(pending),
            current: Mutex::new(None),
        }
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::SeqCst);
        self.refresh();
    }

    pub fn set_current(&self, task: Option<Arc<Task>>) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = task;
        self.refresh();
    }

    /// Recalcula y emite la línea de progreso.
    pub fn refresh(&self) -> ProgressSnapshot {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let snap = snapshot(&self.tasks, self.pending.load(Ordering::SeqCst), current.as_deref());
        info!("{}", snap);
        snap
    }
}
