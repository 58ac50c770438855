use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use common::{CheckpointEntry, RunSet};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::atomic_write;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Recibe el RunSet final una vez verificado.
pub trait Archiver: Send + Sync {
    fn archive(&self, run_set: &RunSet, samples: usize) -> io::Result<PathBuf>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub collected_on: Option<String>,
    pub samples: usize,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<CheckpointEntry>,
}

/// Escribe `manifest.json` en el directorio de salida.
pub struct ManifestArchiver {
    root: PathBuf,
}

impl ManifestArchiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Archiver for ManifestArchiver {
    fn archive(&self, run_set: &RunSet, samples: usize) -> io::Result<PathBuf> {
        let manifest = Manifest {
            collected_on: run_set.collected_on.clone(),
            samples,
            finished_at: Utc::now(),
            entries: run_set.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let path = self.root.join(MANIFEST_FILE);
        atomic_write(&path, &bytes)?;
        info!("manifest con {} targets en {}", manifest.entries.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::tests::temp_dir;
    use common::{artifact_ref, SampleKind};

    #[test]
    fn manifest_lista_las_entradas() {
        let dir = temp_dir("archive_manifest");
        let run_set = RunSet {
            collected_on: Some("bench-01".into()),
            updated_at: None,
            entries: vec![CheckpointEntry {
                target: "https://a.test/".into(),
                remote: vec![artifact_ref("https://a.test/", SampleKind::Remote, 0)],
                local: vec![artifact_ref("https://a.test/", SampleKind::Local, 0)],
            }],
        };

        let path = ManifestArchiver::new(&dir).archive(&run_set, 1).unwrap();

        let m: Manifest = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(m.samples, 1);
        assert_eq!(m.collected_on.as_deref(), Some("bench-01"));
        assert_eq!(m.entries, run_set.entries);
    }
}
