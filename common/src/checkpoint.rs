use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::sample::{SampleKind, Target};

/// Archivos que se guardan por muestra dentro de su directorio.
pub const REPORT_FILE: &str = "lhr.json";
pub const LOG_FILE: &str = "devtoolslog.json";
pub const TRACE_FILE: &str = "trace.json";

/// Referencia (relativa al directorio de salida) a los artefactos de una muestra.
pub type ArtifactRef = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub target: Target,
    pub remote: Vec<ArtifactRef>,
    pub local: Vec<ArtifactRef>,
}

impl CheckpointEntry {
    pub fn refs(&self, kind: SampleKind) -> &[ArtifactRef] {
        match kind {
            SampleKind::Remote => &self.remote,
            SampleKind::Local => &self.local,
        }
    }

    pub fn is_complete(&self, samples: usize) -> bool {
        self.remote.len() == samples && self.local.len() == samples
    }
}

/// Estado reanudable de toda la corrida.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSet {
    #[serde(default)]
    pub collected_on: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<CheckpointEntry>,
}

impl RunSet {
    pub fn get(&self, target: &str) -> Option<&CheckpointEntry> {
        self.entries.iter().find(|e| e.target == target)
    }

    /// Inserta la entrada; si el target ya estaba, la reemplaza en su lugar.
    pub fn upsert(&mut self, entry: CheckpointEntry) {
        match self.entries.iter_mut().find(|e| e.target == entry.target) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.updated_at = Some(Utc::now());
    }

    /// Saca las entradas incompletas (y duplicados) y devuelve los targets descartados.
    pub fn retain_complete(&mut self, samples: usize) -> Vec<Target> {
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        self.entries.retain(|e| {
            if e.is_complete(samples) && seen.insert(e.target.clone()) {
                true
            } else {
                dropped.push(e.target.clone());
                false
            }
        });
        dropped
    }

    pub fn completed_targets(&self, samples: usize) -> HashSet<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_complete(samples))
            .map(|e| e.target.as_str())
            .collect()
    }
}

/// Largo máximo del prefijo legible del slug.
pub const SLUG_PREFIX_MAX: usize = 64;

/// Slug apto para nombre de directorio: prefijo legible (lo no alfanumérico
/// pasa a `-`, cortado a [`SLUG_PREFIX_MAX`]) más 16 hex del sha256 del target
/// completo, así dos targets distintos nunca comparten directorio.
pub fn target_slug(target: &str) -> String {
    let prefix: String = target
        .chars()
        .take(SLUG_PREFIX_MAX)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let digest = Sha256::digest(target.as_bytes());
    format!("{}-{}", prefix, hex::encode(&digest[..8]))
}

/// Directorio (relativo) de los artefactos de una muestra: `<slug>/<kind>-<index>`.
pub fn artifact_ref(target: &str, kind: SampleKind, index: usize) -> ArtifactRef {
    format!("{}/{}-{}", target_slug(target), kind.as_str(), index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(target: &str, remote: usize, local: usize) -> CheckpointEntry {
        CheckpointEntry {
            target: target.to_string(),
            remote: (0..remote).map(|i| artifact_ref(target, SampleKind::Remote, i)).collect(),
            local: (0..local).map(|i| artifact_ref(target, SampleKind::Local, i)).collect(),
        }
    }

    #[test]
    fn naming_es_deterministico() {
        let r = artifact_ref("https://example.com/a?b=1", SampleKind::Local, 2);
        assert!(r.starts_with("https---example-com-a-b-1-"), "{r}");
        assert!(r.ends_with("/local-2"), "{r}");
        assert_eq!(
            artifact_ref("https://example.com/", SampleKind::Remote, 0),
            artifact_ref("https://example.com/", SampleKind::Remote, 0)
        );
    }

    #[test]
    fn slug_distingue_targets_que_sanitizan_igual() {
        let a = target_slug("https://a.test/x-y");
        let b = target_slug("https://a.test/x/y");
        assert_ne!(a, b);
        assert!(a.starts_with("https---a-test-x-y-"));
        assert!(b.starts_with("https---a-test-x-y-"));
    }

    #[test]
    fn slug_de_target_largo_entra_en_un_nombre_de_archivo() {
        let long = format!("https://a.test/buscar?q={}", "x".repeat(400));
        let slug = target_slug(&long);
        // prefijo + '-' + 16 hex
        assert_eq!(slug.len(), SLUG_PREFIX_MAX + 1 + 16);
        assert!(slug.len() < 255);

        // mismo prefijo, distinto final: distinto slug
        let other = format!("{}y", long);
        assert_ne!(target_slug(&other), slug);
    }

    #[test]
    fn upsert_reemplaza_target_existente() {
        let mut set = RunSet::default();
        set.upsert(entry("a", 1, 1));
        set.upsert(entry("b", 2, 2));
        set.upsert(entry("a", 2, 2));

        assert_eq!(set.entries.len(), 2);
        assert_eq!(set.entries[0].target, "a");
        assert!(set.get("a").unwrap().is_complete(2));
        assert!(set.updated_at.is_some());
    }

    #[test]
    fn retain_complete_descarta_incompletas() {
        let mut set = RunSet {
            entries: vec![entry("a", 3, 3), entry("b", 3, 2), entry("c", 3, 3)],
            ..Default::default()
        };
        let dropped = set.retain_complete(3);
        assert_eq!(dropped, vec!["b".to_string()]);
        assert_eq!(set.completed_targets(3).len(), 2);
        assert!(set.get("b").is_none());
    }

    #[test]
    fn completed_targets_depende_de_n() {
        let set = RunSet {
            entries: vec![entry("a", 2, 2)],
            ..Default::default()
        };
        assert!(set.completed_targets(2).contains("a"));
        assert!(set.completed_targets(3).is_empty());
    }
}
