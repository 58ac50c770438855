use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use common::Target;

use crate::error::RunError;

/// Variable de entorno con la API key del servicio remoto.
pub const CREDENTIAL_ENV: &str = "WPT_KEY";

const DEFAULT_SAMPLES: usize = 9;
const DEFAULT_WPT_URL: &str = "https://www.webpagetest.org";

/// Muestras por target. Se puede sobreescribir con la env var SAMPLES.
pub fn default_samples() -> usize {
    env::var("SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_SAMPLES)
}

/// URL base del servicio remoto (env WPT_URL, o la pública por defecto).
pub fn wpt_base_url() -> String {
    env::var("WPT_URL").unwrap_or_else(|_| DEFAULT_WPT_URL.to_string())
}

pub fn credential_from_env() -> Result<String, RunError> {
    credential_from(env::var(CREDENTIAL_ENV).ok())
}

fn credential_from(value: Option<String>) -> Result<String, RunError> {
    match value.map(|v| v.trim().to_string()) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(RunError::MissingCredential(CREDENTIAL_ENV)),
    }
}

/// Una línea por target; ignora líneas vacías y comentarios con `#`.
pub fn parse_targets(text: &str) -> Vec<Target> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Junta targets del archivo y de la línea de comandos, sin repetir y en orden.
pub fn read_targets(file: Option<&Path>, extra: &[String]) -> io::Result<Vec<Target>> {
    let mut all = match file {
        Some(path) => parse_targets(&fs::read_to_string(path)?),
        None => Vec::new(),
    };
    all.extend(extra.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));

    let mut seen = HashSet::new();
    all.retain(|t| seen.insert(t.clone()));

    if all.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no hay targets para medir",
        ));
    }
    Ok(all)
}

/// Configuración de una corrida de `collect`.
#[derive(Debug, Clone)]
pub struct Config {
    pub targets: Vec<Target>,
    pub samples: usize,
    pub output_dir: PathBuf,
    pub wpt_url: String,
    pub wpt_location: Option<String>,
    pub api_key: String,
    pub local_program: String,
    pub local_workdir: PathBuf,
    /// Unidad de tiempo de la fórmula de espera entre polls.
    pub poll_unit: Duration,
}
