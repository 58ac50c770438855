use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{Sample, SampleKind, TracePayload};
use serde_json::Value;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::SampleError;
use crate::retry::retry_forever;

/// Artefactos que deja la herramienta local en su directorio de trabajo.
pub const LOCAL_REPORT: &str = "lhr.json";
pub const LOCAL_LOG: &str = "defaultPass.devtoolslog.json";
pub const LOCAL_TRACE: &str = "defaultPass.trace.json";

/// Herramienta local de medición. Debe dejar los tres artefactos en `workdir`.
#[async_trait]
pub trait LocalTool: Send + Sync {
    async fn invoke(&self, target: &str, workdir: &Path) -> Result<(), SampleError>;
}

/// Lanza un programa externo (lighthouse) en modo "provided" (sin throttling).
pub struct ProcessLocalTool {
    program: String,
    extra_args: Vec<String>,
}

impl ProcessLocalTool {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }
}

#[async_trait]
impl LocalTool for ProcessLocalTool {
    async fn invoke(&self, target: &str, workdir: &Path) -> Result<(), SampleError> {
        let output = Command::new(&self.program)
            .arg(target)
            .arg("--throttling-method=provided")
            .arg("--output=json")
            .arg(format!("--output-path={}", workdir.join(LOCAL_REPORT).display()))
            .arg(format!("-G={}", workdir.display()))
            .args(&self.extra_args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => SampleError::ToolUnavailable {
                    program: self.program.clone(),
                    reason: e.to_string(),
                },
                _ => SampleError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(3)..].join(" | ");
            return Err(SampleError::ProcessFailed(format!("{} ({})", output.status, tail)));
        }
        Ok(())
    }
}

/// Una muestra local: limpia el directorio, corre la herramienta, lee y valida
/// los artefactos. No hace concurrencia propia: el orchestrator garantiza que
/// hay a lo sumo una corrida local en vuelo.
pub struct LocalSampleRunner<T> {
    tool: Arc<T>,
    workdir: PathBuf,
    sys: Mutex<System>,
}

impl<T: LocalTool> LocalSampleRunner<T> {
    pub fn new(tool: Arc<T>, workdir: impl Into<PathBuf>) -> Self {
        // el uso de CPU sale de la diferencia entre dos refresh: el primero va acá
        let mut sys = System::new();
        sys.refresh_cpu();
        Self {
            tool,
            workdir: workdir.into(),
            sys: Mutex::new(sys),
        }
    }

    pub async fn run(&self, target: &str) -> Result<Sample, SampleError> {
        let what = format!("local {}", target);
        retry_forever(&what, SampleError::is_transient, |_| self.attempt(target)).await
    }

    async fn attempt(&self, target: &str) -> Result<Sample, SampleError> {
        prepare_workdir(&self.workdir).await?;
        let cpu = self.host_cpu_percent();
        debug!("{}: corrida local (cpu host {:.1}%)", target, cpu);

        self.tool.invoke(target, &self.workdir).await?;

        let report = read_artifact(&self.workdir, LOCAL_REPORT).await?;
        let log = read_artifact(&self.workdir, LOCAL_LOG).await?;
        let trace = match read_artifact(&self.workdir, LOCAL_TRACE).await? {
            Value::Array(events) => events,
            other => serde_json::from_value::<TracePayload>(other)
                .map_err(|e| SampleError::Decode(format!("{}: {}", LOCAL_TRACE, e)))?
                .into_events(),
        };

        Ok(Sample::new(SampleKind::Local, report, Some(trace), Some(log))?.with_host_cpu(cpu))
    }

    fn host_cpu_percent(&self) -> f32 {
        let mut sys = self.sys.lock().unwrap_or_else(|p| p.into_inner());
        sys.refresh_cpu();
        sys.global_cpu_info().cpu_usage()
    }
}

/// Deja el directorio vacío para no confundir artefactos viejos con nuevos.
async fn prepare_workdir(dir: &Path) -> Result<(), SampleError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

async fn read_artifact(dir: &Path, name: &str) -> Result<Value, SampleError> {
    let bytes = match tokio::fs::read(dir.join(name)).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SampleError::MissingArtifact(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| SampleError::Decode(format!("{}: {}", name, e)))
}
