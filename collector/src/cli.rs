use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::archive::ManifestArchiver;
use crate::config::{self, Config};
use crate::local::{LocalSampleRunner, ProcessLocalTool};
use crate::orchestrator::Orchestrator;
use crate::remote::{HttpRemoteService, RemoteSampleRunner};
use crate::store::{CheckpointStore, FsCheckpointStore};

#[derive(Parser)]
#[command(name = "collector")]
#[command(about = "Junta muestras remotas (WebPageTest) y locales (lighthouse) por target")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mide los targets que todavía no tienen checkpoint completo
    Collect(CollectArgs),
    /// Muestra qué targets ya tienen checkpoint completo (no usa la red)
    Status(StatusArgs),
}

#[derive(Args)]
struct CollectArgs {
    /// Targets (URLs) a medir, además de los de --targets-file
    #[arg(value_name = "TARGET")]
    targets: Vec<String>,

    /// Archivo con un target por línea
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Muestras por target y por tipo (default: env SAMPLES o 9)
    #[arg(long)]
    samples: Option<usize>,

    /// Directorio de salida (runset.json + artefactos)
    #[arg(long, default_value = "collected")]
    output_dir: PathBuf,

    /// URL base del servicio remoto (default: env WPT_URL)
    #[arg(long)]
    wpt_url: Option<String>,

    /// Location del agente remoto
    #[arg(long)]
    wpt_location: Option<String>,

    /// Programa local de medición
    #[arg(long, default_value = "lighthouse")]
    local_program: String,

    /// Directorio de trabajo de la herramienta local
    #[arg(long)]
    local_workdir: Option<PathBuf>,

    /// Unidad (ms) de la espera entre polls: min(30 + 10 * cola, 10000) unidades
    #[arg(long, default_value_t = 1000)]
    poll_unit_ms: u64,
}

#[derive(Args)]
struct StatusArgs {
    /// Targets a consultar; si no hay, lista todo el runset
    #[arg(value_name = "TARGET")]
    targets: Vec<String>,

    #[arg(long)]
    targets_file: Option<PathBuf>,

    #[arg(long)]
    samples: Option<usize>,

    #[arg(long, default_value = "collected")]
    output_dir: PathBuf,
}

impl CollectArgs {
    fn into_config(self, api_key: String) -> Result<Config> {
        let samples = self.samples.unwrap_or_else(config::default_samples);
        if samples == 0 {
            bail!("--samples tiene que ser al menos 1");
        }
        let targets = config::read_targets(self.targets_file.as_deref(), &self.targets)
            .context("leyendo targets")?;
        let local_workdir = self
            .local_workdir
            .unwrap_or_else(|| self.output_dir.join(".local-run"));

        Ok(Config {
            targets,
            samples,
            output_dir: self.output_dir,
            wpt_url: self.wpt_url.unwrap_or_else(config::wpt_base_url),
            wpt_location: self.wpt_location,
            api_key,
            local_program: self.local_program,
            local_workdir,
            poll_unit: Duration::from_millis(self.poll_unit_ms),
        })
    }
}

async fn collect(args: CollectArgs) -> Result<()> {
    // sin credencial no se crea ninguna task
    let api_key = config::credential_from_env()?;
    let config = args.into_config(api_key)?;

    let service = Arc::new(HttpRemoteService::new(
        config.wpt_url.clone(),
        config.api_key.clone(),
        config.wpt_location.clone(),
    ));
    let tool = Arc::new(ProcessLocalTool::new(config.local_program.clone(), Vec::new()));
    let store = Arc::new(FsCheckpointStore::new(&config.output_dir));

    let orchestrator = Orchestrator::new(
        RemoteSampleRunner::new(service, config.poll_unit),
        LocalSampleRunner::new(tool, config.local_workdir.clone()),
        store,
        Arc::new(ManifestArchiver::new(&config.output_dir)),
        config.samples,
    );

    let report = orchestrator.run(&config.targets).await?;

    println!("Corrida terminada:");
    println!("  medidos : {}", report.measured.len());
    println!("  saltados: {} (ya tenían checkpoint)", report.skipped.len());
    println!("  muestras: {} remotas + {} locales por target", config.samples, config.samples);
    println!("  manifest: {}", report.manifest.display());
    Ok(())
}

fn status(args: StatusArgs) -> Result<()> {
    let samples = args.samples.unwrap_or_else(config::default_samples);
    let store = FsCheckpointStore::new(&args.output_dir);
    let run_set = store
        .load()
        .with_context(|| format!("leyendo checkpoint en {}", args.output_dir.display()))?;

    let targets: Vec<String> = if args.targets.is_empty() && args.targets_file.is_none() {
        run_set.entries.iter().map(|e| e.target.clone()).collect()
    } else {
        config::read_targets(args.targets_file.as_deref(), &args.targets)?
    };

    if targets.is_empty() {
        println!("No hay checkpoints en {}", args.output_dir.display());
        return Ok(());
    }

    let mut complete = 0;
    for target in &targets {
        match run_set.get(target) {
            Some(e) if e.is_complete(samples) => {
                complete += 1;
                println!("  [ok]       {}", target);
            }
            Some(e) => println!(
                "  [parcial]  {} (remoto {}/{}, local {}/{})",
                target,
                e.remote.len(),
                samples,
                e.local.len(),
                samples
            ),
            None => println!("  [pendiente] {}", target),
        }
    }
    println!("{}/{} targets completos (N={})", complete, targets.len(), samples);
    Ok(())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Collect(args) => collect(args).await,
        Commands::Status(args) => status(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_es_valida() {
        Cli::command().debug_assert();
    }

    #[test]
    fn collect_arma_config_con_defaults() {
        let cli = Cli::try_parse_from([
            "collector",
            "collect",
            "https://a.test/",
            "--samples",
            "3",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        let Commands::Collect(args) = cli.command else {
            panic!("se esperaba collect");
        };

        let config = args.into_config("key".into()).unwrap();

        assert_eq!(config.samples, 3);
        assert_eq!(config.targets, vec!["https://a.test/"]);
        assert_eq!(config.local_workdir, PathBuf::from("/tmp/out/.local-run"));
        assert_eq!(config.poll_unit, Duration::from_secs(1));
    }

    #[test]
    fn collect_rechaza_cero_muestras() {
        let cli = Cli::try_parse_from(["collector", "collect", "https://a.test/", "--samples", "0"]).unwrap();
        let Commands::Collect(args) = cli.command else {
            panic!("se esperaba collect");
        };
        assert!(args.into_config("key".into()).is_err());
    }
}
