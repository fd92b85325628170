// ============================================================================
// File: packages/adles/src/main.rs
// ----------------------------------------------------------------------------
// Command line interface.
//
// Exit codes: 0 success, 1 validation or configuration failure, 2 a phase
// finished with failed operations, 130 cancelled.
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use adles::driver::{DriverSession, available_drivers, create_driver};
use adles::logging::{self, LogOptions};
use adles::{
    AdlesError, InfraConfig, OperationTree, PackageSpec, Phase, PhaseExecutor, Specification,
    build, resolve,
};

const EXIT_INVALID: u8 = 1;
const EXIT_FAILED_OPERATIONS: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "adles", version, about = "Deploy lab environments from YAML specifications")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,

    /// Also send log lines to a syslog server, host[:port]
    #[arg(long, global = true, value_name = "SERVER")]
    syslog: Option<String>,

    /// Infrastructure file, overriding metadata.infra-file
    #[arg(short, long, global = true, value_name = "FILE")]
    infra: Option<PathBuf>,

    /// Maximum concurrent platform calls
    #[arg(long, global = true, value_name = "N")]
    max_in_flight: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a specification without touching any platform
    Validate {
        #[arg(short = 't', long = "type", value_enum, default_value_t = SpecType::Exercise)]
        spec_type: SpecType,
        spec: PathBuf,
    },

    /// Print the operation tree of an environment
    Plan { spec: PathBuf },

    /// Create master instances
    Masters { spec: PathBuf },

    /// Create the environment
    Deploy { spec: PathBuf },

    /// Remove masters or the environment
    Cleanup {
        #[arg(short = 't', long = "type", value_enum, default_value_t = CleanupType::Environment)]
        cleanup_type: CleanupType,

        /// Delete networks as well
        #[arg(long)]
        cleanup_nets: bool,

        spec: PathBuf,
    },

    /// Check a package and the environment it bundles
    Package { spec: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SpecType {
    Exercise,
    Package,
    Infra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CleanupType {
    Masters,
    Environment,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = LogOptions {
        verbose: cli.verbose,
        no_color: cli.no_color,
        syslog: cli.syslog.clone(),
    };
    if let Err(e) = logging::init(&options) {
        eprintln!("adles: {e}");
        return ExitCode::from(EXIT_INVALID);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("adles: {e:#}");
            let adles_error = e.downcast_ref::<AdlesError>();
            if let Some(err) = adles_error.filter(|err| err.is_structural()) {
                for line in err.problem_lines() {
                    eprintln!("  {line}");
                }
            }
            match adles_error {
                Some(AdlesError::Cancelled) => ExitCode::from(EXIT_CANCELLED),
                _ => ExitCode::from(EXIT_INVALID),
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Validate { spec_type, spec } => validate(&cli, *spec_type, spec),
        Command::Plan { spec } => {
            let spec = load_spec(spec)?;
            let infra = load_infra(&cli, &spec, None)?;
            let tree = plan_environment(&spec, &infra)?;
            print!("{}", tree.render());
            Ok(ExitCode::SUCCESS)
        }
        Command::Masters { spec } => execute(&cli, spec, Phase::Masters, false).await,
        Command::Deploy { spec } => execute(&cli, spec, Phase::Deploy, false).await,
        Command::Cleanup {
            cleanup_type,
            cleanup_nets,
            spec,
        } => {
            let phase = match cleanup_type {
                CleanupType::Masters => Phase::CleanupMasters,
                CleanupType::Environment => Phase::CleanupEnvironment,
            };
            execute(&cli, spec, phase, *cleanup_nets).await
        }
        Command::Package { spec } => package(&cli, spec),
    }
}

fn validate(cli: &Cli, spec_type: SpecType, path: &Path) -> anyhow::Result<ExitCode> {
    match spec_type {
        SpecType::Exercise => {
            let spec = load_spec(path)?;
            let infra = load_infra(cli, &spec, None)?;
            let tree = plan_environment(&spec, &infra)?;
            println!(
                "{} is a valid exercise specification ({} operations)",
                path.display(),
                tree.len()
            );
        }
        SpecType::Package => {
            let package = PackageSpec::from_path(path)
                .with_context(|| format!("loading package {}", path.display()))?;
            for warning in &package.warnings {
                println!("warning: {warning}");
            }
            println!("{} is a valid package specification", path.display());
        }
        SpecType::Infra => {
            let infra = InfraConfig::from_path(path)
                .with_context(|| format!("loading infrastructure {}", path.display()))?;
            println!(
                "{} is a valid infrastructure file for the {} platform (available: {})",
                path.display(),
                infra.platform.name(),
                available_drivers().join(", ")
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn package(cli: &Cli, path: &Path) -> anyhow::Result<ExitCode> {
    let package = PackageSpec::from_path(path)
        .with_context(|| format!("loading package {}", path.display()))?;
    for warning in &package.warnings {
        log::warn!("{warning}");
    }
    let environment = package
        .environment_path()
        .ok_or_else(|| AdlesError::config("package names no environment"))?;
    let spec = load_spec(&environment)?;
    let infra = load_infra(cli, &spec, package.infrastructure_path())?;
    let tree = plan_environment(&spec, &infra)?;
    println!(
        "package {}: environment {} ({} operations) on the {} platform",
        package.metadata.name.as_deref().unwrap_or("<unnamed>"),
        spec.metadata.display_name(),
        tree.len(),
        infra.platform.name()
    );
    Ok(ExitCode::SUCCESS)
}

/// Run one phase against the configured platform
async fn execute(
    cli: &Cli,
    path: &Path,
    phase: Phase,
    cleanup_networks: bool,
) -> anyhow::Result<ExitCode> {
    let spec = load_spec(path)?;
    let infra = load_infra(cli, &spec, None)?;
    let tree = plan_environment(&spec, &infra)?;

    let driver = create_driver(&infra)?;
    let session = DriverSession::open(driver)
        .await
        .with_context(|| format!("connecting to the {} platform", infra.platform.name()))?;

    let executor = PhaseExecutor::new(session.driver(), tree, spec.metadata.display_name())
        .with_max_in_flight(infra.max_in_flight)
        .with_power_on(infra.power_on)
        .with_cleanup_networks(cleanup_networks);

    let cancel = executor.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, waiting for in-flight operations");
            cancel.cancel();
        }
    });

    let result = executor.run(phase).await;
    interrupt.abort();
    if let Err(e) = session.close().await {
        log::warn!("releasing the platform session: {e}");
    }
    let report = result.context("executor task failed")??;

    print!("{}", report.render());
    Ok(if report.cancelled {
        ExitCode::from(EXIT_CANCELLED)
    } else if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED_OPERATIONS)
    })
}

fn load_spec(path: &Path) -> anyhow::Result<Specification> {
    Specification::from_path(path).with_context(|| format!("loading {}", path.display()))
}

/// Infrastructure from `--infra`, a package, or `metadata.infra-file`
///
/// Without any of them the simulation platform is used.
fn load_infra(
    cli: &Cli,
    spec: &Specification,
    package_infra: Option<PathBuf>,
) -> anyhow::Result<InfraConfig> {
    let from_spec = spec.metadata.infra_file.as_ref().map(|file| match spec.base_dir() {
        Some(dir) => dir.join(file),
        None => file.clone(),
    });
    let path = cli.infra.clone().or(package_infra).or(from_spec);

    let infra = match path {
        Some(path) => InfraConfig::from_path(&path)
            .with_context(|| format!("loading infrastructure {}", path.display()))?,
        None => {
            log::warn!("no infrastructure file given, using the simulation platform");
            InfraConfig::simulation()
        }
    };
    let infra = infra.with_env_overrides()?;
    Ok(match cli.max_in_flight {
        Some(n) => infra.with_max_in_flight(n),
        None => infra,
    })
}

fn plan_environment(spec: &Specification, infra: &InfraConfig) -> anyhow::Result<OperationTree> {
    let resolution = resolve(spec);
    for warning in resolution.diagnostics.warnings() {
        log::warn!("{warning}");
    }
    let symbols = resolution.into_result()?;
    let tree = build(spec, &symbols, infra.thresholds)?;
    log::debug!(
        "planned {} operations for {}",
        tree.len(),
        spec.metadata.display_name()
    );
    Ok(tree)
}
