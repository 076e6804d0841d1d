mod registry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rekey_core::{DependencyGraph, DependencyReport, build_dependency_report};
use rekey_engine::{ImportError, RunOptions, run_manifest};
use rekey_plan::{
    Manifest, PlanError, ValidationReport, load_manifest, manifest_json_schema, validate_manifest,
};
use registry::{RunContext, init_run_logging, start_run, write_report};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("manifest error: {0}")]
    Plan(#[from] PlanError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest check failed with {0} error(s)")]
    CheckFailed(usize),
}

#[derive(Parser, Debug)]
#[command(name = "rekey", version, about = "Migrate legacy tables and re-key their foreign keys")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a manifest and export the migrated tables.
    Run(RunArgs),
    /// Validate a manifest and print its execution order.
    Check(CheckArgs),
    /// Print the JSON Schema of the manifest format.
    Schema,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the manifest file.
    #[arg(value_name = "MANIFEST")]
    manifest: PathBuf,
    /// Only run these definitions (plus their dependencies).
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Directory for exported tables (defaults to the manifest target).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Path to the manifest file.
    #[arg(value_name = "MANIFEST")]
    manifest: PathBuf,
    /// Only check the order for these definitions (plus their dependencies).
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Check(args) => check(args),
        Command::Schema => schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<(), CliError> {
    let RunArgs {
        manifest,
        only,
        run_dir,
        out,
    } = args;

    let run_ctx = RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: chrono::Utc::now(),
        manifest,
        only,
        run_dir,
        out,
    };

    let run_paths = start_run(&run_ctx)?;
    let logger = init_run_logging(&run_paths.logs_path)?;

    tracing::dispatcher::with_default(&logger, || {
        tracing::info!(
            event = "run_started",
            run_id = %run_ctx.run_id,
            manifest = %run_ctx.manifest.display()
        );
    });

    let options = RunOptions {
        out_dir: run_ctx.out.clone(),
        logger: Some(logger.clone()),
    };
    let only = (!run_ctx.only.is_empty()).then_some(run_ctx.only.as_slice());
    let result = run_manifest(&run_ctx.manifest, only, &options);

    let finished = tracing::dispatcher::with_default(&logger, || match result {
        Ok(run) => {
            tracing::info!(
                event = "run_finished",
                status = "success",
                rows_written = run.report.totals.rows_written,
                duration_ms = run.report.duration_ms
            );
            Ok(run)
        }
        Err(err) => {
            tracing::error!(event = "run_finished", status = "failed", error = %err);
            Err(err)
        }
    })?;

    write_report(&run_paths, &finished.report)?;
    println!(
        "imported {} definition(s), {} row(s) written to {}",
        finished.report.definitions.len(),
        finished.report.totals.rows_written,
        finished.out_dir.display()
    );
    println!("run artifacts: {}", run_paths.root.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    ok: bool,
    issues: &'a ValidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependencies: Option<DependencyReport>,
}

fn check(args: CheckArgs) -> Result<(), CliError> {
    let manifest = load_manifest(&args.manifest)?;
    let issues = validate_manifest(&manifest);
    let only = (!args.only.is_empty()).then_some(args.only.as_slice());

    let dependencies = issues
        .is_ok()
        .then(|| build_dependency_report(&dependency_graph(&manifest), only));
    let ok = issues.is_ok()
        && dependencies
            .as_ref()
            .is_some_and(|report| report.order.is_some());

    let output = CheckOutput {
        ok,
        issues: &issues,
        dependencies,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !issues.is_ok() {
        eprint!("{issues}");
        return Err(CliError::CheckFailed(issues.errors.len()));
    }
    if !ok {
        return Err(CliError::CheckFailed(1));
    }
    Ok(())
}

fn dependency_graph(manifest: &Manifest) -> DependencyGraph {
    manifest
        .definitions
        .iter()
        .map(|definition| (definition.name.as_str(), definition.dependencies.clone()))
        .collect()
}

fn schema() -> Result<(), CliError> {
    let schema = manifest_json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
