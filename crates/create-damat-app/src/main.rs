//! create-damat-app - scaffold a damat project or module
//!
//! Clones a starter template, gives it a fresh git history, pins the package
//! manager and framework versions, installs dependencies and, for projects,
//! starts the dev server until interrupted.
//!
//! Exit codes: `0` on success, `130` when interrupted, `1` on failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use damat_pkg::{PackageError, PackageManager, PackageManagerOptions};
use damat_process::{ProcessManager, TerminationReason};
use damat_scaffold::obs::scaffold_span;
use damat_scaffold::telemetry::init_tracing;
use damat_scaffold::{
    ask_project_name, validate_project_name, Collaborators, CreateOptions, CreationOutcome,
    Creator, DialoguerPrompter, FsManifestStore, GitCli, ScaffoldConfig, ScaffoldError,
    SpinnerUi, Variant,
};
use tracing::{error, warn, Instrument, Level};

#[derive(Parser, Debug)]
#[command(name = "create-damat-app")]
#[command(author = "damat team")]
#[command(about = "Create a new damat project or module", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Name of the project or module directory
    project_name: Option<String>,

    /// Create a module instead of a project
    #[arg(long)]
    module: bool,

    /// URL of the repository to set up the project from
    #[arg(long, value_name = "URL")]
    repo_url: Option<String>,

    /// Version of the damat packages to install
    #[arg(long, value_name = "VERSION", default_value = "latest")]
    version: String,

    /// Directory to create the project in (default: current directory)
    #[arg(long, value_name = "PATH")]
    directory_path: Option<PathBuf>,

    /// Show all logs and command output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Use npm as the package manager
    #[arg(long)]
    use_npm: bool,

    /// Use pnpm as the package manager
    #[arg(long)]
    use_pnpm: bool,

    /// Use bun as the package manager
    #[arg(long)]
    use_bun: bool,
}

impl Cli {
    fn variant(&self) -> Variant {
        if self.module {
            Variant::Module
        } else {
            Variant::Project
        }
    }

    fn package_options(&self) -> PackageManagerOptions {
        PackageManagerOptions {
            verbose: self.verbose,
            use_npm: self.use_npm,
            use_pnpm: self.use_pnpm,
            use_bun: self.use_bun,
            user_agent: std::env::var("npm_config_user_agent").ok(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_tracing(cli.json, level);

    let code = run(cli).await?;
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = ScaffoldConfig::from_env();
    let process = ProcessManager::with_transient_markers(config.transient_markers.clone());
    let _interrupts = process.install_interrupt_handler();

    let variant = cli.variant();
    let directory = match &cli.directory_path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };

    let name = match resolve_name(cli.project_name.as_deref(), &directory, variant, &process).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            println!("{}", style("Operation cancelled").yellow());
            return Ok(process.finish(TerminationReason::Completed).await);
        }
        Err(err) if err.is_cancelled() => return Ok(process.wait_for_exit().await),
        Err(err) => {
            report_failure(&err);
            return Ok(process.finish(TerminationReason::Fatal).await);
        }
    };

    let packages = PackageManager::new(process.clone(), cli.package_options());
    let deps = Collaborators {
        packages: Arc::new(packages),
        vcs: Arc::new(GitCli::new(
            config.initial_branch.clone(),
            config.initial_commit_message.clone(),
        )),
        manifests: Arc::new(FsManifestStore),
        ui: Arc::new(SpinnerUi::new()),
    };
    let options = CreateOptions {
        variant,
        name,
        directory,
        repo_url: cli.repo_url,
        version: Some(cli.version),
        verbose: cli.verbose,
    };

    let creator = Creator::new(options, config, process.clone(), deps).await;
    let span = scaffold_span(creator.run_id(), variant.noun());

    let code = match creator.create().instrument(span).await {
        CreationOutcome::Completed => process.finish(TerminationReason::Completed).await,
        CreationOutcome::Running | CreationOutcome::Aborted => process.wait_for_exit().await,
        CreationOutcome::Failed(err) => {
            report_failure(&err);
            process.finish(TerminationReason::Fatal).await
        }
    };
    Ok(code)
}

/// Use the positional name when it is valid, otherwise prompt for one.
async fn resolve_name(
    given: Option<&str>,
    directory: &Path,
    variant: Variant,
    process: &ProcessManager,
) -> damat_scaffold::Result<Option<String>> {
    if let Some(name) = given.filter(|n| !n.trim().is_empty()) {
        match validate_project_name(name, directory, variant) {
            Ok(()) => return Ok(Some(name.to_string())),
            Err(err) => warn!("{err}"),
        }
    }
    ask_project_name(
        Arc::new(DialoguerPrompter),
        directory.to_path_buf(),
        variant,
        process.token(),
    )
    .await
}

fn report_failure(err: &ScaffoldError) {
    error!(error = %err, "Creation failed");
    let mut message = format!("An error occurred: {err}");
    let process_err = match err {
        ScaffoldError::Process(e) | ScaffoldError::Package(PackageError::Process(e)) => Some(e),
        _ => None,
    };
    if let Some(stderr) = process_err
        .and_then(|e| e.stderr())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        message.push('\n');
        message.push_str(stderr);
    }
    eprintln!("{}", style(message).red().bold());
}
