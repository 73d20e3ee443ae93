//! The creation state machine.
//!
//! A run moves through `Initialize -> Prepare -> Start -> Done` for a project
//! and `Initialize -> Prepare -> Done` for a module. Cancellation at any point
//! ends in `Aborted`; any other error in Initialize or Prepare ends in
//! `Failed`. The project success message is shown from the single termination
//! callback registered in [`Creator::new`], and only once the dev server has
//! been launched. The module message is shown directly after Prepare.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use console::style;
use damat_pkg::{PackageAdapter, PackageTool};
use damat_process::{ExecOptions, ProcessManager};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{initialize, prepare, start};
use crate::config::ScaffoldConfig;
use crate::error::{Result, ScaffoldError};
use crate::manifest::ManifestStore;
use crate::obs;
use crate::ui::{StatusUi, StepProgress};
use crate::vcs::Vcs;

const REPOSITORY_URL: &str = "https://github.com/damatjs/damat";

/// What a run creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Project,
    Module,
}

impl Variant {
    pub fn noun(self) -> &'static str {
        match self {
            Variant::Project => "project",
            Variant::Module => "module",
        }
    }

    /// Name suggested when prompting.
    pub fn default_name(self) -> &'static str {
        match self {
            Variant::Project => "damat-backend",
            Variant::Module => "damat-module",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// State of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initialize,
    Prepare,
    Start,
    Done,
    Aborted,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted | Phase::Failed)
    }

    /// Whether a `variant` run may move from `self` to `next`.
    pub fn can_transition_to(self, next: Phase, variant: Variant) -> bool {
        match (self, next) {
            (from, Phase::Aborted) => !from.is_terminal(),
            (Phase::Initialize, Phase::Prepare) => true,
            (Phase::Initialize | Phase::Prepare, Phase::Failed) => true,
            (Phase::Prepare, Phase::Start) => variant == Variant::Project,
            (Phase::Prepare, Phase::Done) => variant == Variant::Module,
            // the dev server could not be launched
            (Phase::Start, Phase::Failed) => variant == Variant::Project,
            (Phase::Start, Phase::Done) => variant == Variant::Project,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initialize => "initialize",
            Phase::Prepare => "prepare",
            Phase::Start => "start",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How [`Creator::create`] returned.
#[derive(Debug)]
pub enum CreationOutcome {
    /// The module is ready; the run can finish normally.
    Completed,
    /// The dev server is running; the run ends through the lifecycle manager.
    Running,
    /// The run was cancelled.
    Aborted,
    /// A phase failed.
    Failed(ScaffoldError),
}

impl CreationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CreationOutcome::Completed => "completed",
            CreationOutcome::Running => "running",
            CreationOutcome::Aborted => "aborted",
            CreationOutcome::Failed(_) => "failed",
        }
    }
}

/// User choices for one run.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub variant: Variant,
    pub name: String,
    /// Parent directory of the new scaffold.
    pub directory: PathBuf,
    /// Template override.
    pub repo_url: Option<String>,
    /// Version pinned for framework packages (projects only).
    pub version: Option<String>,
    pub verbose: bool,
}

impl CreateOptions {
    pub fn project_path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }
}

/// External collaborators of a run.
#[derive(Clone)]
pub struct Collaborators {
    pub packages: Arc<dyn PackageAdapter>,
    pub vcs: Arc<dyn Vcs>,
    pub manifests: Arc<dyn ManifestStore>,
    pub ui: Arc<dyn StatusUi>,
}

struct RunState {
    variant: Variant,
    phase: Mutex<Phase>,
    created: AtomicBool,
    printed: AtomicBool,
}

impl RunState {
    fn new(variant: Variant) -> Self {
        Self {
            variant,
            phase: Mutex::new(Phase::Initialize),
            created: AtomicBool::new(false),
            printed: AtomicBool::new(false),
        }
    }

    fn phase(&self) -> Phase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, next: Phase) -> bool {
        let mut phase = self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if phase.can_transition_to(next, self.variant) {
            debug!(from = %*phase, to = %next, "Phase transition");
            *phase = next;
            true
        } else {
            debug!(from = %*phase, to = %next, "Ignoring phase transition");
            false
        }
    }
}

/// Success message for a project, shown once the run terminates.
pub fn project_success_message(name: &str, dev_command: &str) -> String {
    format!(
        "Change to the `{name}` directory to explore your damat project.\n\n\
         Start your damat application again with the following command:\n\n\
         {dev_command}\n\n\
         Check out the damat GitHub ({REPOSITORY_URL}) and star us, if you like what we're building."
    )
}

/// Success message for a module, shown right after Prepare.
pub fn module_success_message(name: &str) -> String {
    format!(
        "Change to the `{name}` directory to explore your damat module.\n\n\
         Start building your damat module and check out the damat GitHub ({REPOSITORY_URL}) \
         and star us, if you like what we're building."
    )
}

/// Runs the phases of one project or module creation.
pub struct Creator {
    run_id: String,
    options: CreateOptions,
    config: ScaffoldConfig,
    process: ProcessManager,
    deps: Collaborators,
    progress: StepProgress,
    state: Arc<RunState>,
}

impl Creator {
    /// Build a creator and register its termination callback with `process`.
    pub async fn new(
        options: CreateOptions,
        config: ScaffoldConfig,
        process: ProcessManager,
        deps: Collaborators,
    ) -> Self {
        let progress = StepProgress::new(
            deps.ui.clone(),
            process.clone(),
            config.tip_interval,
            options.verbose,
        );
        let creator = Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            state: Arc::new(RunState::new(options.variant)),
            options,
            config,
            process,
            deps,
            progress,
        };
        creator.register_termination().await;
        creator
    }

    async fn register_termination(&self) {
        let state = self.state.clone();
        let ui = self.deps.ui.clone();
        let packages = self.deps.packages.clone();
        let name = self.options.name.clone();
        let dev_script = self.config.dev_script.clone();

        self.process
            .on_terminated(move || async move {
                ui.stop();
                if state.variant == Variant::Project
                    && state.created.load(Ordering::SeqCst)
                    && !state.printed.swap(true, Ordering::SeqCst)
                {
                    let command = packages.get_command_str(&dev_script).unwrap_or_else(|_| {
                        PackageTool::BASELINE
                            .run_script_command(&dev_script)
                            .to_string()
                    });
                    ui.announce(&style(project_success_message(&name, &command)).green().to_string());
                    state.transition(Phase::Done);
                }
                Ok(())
            })
            .await;
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Whether the dev server has been launched.
    pub fn is_created(&self) -> bool {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn project_path(&self) -> PathBuf {
        self.options.project_path()
    }

    fn template_url(&self) -> &str {
        match self.options.repo_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => match self.options.variant {
                Variant::Project => self.config.project_repo.as_str(),
                Variant::Module => self.config.module_repo.as_str(),
            },
        }
    }

    /// Run every phase of this variant.
    pub async fn create(&self) -> CreationOutcome {
        let started = Instant::now();
        obs::emit_run_started(&self.run_id, self.options.variant.noun(), &self.options.name);

        let outcome = match self.run_phases().await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                info!(phase = %self.phase(), "Creation cancelled");
                self.progress.halt();
                self.state.transition(Phase::Aborted);
                CreationOutcome::Aborted
            }
            Err(err) => {
                obs::emit_phase_failed(&self.phase(), &err);
                self.progress.halt();
                self.deps.ui.stop();
                self.state.transition(Phase::Failed);
                CreationOutcome::Failed(err)
            }
        };

        obs::emit_run_finished(
            &self.run_id,
            outcome.label(),
            started.elapsed().as_millis() as u64,
        );
        outcome
    }

    async fn run_phases(&self) -> Result<CreationOutcome> {
        let variant = self.options.variant;
        let noun = variant.noun();
        let path = self.project_path();
        let exec = ExecOptions::new(self.process.token()).verbose(self.options.verbose);

        self.deps
            .ui
            .announce(&format!("🚀 Starting {noun} setup, this may take a few minutes."));
        self.deps.ui.start("");
        self.progress.begin(&format!("Setting up {noun}..."));

        self.run_phase(Phase::Initialize, &exec, self.initialize(&path, &exec))
            .await?;
        self.progress.complete(&format!("Created {noun} directory"));

        self.enter(Phase::Prepare)?;
        self.run_phase(Phase::Prepare, &exec, self.prepare(&path, &exec))
            .await?;
        self.deps.ui.success(match variant {
            Variant::Project => "Project Prepared",
            Variant::Module => "Module Prepared",
        });

        match variant {
            Variant::Module => {
                self.enter(Phase::Done)?;
                self.deps.ui.stop();
                self.deps
                    .ui
                    .announce(&style(module_success_message(&self.options.name)).green().to_string());
                Ok(CreationOutcome::Completed)
            }
            Variant::Project => {
                self.enter(Phase::Start)?;
                self.deps.ui.announce("Starting damat...");
                let launch = async { self.start(&path, &exec) };
                self.run_phase(Phase::Start, &exec, launch).await?;
                Ok(CreationOutcome::Running)
            }
        }
    }

    fn enter(&self, next: Phase) -> Result<()> {
        if self.process.token().is_cancelled() {
            return Err(ScaffoldError::Cancelled);
        }
        if !self.state.transition(next) {
            warn!(from = %self.phase(), to = %next, "Invalid phase transition");
            return Err(ScaffoldError::FatalUser(format!(
                "cannot enter {next} from {}",
                self.phase()
            )));
        }
        Ok(())
    }

    async fn run_phase<F>(&self, phase: Phase, exec: &ExecOptions, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        obs::emit_phase_started(&phase);
        let started = Instant::now();
        work.await?;
        // work that finished while the run was being cancelled still aborts
        if exec.signal.is_cancelled() {
            return Err(ScaffoldError::Cancelled);
        }
        obs::emit_phase_finished(&phase, started.elapsed().as_millis() as u64);
        Ok(())
    }

    async fn initialize(&self, path: &std::path::Path, exec: &ExecOptions) -> Result<()> {
        initialize::initialize_from_template(self.deps.vcs.as_ref(), self.template_url(), path, exec)
            .await
    }

    async fn prepare(&self, path: &std::path::Path, exec: &ExecOptions) -> Result<()> {
        let variant = self.options.variant;
        let tool = self.deps.packages.detect(exec).await?;
        debug!(tool = %tool, "Package manager ready");

        let update = prepare::ManifestUpdate {
            name: self.options.name.clone(),
            package_manager: self.deps.packages.get_package_manager_string(),
            version: match variant {
                Variant::Project => self.options.version.clone(),
                Variant::Module => None,
            },
            namespace_prefix: self.config.namespace_prefix.clone(),
            version_exempt: self.config.version_exempt.clone(),
        };
        prepare::rewrite_manifest(self.deps.manifests.as_ref(), path, &update, exec).await?;

        if variant == Variant::Project {
            prepare::append_env_defaults(path, &self.config.env_block(), exec).await?;
        }

        self.progress.begin("Installing dependencies...");
        self.deps
            .packages
            .install_dependencies(&exec.clone().cwd(path))
            .await?;
        self.progress.complete("Installed Dependencies");
        Ok(())
    }

    fn start(&self, path: &std::path::Path, exec: &ExecOptions) -> Result<()> {
        let state = self.state.clone();
        start::launch_dev_server(
            self.deps.packages.as_ref(),
            &self.process,
            path,
            &self.config.dev_script,
            exec,
            move || state.created.store(true, Ordering::SeqCst),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_transitions() {
        let v = Variant::Project;
        assert!(Phase::Initialize.can_transition_to(Phase::Prepare, v));
        assert!(Phase::Prepare.can_transition_to(Phase::Start, v));
        assert!(Phase::Start.can_transition_to(Phase::Done, v));
        assert!(!Phase::Prepare.can_transition_to(Phase::Done, v));
        assert!(!Phase::Initialize.can_transition_to(Phase::Start, v));
    }

    #[test]
    fn test_module_has_no_start() {
        let v = Variant::Module;
        assert!(Phase::Prepare.can_transition_to(Phase::Done, v));
        assert!(!Phase::Prepare.can_transition_to(Phase::Start, v));
        assert!(!Phase::Start.can_transition_to(Phase::Done, v));
    }

    #[test]
    fn test_absorbing_states() {
        for v in [Variant::Project, Variant::Module] {
            for from in [Phase::Initialize, Phase::Prepare] {
                assert!(from.can_transition_to(Phase::Aborted, v));
                assert!(from.can_transition_to(Phase::Failed, v));
            }
            for terminal in [Phase::Done, Phase::Aborted, Phase::Failed] {
                for next in [
                    Phase::Initialize,
                    Phase::Prepare,
                    Phase::Start,
                    Phase::Done,
                    Phase::Aborted,
                    Phase::Failed,
                ] {
                    assert!(!terminal.can_transition_to(next, v), "{terminal} -> {next}");
                }
            }
        }
    }

    #[test]
    fn test_success_messages() {
        let project = project_success_message("my-shop", "bun run dev");
        assert!(project.contains("`my-shop`"));
        assert!(project.contains("bun run dev"));

        let module = module_success_message("damat-module");
        assert!(module.contains("`damat-module`"));
        assert!(!module.contains("run dev"));
    }

    #[test]
    fn test_variant_defaults() {
        assert_eq!(Variant::Project.default_name(), "damat-backend");
        assert_eq!(Variant::Module.default_name(), "damat-module");
        assert_eq!(Variant::Module.to_string(), "module");
    }

    #[test]
    fn test_project_path() {
        let options = CreateOptions {
            variant: Variant::Project,
            name: "my-shop".to_string(),
            directory: PathBuf::from("/work"),
            repo_url: None,
            version: None,
            verbose: false,
        };
        assert_eq!(options.project_path(), PathBuf::from("/work/my-shop"));
    }
}
