//! damat-scaffold: project and module creation for create-damat-app
//!
//! - [`creator`]: the creation state machine (Initialize, Prepare, Start)
//! - [`actions`]: template acquisition, manifest rewrite, dev server launch
//! - [`vcs`], [`manifest`]: seams over git and `package.json`
//! - [`ui`], [`prompt`]: terminal status line and interactive prompts
//! - [`config`], [`telemetry`], [`obs`]: run configuration and tracing

pub mod actions;
pub mod config;
pub mod creator;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod obs;
pub mod prompt;
pub mod telemetry;
pub mod ui;
pub mod vcs;

pub use config::ScaffoldConfig;
pub use creator::{
    module_success_message, project_success_message, Collaborators, CreateOptions,
    CreationOutcome, Creator, Phase, Variant,
};
pub use error::{Result, ScaffoldError};
pub use manifest::{FsManifestStore, Manifest, ManifestStore};
pub use naming::{normalize_prompted_name, slugify_name, validate_project_name};
pub use prompt::{ask_project_name, DialoguerPrompter, Prompter, Validator};
pub use ui::{SpinnerUi, StatusUi, StepProgress};
pub use vcs::{GitCli, Vcs};
