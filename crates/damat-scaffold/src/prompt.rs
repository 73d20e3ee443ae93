//! Interactive prompts.

use std::path::PathBuf;
use std::sync::Arc;

use damat_process::CancellationToken;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use tracing::debug;

use crate::creator::Variant;
use crate::error::{Result, ScaffoldError};
use crate::naming::{normalize_prompted_name, slugify_name};

/// Validation callback for text prompts; `Err` carries the message shown to
/// the user.
pub type Validator = Arc<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

/// Blocking prompt provider. `Ok(None)` means the user cancelled.
pub trait Prompter: Send + Sync {
    fn ask_text(&self, prompt: &str, default: &str, validator: Validator) -> Result<Option<String>>;

    /// Masked input for starters that need a secret, such as a private
    /// registry token. The name flow never asks for one.
    fn ask_password(&self, prompt: &str) -> Result<Option<String>>;
}

/// [`Prompter`] backed by dialoguer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPrompter;

fn cancelled_or_io(err: dialoguer::Error) -> Result<Option<String>> {
    let dialoguer::Error::IO(err) = err;
    if err.kind() == std::io::ErrorKind::Interrupted {
        Ok(None)
    } else {
        Err(ScaffoldError::Io(err))
    }
}

impl Prompter for DialoguerPrompter {
    fn ask_text(&self, prompt: &str, default: &str, validator: Validator) -> Result<Option<String>> {
        let answer = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default.to_string())
            .validate_with(move |input: &String| -> std::result::Result<(), String> {
                validator(input)
            })
            .interact_text();
        match answer {
            Ok(value) => Ok(Some(value)),
            Err(err) => cancelled_or_io(err),
        }
    }

    fn ask_password(&self, prompt: &str) -> Result<Option<String>> {
        match Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .interact()
        {
            Ok(value) => Ok(Some(value)),
            Err(err) => cancelled_or_io(err),
        }
    }
}

/// Ask for a project or module name under `parent`.
///
/// The prompt runs on a blocking thread and races the run's cancellation
/// token. Returns the slugified name, or `None` if the user cancelled.
pub async fn ask_project_name(
    prompter: Arc<dyn Prompter>,
    parent: PathBuf,
    variant: Variant,
    token: CancellationToken,
) -> Result<Option<String>> {
    if token.is_cancelled() {
        return Err(ScaffoldError::Cancelled);
    }

    let validator_parent = parent.clone();
    let validator: Validator = Arc::new(move |input: &str| {
        normalize_prompted_name(input, &validator_parent, variant)
            .map(|_| ())
            .map_err(|err| match err {
                ScaffoldError::InvalidName(message) => message,
                other => other.to_string(),
            })
    });
    let prompt = format!("What's the name of your {}?", variant.noun());
    let default = variant.default_name();

    let asked = tokio::task::spawn_blocking(move || prompter.ask_text(&prompt, default, validator));

    let answer = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(ScaffoldError::Cancelled),
        joined = asked => joined.map_err(|err| ScaffoldError::FatalUser(format!("prompt failed: {err}")))??,
    };

    match answer {
        Some(raw) => {
            let name = slugify_name(&raw);
            debug!(name = %name, "Name chosen");
            normalize_prompted_name(&name, &parent, variant).map(Some)
        }
        None => Ok(None),
    }
}
