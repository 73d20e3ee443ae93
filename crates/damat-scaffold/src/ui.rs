//! Terminal status line and rotating progress tips.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use console::style;
use damat_process::{ProcessManager, Ticker};
use indicatif::{ProgressBar, ProgressStyle};

/// Observational status output. Nothing the core does depends on it.
pub trait StatusUi: Send + Sync {
    /// Show the status line with `title`.
    fn start(&self, title: &str);

    /// Replace the status line text.
    fn tick(&self, message: &str);

    /// Report a finished step above the status line.
    fn success(&self, message: &str);

    /// Remove the status line. Idempotent.
    fn stop(&self);

    /// Print a standalone message.
    fn announce(&self, message: &str);
}

/// [`StatusUi`] drawn with an indicatif spinner.
pub struct SpinnerUi {
    bar: ProgressBar,
}

impl Default for SpinnerUi {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinnerUi {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
        bar.set_style(spinner_style);
        Self { bar }
    }
}

impl StatusUi for SpinnerUi {
    fn start(&self, title: &str) {
        self.bar.set_message(title.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn tick(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn success(&self, message: &str) {
        let line = format!("{} {}", style("✔").green().bold(), style(message).green());
        self.bar.suspend(|| println!("{line}"));
        self.bar.set_message(String::new());
    }

    fn stop(&self) {
        self.bar.finish_and_clear();
    }

    fn announce(&self, message: &str) {
        self.bar.suspend(|| println!("{message}"));
    }
}

const TIPS: &[&str] = &[
    "Modules are self-contained: each one owns its models, services and routes.",
    "Run the framework CLI through your package manager, e.g. `bun run damat --help`.",
    "Workflows keep orchestration separate from domain logic, so steps stay testable.",
    "Subscribers react to events without coupling the emitting module to them.",
    "Settings in `.env` are read at startup; restart the dev server after editing them.",
    "Storage, cache and queue providers are swappable without touching business code.",
    "Pin framework packages with `--version` to scaffold against a specific release.",
    "Custom services can be injected into core workflows without forking the engine.",
];

/// Tip shown for the `index`-th refresh.
pub fn tip(index: usize) -> &'static str {
    TIPS[index % TIPS.len()]
}

fn render(title: &str, index: usize, verbose: bool) -> String {
    if verbose {
        return title.to_string();
    }
    format!(
        "{title}\n\n  {} {}\n  {}",
        style("💡").cyan(),
        style("damat Tips").cyan().bold(),
        style(tip(index)).dim()
    )
}

/// Drives the status line for one step at a time.
///
/// Each step refreshes its line through a [`Ticker`] registered with the
/// lifecycle manager, so termination clears it with every other handle.
pub struct StepProgress {
    ui: Arc<dyn StatusUi>,
    process: ProcessManager,
    interval: Duration,
    verbose: bool,
    current: Mutex<Option<Ticker>>,
}

impl StepProgress {
    pub fn new(
        ui: Arc<dyn StatusUi>,
        process: ProcessManager,
        interval: Duration,
        verbose: bool,
    ) -> Self {
        Self {
            ui,
            process,
            interval,
            verbose,
            current: Mutex::new(None),
        }
    }

    /// Start a step titled `title`, replacing any step still running.
    pub fn begin(&self, title: &str) {
        self.halt();
        self.ui.tick(&render(title, 0, self.verbose));

        let ui = self.ui.clone();
        let title = title.to_string();
        let verbose = self.verbose;
        let mut shown = 0usize;
        let ticker = self.process.start_ticker(self.interval, move || {
            shown += 1;
            ui.tick(&render(&title, shown, verbose));
        });
        *self.lock() = Some(ticker);
    }

    /// Finish the current step and report `message`.
    pub fn complete(&self, message: &str) {
        self.halt();
        self.ui.success(message);
    }

    /// Stop refreshing without reporting anything.
    pub fn halt(&self) {
        if let Some(ticker) = self.lock().take() {
            if !self.process.clear(ticker.id()) {
                ticker.stop();
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Ticker>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
