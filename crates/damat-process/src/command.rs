//! Command lines and execution options.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio_util::sync::CancellationToken;

use crate::error::ProcessError;

/// An external command: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable name or path.
    pub program: String,

    /// Arguments passed verbatim to the program.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Parse a command string. Double and single quotes group words; there is no
/// escaping, variable expansion or piping.
impl FromStr for CommandLine {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = Vec::new();
        let mut current = String::new();
        let mut quote: Option<char> = None;
        let mut in_word = false;

        for c in s.chars() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => current.push(c),
                None if c == '"' || c == '\'' => {
                    quote = Some(c);
                    in_word = true;
                }
                None if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                None => {
                    current.push(c);
                    in_word = true;
                }
            }
        }
        if in_word {
            words.push(current);
        }

        let mut words = words.into_iter();
        let program = words.next().ok_or(ProcessError::EmptyCommand)?;
        Ok(CommandLine {
            program,
            args: words.collect(),
        })
    }
}

/// Options for a single command execution.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Working directory; inherits the current one when `None`.
    pub cwd: Option<PathBuf>,

    /// Shared cancellation signal for the run.
    pub signal: CancellationToken,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,

    /// Stream child output live in addition to capturing it.
    pub verbose: bool,
}

impl ExecOptions {
    /// Options bound to the given cancellation token.
    pub fn new(signal: CancellationToken) -> Self {
        Self {
            cwd: None,
            signal,
            env: Vec::new(),
            verbose: false,
        }
    }

    /// Run in the given directory.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_display() {
        let cmd = CommandLine::new("git")
            .arg("commit")
            .args(["-m", "chore: bootstrap project structure"]);
        assert_eq!(cmd.program, "git");
        assert_eq!(cmd.args.len(), 3);
        assert_eq!(
            cmd.to_string(),
            "git commit -m \"chore: bootstrap project structure\""
        );
    }

    #[test]
    fn test_parse_respects_quotes() {
        let cmd: CommandLine = "git commit -m \"initial commit\"".parse().unwrap();
        assert_eq!(cmd.program, "git");
        assert_eq!(cmd.args, vec!["commit", "-m", "initial commit"]);

        let cmd: CommandLine = "echo 'a  b' ''".parse().unwrap();
        assert_eq!(cmd.args, vec!["a  b", ""]);
    }

    #[test]
    fn test_parse_collapses_whitespace() {
        let cmd: CommandLine = "  bun   install  ".parse().unwrap();
        assert_eq!(cmd, CommandLine::new("bun").arg("install"));
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert!(matches!(
            "   ".parse::<CommandLine>(),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[test]
    fn test_exec_options_builder() {
        let token = CancellationToken::new();
        let opts = ExecOptions::new(token)
            .cwd("/tmp")
            .env("CI", "1")
            .verbose(true);
        assert_eq!(opts.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(opts.env, vec![("CI".to_string(), "1".to_string())]);
        assert!(opts.verbose);
    }
}
