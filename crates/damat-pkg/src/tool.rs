//! Supported package-management tools and user-agent detection.

use std::fmt;
use std::sync::OnceLock;

use damat_process::CommandLine;
use regex::Regex;

/// A package-management tool the scaffolder can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageTool {
    Npm,
    Pnpm,
    Bun,
}

impl PackageTool {
    /// Tool assumed when nothing else identifies one.
    pub const BASELINE: PackageTool = PackageTool::Npm;

    pub const ALL: [PackageTool; 3] = [PackageTool::Npm, PackageTool::Pnpm, PackageTool::Bun];

    /// Canonical executable name.
    pub fn name(self) -> &'static str {
        match self {
            PackageTool::Npm => "npm",
            PackageTool::Pnpm => "pnpm",
            PackageTool::Bun => "bun",
        }
    }

    /// Resolve a canonical name or a known alias (`pnpx`, `bunx`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "npm" => Some(PackageTool::Npm),
            "pnpm" | "pnpx" => Some(PackageTool::Pnpm),
            "bun" | "bunx" => Some(PackageTool::Bun),
            _ => None,
        }
    }

    /// Lock files this tool writes into a project directory.
    pub fn lock_files(self) -> &'static [&'static str] {
        match self {
            PackageTool::Npm => &["package-lock.json"],
            PackageTool::Pnpm => &["pnpm-lock.yaml"],
            PackageTool::Bun => &["bun.lock", "bun.lockb", ".bun"],
        }
    }

    /// Lowest supported major version, if the tool has one.
    pub fn minimum_major_version(self) -> Option<u64> {
        match self {
            PackageTool::Bun => Some(1),
            _ => None,
        }
    }

    pub fn version_command(self) -> CommandLine {
        CommandLine::new(self.name()).arg("-v")
    }

    pub fn install_command(self) -> CommandLine {
        CommandLine::new(self.name()).arg("install")
    }

    /// Command that runs a `package.json` script.
    pub fn run_script_command(self, script: &str) -> CommandLine {
        match self {
            PackageTool::Npm => CommandLine::new("npm").args(["run", script]),
            PackageTool::Pnpm => CommandLine::new("pnpm").arg(script),
            PackageTool::Bun => CommandLine::new("bun").args(["run", script]),
        }
    }

    /// Command that invokes the framework CLI installed in the project.
    pub fn framework_command(self, args: &[&str]) -> CommandLine {
        let base = self.run_script_command("damat");
        match self {
            // npm needs `--` to forward flags to the script
            PackageTool::Npm if !args.is_empty() => base.arg("--").args(args.iter().copied()),
            _ => base.args(args.iter().copied()),
        }
    }
}

impl fmt::Display for PackageTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of parsing a package-manager user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentMatch {
    pub tool: PackageTool,
    pub version: Option<String>,
}

impl UserAgentMatch {
    fn baseline() -> Self {
        Self {
            tool: PackageTool::BASELINE,
            version: None,
        }
    }
}

fn user_agent_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\s*(?P<name>[A-Za-z][A-Za-z0-9_-]*)/(?P<version>\d+(?:\.\d+)*[0-9A-Za-z.+-]*)")
                .ok()
        })
        .as_ref()
}

/// Parse a user agent of the form `<tool>/<version> ...`.
///
/// Aliases are normalized to the canonical tool. An absent or unrecognized
/// agent yields the baseline tool with no version.
pub fn detect_from_user_agent(user_agent: Option<&str>) -> UserAgentMatch {
    let Some(agent) = user_agent else {
        return UserAgentMatch::baseline();
    };
    let Some(caps) = user_agent_pattern().and_then(|re| re.captures(agent)) else {
        return UserAgentMatch::baseline();
    };
    match PackageTool::from_name(&caps["name"]) {
        Some(tool) => UserAgentMatch {
            tool,
            version: Some(caps["version"].to_string()),
        },
        None => UserAgentMatch::baseline(),
    }
}

/// Leading numeric component of a version string (`"1.2.3"` -> `1`).
pub fn major_version(version: &str) -> Option<u64> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_pnpm() {
        let found = detect_from_user_agent(Some("pnpm/8.0.0 npm/? node/v20.11.0 linux x64"));
        assert_eq!(found.tool, PackageTool::Pnpm);
        assert_eq!(found.version.as_deref(), Some("8.0.0"));
    }

    #[test]
    fn test_detect_alias_is_normalized() {
        let found = detect_from_user_agent(Some("pnpx/8.0.0"));
        assert_eq!(found.tool, PackageTool::Pnpm);
        assert_eq!(found.version.as_deref(), Some("8.0.0"));

        let found = detect_from_user_agent(Some("bunx/1.1.3"));
        assert_eq!(found.tool, PackageTool::Bun);
    }

    #[test]
    fn test_detect_bun() {
        let found = detect_from_user_agent(Some("bun/1.22.0 npm/? node/v22.6.0 darwin arm64"));
        assert_eq!(found.tool, PackageTool::Bun);
        assert_eq!(found.version.as_deref(), Some("1.22.0"));
    }

    #[test]
    fn test_unknown_or_absent_defaults_to_baseline() {
        for agent in [Some("yarn/1.22.19 npm/? node/v18"), Some("garbage"), Some(""), None] {
            let found = detect_from_user_agent(agent);
            assert_eq!(found.tool, PackageTool::BASELINE, "agent {:?}", agent);
            assert_eq!(found.version, None);
        }
    }

    #[test]
    fn test_script_formats() {
        assert_eq!(PackageTool::Npm.run_script_command("test").to_string(), "npm run test");
        assert_eq!(PackageTool::Pnpm.run_script_command("build").to_string(), "pnpm build");
        assert_eq!(PackageTool::Bun.run_script_command("dev").to_string(), "bun run dev");
    }

    #[test]
    fn test_framework_command() {
        assert_eq!(
            PackageTool::Bun.framework_command(&["db:migrate"]).to_string(),
            "bun run damat db:migrate"
        );
        assert_eq!(
            PackageTool::Npm.framework_command(&["build", "--watch"]).to_string(),
            "npm run damat -- build --watch"
        );
        assert_eq!(PackageTool::Pnpm.framework_command(&[]).to_string(), "pnpm damat");
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("1.1.38"), Some(1));
        assert_eq!(major_version("v0.8.1\n"), Some(0));
        assert_eq!(major_version("canary"), None);
    }

    #[test]
    fn test_lock_files_are_disjoint() {
        for tool in PackageTool::ALL {
            for other in PackageTool::ALL.into_iter().filter(|o| *o != tool) {
                assert!(tool
                    .lock_files()
                    .iter()
                    .all(|f| !other.lock_files().contains(f)));
            }
        }
    }
}
