use super::PackageManager;
use crate::config::Config;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Binary launched by [`PackageEntry`].
const ENTRY_RUNNER: &str = "electron";

/// A fully resolved command line for the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use shell_escape::escape;
        write!(f, "{}", escape(Cow::Borrowed(self.program.as_str())))?;
        for arg in &self.args {
            write!(f, " {}", escape(Cow::Borrowed(arg.as_str())))?;
        }
        Ok(())
    }
}

/// Produces the command line for each restart attempt.
///
/// Resolution happens inside the restart critical section and before anything
/// is terminated, so a failure here leaves the running process untouched.
pub trait CommandSource: Send + Sync {
    fn resolve(&self, root: &Path) -> Result<LaunchCommand>;
}

/// An explicit program and arguments.
#[derive(Debug, Clone)]
pub struct FixedCommand {
    program: String,
    args: Vec<String>,
}

impl FixedCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl CommandSource for FixedCommand {
    fn resolve(&self, root: &Path) -> Result<LaunchCommand> {
        Ok(LaunchCommand::new(&self.program, self.args.clone(), root))
    }
}

/// `<package manager> run <script>`.
#[derive(Debug, Clone)]
pub struct PackageScript {
    script: String,
    manager: Option<PackageManager>,
}

impl PackageScript {
    /// Detect the package manager from the environment on every attempt.
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            manager: None,
        }
    }

    pub fn with_manager(script: impl Into<String>, manager: PackageManager) -> Self {
        Self {
            script: script.into(),
            manager: Some(manager),
        }
    }
}

impl CommandSource for PackageScript {
    fn resolve(&self, root: &Path) -> Result<LaunchCommand> {
        let manager = match self.manager {
            Some(m) => m,
            None => PackageManager::detect()?,
        };
        Ok(LaunchCommand::new(
            manager.program(),
            manager.run_script_args(&self.script),
            root,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
}

/// Runs `electron <main>` through the package manager, where `main` comes
/// from the root `package.json`.
#[derive(Debug, Clone, Default)]
pub struct PackageEntry {
    manager: Option<PackageManager>,
}

impl PackageEntry {
    pub fn new() -> Self {
        Self { manager: None }
    }

    pub fn with_manager(manager: PackageManager) -> Self {
        Self {
            manager: Some(manager),
        }
    }

    fn read_main(root: &Path) -> Result<String> {
        let manifest_path = root.join("package.json");
        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            Error::Config(format!(
                "Failed to read {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        let manifest: PackageJson = serde_json::from_str(&content)?;
        manifest
            .main
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::Config("No main field in package.json".to_string()))
    }
}

impl CommandSource for PackageEntry {
    fn resolve(&self, root: &Path) -> Result<LaunchCommand> {
        let manager = match self.manager {
            Some(m) => m,
            None => PackageManager::detect()?,
        };
        let main = Self::read_main(root)?;
        Ok(LaunchCommand::new(
            manager.program(),
            manager.exec_args(ENTRY_RUNNER, &[main]),
            root,
        ))
    }
}

/// Pick the command source described by `config`.
///
/// Precedence: `command`, then `script`, then the `package.json` entry.
pub fn command_source_from_config(config: &Config) -> Box<dyn CommandSource> {
    if let Some(ref program) = config.command {
        Box::new(FixedCommand::new(program.clone(), config.args.clone()))
    } else if let Some(ref script) = config.script {
        Box::new(PackageScript::new(script.clone()))
    } else {
        Box::new(PackageEntry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_fixed_command_runs_in_root() {
        let cmd = FixedCommand::new("sleep", vec!["30".to_string()])
            .resolve(Path::new("/work/app"))
            .unwrap();
        assert_eq!(cmd.program, "sleep");
        assert_eq!(cmd.args, vec!["30"]);
        assert_eq!(cmd.cwd, PathBuf::from("/work/app"));
    }

    #[test]
    fn test_package_script_with_manager() {
        let cmd = PackageScript::with_manager("dev-electron", PackageManager::Pnpm)
            .resolve(Path::new("/work/app"))
            .unwrap();
        assert_eq!(cmd.to_string(), "pnpm run dev-electron");
    }

    #[test]
    fn test_package_entry_reads_main() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"name":"app","main":"out/main/index.cjs"}"#,
        )
        .unwrap();

        let cmd = PackageEntry::with_manager(PackageManager::Npm)
            .resolve(temp.path())
            .unwrap();
        assert_eq!(cmd.program, "npm");
        assert_eq!(cmd.args, vec!["exec", "--", "electron", "out/main/index.cjs"]);
    }

    #[test]
    fn test_package_entry_without_main_is_config_error() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("package.json"), r#"{"name":"app"}"#).unwrap();

        let err = PackageEntry::with_manager(PackageManager::Yarn)
            .resolve(temp.path())
            .unwrap_err();
        assert!(err.to_string().contains("No main field"));
    }

    #[test]
    fn test_display_escapes_arguments() {
        let cmd = LaunchCommand::new("echo", vec!["hello world".to_string()], "/");
        assert_eq!(cmd.to_string(), "echo 'hello world'");
    }

    #[test]
    fn test_config_precedence() {
        let config = Config {
            command: Some("node".to_string()),
            args: vec!["server.js".to_string()],
            script: Some("dev".to_string()),
            ..Config::default()
        };
        let cmd = command_source_from_config(&config)
            .resolve(Path::new("/app"))
            .unwrap();
        assert_eq!(cmd.program, "node");
    }
}
