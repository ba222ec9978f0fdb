use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable set by npm, pnpm and yarn for the scripts they run.
pub const EXEC_PATH_VAR: &str = "npm_execpath";

/// Package manager that invoked the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    /// Detect the invoking package manager from `npm_execpath`.
    pub fn detect() -> Result<Self> {
        Self::from_exec_path(std::env::var(EXEC_PATH_VAR).ok().as_deref())
    }

    /// Classify an `npm_execpath` value.
    ///
    /// Path separators differ per platform, so only the file name is matched
    /// for pnpm and npm.
    pub fn from_exec_path(exec_path: Option<&str>) -> Result<Self> {
        let Some(path) = exec_path.filter(|p| !p.trim().is_empty()) else {
            return Err(Error::PackageManagerUndetected(None));
        };

        if path.contains("yarn") {
            return Ok(PackageManager::Yarn);
        }

        let file_name = path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path);
        match file_name {
            "pnpm.cjs" | "pnpm.js" => Ok(PackageManager::Pnpm),
            "npm-cli.js" => Ok(PackageManager::Npm),
            _ => Err(Error::PackageManagerUndetected(Some(path.to_string()))),
        }
    }

    /// Lockfile that marks the project root for this manager.
    pub fn lockfile(&self) -> &'static str {
        match self {
            PackageManager::Npm => "package-lock.json",
            PackageManager::Pnpm => "pnpm-lock.yaml",
            PackageManager::Yarn => "yarn.lock",
        }
    }

    /// Executable name on PATH.
    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }

    /// Arguments that run a package script.
    pub fn run_script_args(&self, script: &str) -> Vec<String> {
        vec!["run".to_string(), script.to_string()]
    }

    /// Arguments that run a locally installed binary with `args`.
    pub fn exec_args(&self, bin: &str, args: &[String]) -> Vec<String> {
        let mut out = match self {
            PackageManager::Npm => vec!["exec".to_string(), "--".to_string()],
            PackageManager::Pnpm => vec!["exec".to_string()],
            PackageManager::Yarn => vec!["run".to_string()],
        };
        out.push(bin.to_string());
        out.extend(args.iter().cloned());
        out
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}
