use super::Config;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAMES: [&str; 2] = ["relaunch.yaml", "relaunch.yml"];

#[derive(Debug, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find a config file starting from `dir` and ascending to the filesystem root.
    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        if let Some(parent) = dir.parent() {
            return Self::find_config_in_dir(parent);
        }

        Err(Error::Config(
            "Could not find relaunch.yaml in current directory or any parent".to_string(),
        ))
    }

    /// Load config from file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Load the config found from `dir`, or the defaults when there is none.
    ///
    /// A config file that exists but fails to parse is still an error.
    pub fn load_or_default(&self, dir: &Path) -> Result<Config> {
        match Self::find_config_in_dir(dir) {
            Ok(path) => {
                tracing::debug!("Loading config from {}", path.display());
                self.load_config(path)
            }
            Err(_) => {
                tracing::debug!("No relaunch.yaml found from {}, using defaults", dir.display());
                Ok(Config::default())
            }
        }
    }

    /// Parse config from YAML string
    pub fn parse_config(&self, content: &str) -> Result<Config> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| Error::Parse(format!("Failed to parse YAML config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::Phase;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
primary_target: node
script: start:electron
restart_on: pre-build
state_dir: .cache
liveness_timeout: 1s
termination_timeout: 10s
watch: out/main
"#;
        let config = Parser::new().parse_config(yaml).unwrap();
        assert_eq!(config.primary_target, "node");
        assert_eq!(config.script.as_deref(), Some("start:electron"));
        assert_eq!(config.restart_on, Phase::PreBuild);
        assert_eq!(
            config.get_termination_timeout(),
            std::time::Duration::from_secs(10)
        );
        assert_eq!(config.watch, Some(PathBuf::from("out/main")));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = Parser::new().parse_config("  \n").unwrap();
        assert_eq!(config.primary_target, "electron-main");
        assert_eq!(config.restart_on, Phase::PostBuild);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Parser::new().parse_config("primary_targt: x\n").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_find_config_ascends() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("packages").join("main");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("relaunch.yml"), "script: dev\n").unwrap();

        let found = Parser::find_config_in_dir(&nested).unwrap();
        assert_eq!(found, temp.path().join("relaunch.yml"));

        let config = Parser::new().load_or_default(&nested).unwrap();
        assert_eq!(config.script.as_deref(), Some("dev"));
    }
}
