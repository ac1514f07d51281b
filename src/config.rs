//! Launcher configuration - loaded from YAML, defaults match the stock
//! podman sandbox layout

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "buildpane";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub build: BuildToolConfig,
    pub diagnostics: DiagnosticsConfig,
    /// Override for the cached target list location
    pub cache_file: Option<PathBuf>,
    /// Override for the persisted session state location
    pub state_file: Option<PathBuf>,
}

/// How commands reach the sandboxed environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Exec wrapper; the shell script is appended as its final argument
    pub exec: String,
    /// Checkout location as seen inside the sandbox
    pub mapped_path: String,
    /// Same checkout on the host
    pub host_path: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            exec: "podman exec -w /workspace bld_vscode /bin/bash -c".to_string(),
            mapped_path: "/workspace/".to_string(),
            host_path: dirs::home_dir()
                .map(|home| format!("{}/devel/connectedhomeip/", home.display()))
                .unwrap_or_else(|| "/workspace/".to_string()),
        }
    }
}

/// The build tool inside the sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildToolConfig {
    /// Environment activation run before every invocation
    pub activate: String,
    pub tool: String,
    pub enable_flashbundle: bool,
    pub discovery_args: Vec<String>,
    /// Directory relative diagnostic paths resolve against, relative to the host path
    pub result_base_dir: String,
}

impl Default for BuildToolConfig {
    fn default() -> Self {
        Self {
            activate: "source ./scripts/activate.sh".to_string(),
            tool: "./scripts/build/build_examples.py".to_string(),
            enable_flashbundle: true,
            discovery_args: ["--log-level", "fatal", "targets", "--expand"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            result_base_dir: "out/fake".to_string(),
        }
    }
}

/// Diagnostic line matching
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Match `Error:`/`WARNING:` as well as the lowercase tokens
    pub ignore_severity_case: bool,
}

impl Config {
    /// Load config from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| BuildError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the per-user config file, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, BuildError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                log::info!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `<config_dir>/buildpane/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yml"))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| app_cache_dir().join("targets.list"))
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| app_cache_dir().join("state.json"))
    }

    /// Host directory that relative diagnostic paths are resolved against
    pub fn result_base_dir(&self) -> PathBuf {
        Path::new(&self.sandbox.host_path).join(&self.build.result_base_dir)
    }

    fn validate(&self) -> Result<(), BuildError> {
        let exec = shlex::split(&self.sandbox.exec).ok_or_else(|| {
            BuildError::Config(format!(
                "sandbox.exec has unbalanced quotes: {}",
                self.sandbox.exec
            ))
        })?;
        if exec.is_empty() {
            return Err(BuildError::Config("sandbox.exec must not be empty".to_string()));
        }
        if self.build.tool.trim().is_empty() {
            return Err(BuildError::Config("build.tool must not be empty".to_string()));
        }
        Ok(())
    }
}

fn app_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}
