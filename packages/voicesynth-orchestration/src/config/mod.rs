//! Pipeline configuration
//!
//! Two layers:
//! - Defaults (match the stage tools' own defaults)
//! - Versioned YAML file (`version: 1`), every section optional
//!
//! Command-line flags are applied on top by the binary.
//!
//! ```yaml
//! version: 1
//! runtime:
//!   python: /opt/venv/bin/python3
//! clean:
//!   years: 3
//! curate:
//!   per_topic: 100
//!   dedupe_threshold: 0.85
//! paths:
//!   export_dir: ~/Desktop
//! ```

pub mod error;
pub mod io;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use io::ConfigFileV1;
pub use validation::Validatable;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Interpreter and tool locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Interpreter for the pipeline script; defaults to the cache venv's python
    pub python: Option<PathBuf>,
    pub pipeline_script: PathBuf,
    pub stage_tool: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python: None,
            pipeline_script: PathBuf::from("pipeline.py"),
            stage_tool: PathBuf::from(format!("voicesynth-stage{}", std::env::consts::EXE_SUFFIX)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanConfig {
    /// Only keep mail from the last N years
    pub years: u32,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self { years: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurateSettings {
    pub per_topic: usize,
    pub min_chars: usize,
    pub dedupe: bool,
    pub dedupe_threshold: f64,
}

impl Default for CurateSettings {
    fn default() -> Self {
        Self {
            per_topic: 200,
            min_chars: 200,
            dedupe: true,
            dedupe_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Log lines forwarded to observers are cut to this many characters
    pub display_width: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { display_width: 50 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Job store, diagnostic log and venv live here
    pub cache_dir: Option<PathBuf>,
    /// Finished shortlists are copied here when set
    pub export_dir: Option<PathBuf>,
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub runtime: RuntimeConfig,
    pub clean: CleanConfig,
    pub curate: CurateSettings,
    pub supervisor: SupervisorConfig,
    pub paths: PathsConfig,
}

impl PipelineConfig {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let config = Self::from_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// `$XDG_CACHE_HOME/voice-synth`, else `~/.cache/voice-synth`
    pub fn cache_dir(&self) -> PathBuf {
        self.paths.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    pub fn jobs_file(&self) -> PathBuf {
        self.cache_dir().join("jobs.json")
    }

    pub fn diagnostic_log(&self) -> PathBuf {
        self.cache_dir().join("error.log")
    }

    /// Explicit interpreter, else the cache venv's
    pub fn python(&self) -> PathBuf {
        if let Some(python) = &self.runtime.python {
            return expand_home(python);
        }
        let venv = self.cache_dir().join("venv");
        if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python3")
        }
    }

    /// Make relative tool paths absolute against `base` (the binary's directory).
    pub fn resolve_tools(&mut self, base: &Path) {
        self.runtime.pipeline_script = resolve_against(base, &self.runtime.pipeline_script);
        self.runtime.stage_tool = resolve_against(base, &self.runtime.stage_tool);
        if let Some(export) = &self.paths.export_dir {
            self.paths.export_dir = Some(expand_home(export));
        }
        if let Some(cache) = &self.paths.cache_dir {
            self.paths.cache_dir = Some(expand_home(cache));
        }
    }
}

pub fn default_cache_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("voice-synth");
    }
    home_dir().join(".cache").join("voice-synth")
}

fn home_dir() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Replace a leading `~` with the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    let path = expand_home(path);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.clean.years, 5);
        assert_eq!(config.curate.per_topic, 200);
        assert_eq!(config.curate.dedupe_threshold, 0.8);
        assert_eq!(config.supervisor.display_width, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let mut config = PipelineConfig::default();
        config.paths.cache_dir = Some(PathBuf::from("/tmp/vs-cache"));
        assert_eq!(config.jobs_file(), PathBuf::from("/tmp/vs-cache/jobs.json"));
        assert_eq!(config.diagnostic_log(), PathBuf::from("/tmp/vs-cache/error.log"));
    }

    #[cfg(unix)]
    #[test]
    fn test_python_defaults_to_cache_venv() {
        let mut config = PipelineConfig::default();
        config.paths.cache_dir = Some(PathBuf::from("/c"));
        assert_eq!(config.python(), PathBuf::from("/c/venv/bin/python3"));

        config.runtime.python = Some(PathBuf::from("/usr/bin/python3"));
        assert_eq!(config.python(), PathBuf::from("/usr/bin/python3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_tools_against_base() {
        let mut config = PipelineConfig::default();
        config.runtime.stage_tool = PathBuf::from("/opt/bin/voicesynth-stage");
        config.resolve_tools(Path::new("/app"));
        assert_eq!(config.runtime.pipeline_script, PathBuf::from("/app/pipeline.py"));
        assert_eq!(config.runtime.stage_tool, PathBuf::from("/opt/bin/voicesynth-stage"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = PipelineConfig::load(Path::new("/definitely/not/here.yaml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
