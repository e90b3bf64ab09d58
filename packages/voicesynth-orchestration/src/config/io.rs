//! Configuration I/O (YAML)

use super::error::{ConfigError, ConfigResult};
use super::{
    CleanConfig, CurateSettings, PathsConfig, PipelineConfig, RuntimeConfig, SupervisorConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_VERSIONS: [u32; 1] = [1];

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1); optional only so a missing value gets a clear error
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<CleanConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curate: Option<CurateSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<SupervisorConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathsConfig>,
}

impl PipelineConfig {
    pub fn from_yaml(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(text)?;

        match file.version {
            None => return Err(ConfigError::MissingVersion),
            Some(v) if !SUPPORTED_VERSIONS.contains(&v) => {
                return Err(ConfigError::UnsupportedVersion {
                    found: v,
                    supported: SUPPORTED_VERSIONS.to_vec(),
                })
            }
            Some(_) => {}
        }

        Ok(Self {
            runtime: file.runtime.unwrap_or_default(),
            clean: file.clean.unwrap_or_default(),
            curate: file.curate.unwrap_or_default(),
            supervisor: file.supervisor.unwrap_or_default(),
            paths: file.paths.unwrap_or_default(),
        })
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            runtime: Some(self.runtime.clone()),
            clean: Some(self.clean.clone()),
            curate: Some(self.curate.clone()),
            supervisor: Some(self.supervisor.clone()),
            paths: Some(self.paths.clone()),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Validatable;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = PipelineConfig::default();
        config.curate.per_topic = 50;

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("per_topic: 50"));

        let recovered = PipelineConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(recovered, config);
    }

    #[test]
    fn test_yaml_loading_partial_sections() {
        let yaml_content = r#"
version: 1
clean:
  years: 2
curate:
  dedupe_threshold: 0.9
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = PipelineConfig::from_yaml(temp_file.path()).unwrap();
        assert_eq!(config.clean.years, 2);
        assert_eq!(config.curate.dedupe_threshold, 0.9);
        assert_eq!(config.curate.per_topic, 200);
        assert_eq!(config.supervisor.display_width, 50);
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = PipelineConfig::from_yaml_str("clean:\n  years: 2\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = PipelineConfig::from_yaml_str("version: 2\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let result = PipelineConfig::from_yaml_str("version: 1\ncurate:\n  per_topc: 3\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_load_validates_ranges() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"version: 1\ncurate:\n  dedupe_threshold: 1.5\n")
            .unwrap();

        let parsed = PipelineConfig::from_yaml(temp_file.path()).unwrap();
        assert!(parsed.validate().is_err());
        assert!(matches!(
            PipelineConfig::load(temp_file.path()),
            Err(ConfigError::Range { .. })
        ));
    }
}
