//! Configuration validation

use super::error::{ConfigError, ConfigResult};
use super::{CleanConfig, CurateSettings, PipelineConfig, RuntimeConfig, SupervisorConfig};

/// Trait for validatable configuration objects
pub trait Validatable {
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Get the configuration name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

impl Validatable for RuntimeConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.pipeline_script.as_os_str().is_empty() {
            return Err(ConfigError::range_with_hint(
                "runtime.pipeline_script",
                "\"\"",
                "Point it at pipeline.py.",
            ));
        }
        if self.stage_tool.as_os_str().is_empty() {
            return Err(ConfigError::range_with_hint(
                "runtime.stage_tool",
                "\"\"",
                "Point it at the voicesynth-stage binary.",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "runtime"
    }
}

impl Validatable for CleanConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.years == 0 {
            return Err(ConfigError::range_with_hint(
                "clean.years",
                self.years,
                "Use at least 1 year of mail.",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "clean"
    }
}

impl Validatable for CurateSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.per_topic == 0 {
            return Err(ConfigError::range_with_hint(
                "curate.per_topic",
                self.per_topic,
                "Use at least 1 record per topic.",
            ));
        }
        if !(self.dedupe_threshold > 0.0 && self.dedupe_threshold <= 1.0) {
            return Err(ConfigError::range_with_hint(
                "curate.dedupe_threshold",
                self.dedupe_threshold,
                "Must be in (0, 1]; lower values merge more aggressively.",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "curate"
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        // "..." alone needs 3 columns
        if self.display_width < 4 {
            return Err(ConfigError::range_with_hint(
                "supervisor.display_width",
                self.display_width,
                "Use at least 4 characters.",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "supervisor"
    }
}

impl Validatable for PipelineConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.runtime.validate()?;
        self.clean.validate()?;
        self.curate.validate()?;
        self.supervisor.validate()
    }

    fn config_name(&self) -> &'static str {
        "pipeline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_range() {
        let mut curate = CurateSettings::default();
        curate.dedupe_threshold = 1.0;
        assert!(curate.validate().is_ok());

        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            curate.dedupe_threshold = bad;
            assert!(curate.validate().is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = PipelineConfig::default();
        config.curate.per_topic = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("curate.per_topic"));

        let mut config = PipelineConfig::default();
        config.supervisor.display_width = 0;
        assert!(config.validate().is_err());
        config.supervisor.display_width = 3;
        assert!(config.validate().is_err());
        config.supervisor.display_width = 4;
        assert!(config.validate().is_ok());

        let mut config = PipelineConfig::default();
        config.clean.years = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_names() {
        assert_eq!(CurateSettings::default().config_name(), "curate");
        assert_eq!(PipelineConfig::default().config_name(), "pipeline");
    }
}
