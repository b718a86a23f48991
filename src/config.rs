//! Application settings.
//!
//! Settings are loaded from an optional TOML file with `GALSCRIPT_*`
//! environment-variable overrides (e.g. `GALSCRIPT_LOGGING__PERIOD_S=0.5`).
//! Every field has a default so the engine runs without any configuration
//! file at all.

use crate::error::{EngineError, EngineResult};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level settings for a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for resolving relative sub-script names. When unset,
    /// the directory of the top-level script is used.
    pub script_dir: Option<PathBuf>,
    pub logging: LoggingSettings,
    pub wait: WaitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_dir: None,
            logging: LoggingSettings::default(),
            wait: WaitSettings::default(),
        }
    }
}

/// Periodic telemetry logger settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory that receives the per-run CSV file.
    pub directory: PathBuf,
    /// Sampling period in seconds.
    pub period_s: f64,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            period_s: 1.0,
        }
    }
}

/// Condition-wait engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    /// Sampling cadence of `waitai`/`waitdi` polling, in milliseconds.
    pub poll_interval_ms: u64,
    /// Divisor applied to raw `waitai` numeric arguments to convert them to
    /// engineering units. Historically hardcoded to 1e6; made explicit here
    /// because the factor is not universally correct for all PV types.
    pub analog_unit_divisor: f64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            analog_unit_divisor: 1_000_000.0,
        }
    }
}

impl Settings {
    /// Loads settings from the given file (if any) layered with environment
    /// overrides. Missing keys fall back to defaults.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let cfg = builder
            .add_source(Environment::with_prefix("GALSCRIPT").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Semantic validation beyond what deserialization can express.
    pub fn validate(&self) -> EngineResult<()> {
        if self.logging.period_s <= 0.0 {
            return Err(EngineError::Configuration(
                "logging.period_s must be positive".to_string(),
            ));
        }
        if self.wait.poll_interval_ms == 0 {
            return Err(EngineError::Configuration(
                "wait.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.wait.analog_unit_divisor <= 0.0 {
            return Err(EngineError::Configuration(
                "wait.analog_unit_divisor must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.wait.analog_unit_divisor, 1_000_000.0);
        assert_eq!(settings.logging.period_s, 1.0);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.wait.poll_interval_ms, 100);
        assert!(settings.script_dir.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "script_dir = \"/opt/scripts\"\n[wait]\nanalog_unit_divisor = 1000.0"
        )
        .unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.script_dir, Some(PathBuf::from("/opt/scripts")));
        assert_eq!(settings.wait.analog_unit_divisor, 1000.0);
        // untouched section keeps its defaults
        assert_eq!(settings.logging.period_s, 1.0);
    }

    #[test]
    fn test_validate_rejects_zero_period() {
        let mut settings = Settings::default();
        settings.logging.period_s = 0.0;
        assert!(settings.validate().is_err());
    }
}
