use std::path::Path;

use common::SerdeFormat;
use serde::Deserialize;

use crate::common::Result;

/// Which compute backend runs the pipeline.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// GPU when an adapter is available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EqualizerConfig {
    pub backend: BackendKind,
    /// Check table and output invariants after each run.
    pub verify: bool,
    pub print_tables: bool,
    pub log_level: String,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            verify: true,
            print_tables: false,
            log_level: "info".to_string(),
        }
    }
}

impl EqualizerConfig {
    pub fn parse(text: &str, format: SerdeFormat) -> Result<Self> {
        Ok(common::deserialize(text, format)?)
    }

    /// Reads a YAML or JSON config; the format follows the file extension.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = SerdeFormat::from_file_name(&path.to_string_lossy())?;
        let text = std::fs::read_to_string(path)?;

        Self::parse(&text, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EqualizerConfig::parse("backend: cpu\n", SerdeFormat::Yaml).unwrap();

        assert_eq!(config.backend, BackendKind::Cpu);
        assert!(config.verify);
        assert!(!config.print_tables);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn json_config() {
        let config = EqualizerConfig::parse(
            r#"{"backend":"gpu","verify":false,"print_tables":true,"log_level":"debug"}"#,
            SerdeFormat::Json,
        )
        .unwrap();

        assert_eq!(
            config,
            EqualizerConfig {
                backend: BackendKind::Gpu,
                verify: false,
                print_tables: true,
                log_level: "debug".to_string(),
            }
        );
    }

    #[test]
    fn unknown_backend_is_config_error() {
        let err = EqualizerConfig::parse("backend: opencl\n", SerdeFormat::Yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = EqualizerConfig::parse("colour: red\n", SerdeFormat::Yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn read_file_picks_format_from_extension() {
        let path = common::test_utils::test_output_path("equalizer_config.yml");
        std::fs::write(&path, "verify: false\nlog_level: warn\n").unwrap();

        let config = EqualizerConfig::read_file(&path).unwrap();
        assert!(!config.verify);
        assert_eq!(config.log_level, "warn");

        let err = EqualizerConfig::read_file("config.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn backend_names_are_lowercase() {
        assert_eq!(BackendKind::Auto.to_string(), "auto");
        assert_eq!(BackendKind::Gpu.to_string(), "gpu");
    }
}
