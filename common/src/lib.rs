use serde::de::DeserializeOwned;

pub mod file_format;
pub mod log_setup;
pub mod parallel;
pub mod test_utils;

pub use file_format::{get_file_extension, FileExtensionError, FileFormatResult, SerdeFormat};
pub use log_setup::setup_logging;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML deserialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON deserialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: SerdeFormat,
) -> SerdeFormatResult<T> {
    match format {
        SerdeFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        SerdeFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Sample {
        name: String,
        level: u32,
    }

    #[test]
    fn deserialize_yaml_and_json() {
        let yaml: Sample = deserialize("name: a\nlevel: 3\n", SerdeFormat::Yaml).unwrap();
        let json: Sample = deserialize(r#"{"name":"a","level":3}"#, SerdeFormat::Json).unwrap();

        assert_eq!(yaml, json);
        assert_eq!(yaml.level, 3);
    }

    #[test]
    fn deserialize_reports_malformed_input() {
        let result: SerdeFormatResult<Sample> = deserialize("{not json", SerdeFormat::Json);
        assert!(matches!(result, Err(SerdeFormatError::Json(_))));
    }
}
