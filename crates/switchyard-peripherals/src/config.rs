//! Loading of peripheral-specific configuration files.

use serde::de::DeserializeOwned;
use std::path::Path;
use switchyard_core::FactoryError;

/// Read a peripheral's TOML configuration, or use defaults without a path.
///
/// # Errors
///
/// Returns [`FactoryError::Config`] if the file cannot be read or parsed.
pub fn load<T>(path: Option<&Path>) -> Result<T, FactoryError>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    let contents = std::fs::read_to_string(path).map_err(|e| FactoryError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    toml::from_str(&contents).map_err(|e| FactoryError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        interval_ms: u64,
        text: String,
    }

    #[test]
    fn test_defaults_without_path() {
        let sample: Sample = load(None).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_missing_file() {
        let err = load::<Sample>(Some(Path::new("/nonexistent/switchyard.toml"))).unwrap_err();
        assert!(matches!(err, FactoryError::Config { .. }));
        assert!(err.to_string().contains("/nonexistent/switchyard.toml"));
    }

    #[test]
    fn test_parse_file() {
        let path = std::env::temp_dir().join(format!(
            "switchyard-config-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "interval_ms = 250\ntext = \"ping\"\n").unwrap();

        let sample: Sample = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(sample.interval_ms, 250);
        assert_eq!(sample.text, "ping");
    }
}
