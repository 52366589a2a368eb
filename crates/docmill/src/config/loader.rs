use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = serde_json::from_str(content)?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Builds a config from defaults plus environment overrides, for
/// deployments that carry no config file at all.
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(dir) = std::env::var("DOCMILL_JOBS_DIR") {
        config.jobs_dir = dir.into();
    }
    if let Ok(dir) = std::env::var("DOCMILL_STORAGE_DIR") {
        config.storage_dir = dir.into();
    }
    if let Ok(dir) = std::env::var("DOCMILL_OUTPUT_DIR") {
        config.output_directory = Some(dir.into());
    }
    if let Ok(path) = std::env::var("DOCMILL_SOFFICE_PATH") {
        config.soffice_path = path.into();
    }
    if let Ok(secs) = std::env::var("DOCMILL_CONVERT_TIMEOUT_SECS") {
        if let Ok(secs) = secs.parse() {
            config.convert_timeout_secs = secs;
        }
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.convert_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "convert_timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.progress_save_interval == 0 {
        return Err(ConfigError::Validation {
            message: "progress_save_interval must be greater than zero".to_string(),
        });
    }

    if config.allowed_template_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "allowed_template_extensions must not be empty".to_string(),
        });
    }

    if config.allowed_data_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "allowed_data_extensions must not be empty".to_string(),
        });
    }

    if config.available_output_formats.is_empty() {
        return Err(ConfigError::Validation {
            message: "available_output_formats must not be empty".to_string(),
        });
    }
    for name in &config.available_output_formats {
        if name.parse::<crate::jobs::OutputFormat>().is_err() {
            return Err(ConfigError::Validation {
                message: format!("unknown output format '{}' in available_output_formats", name),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.convert_timeout_secs, 120);
        assert_eq!(config.progress_save_interval, 10);
        assert!(config.is_allowed_template_extension("docx"));
        assert!(config.is_allowed_template_extension("DOCX"));
        assert!(!config.is_allowed_template_extension("pdf"));
    }

    #[test]
    fn parses_full_config() {
        let content = r#"{
            "jobs_dir": "/var/lib/docmill/jobs",
            "storage_dir": "/var/lib/docmill/storage",
            "output_directory": "/srv/exports",
            "soffice_path": "/usr/bin/soffice",
            "convert_timeout_secs": 30,
            "progress_save_interval": 5
        }"#;
        let config = load_config_from_str(content).unwrap();
        assert_eq!(config.jobs_dir, std::path::PathBuf::from("/var/lib/docmill/jobs"));
        assert_eq!(config.convert_timeout_secs, 30);
        assert_eq!(
            config.output_directory,
            Some(std::path::PathBuf::from("/srv/exports"))
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let result = load_config_from_str(r#"{"convert_timeout_secs": 0}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn rejects_empty_extension_list() {
        let result = load_config_from_str(r#"{"allowed_data_extensions": []}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn rejects_unknown_output_format() {
        let result = load_config_from_str(r#"{"available_output_formats": ["pdf", "docbook"]}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let config =
            load_config_from_str(r#"{"available_output_formats": ["pdf", "eml"]}"#).unwrap();
        assert!(config.is_available_output_format(&crate::jobs::OutputFormat::Pdf));
        assert!(!config.is_available_output_format(&crate::jobs::OutputFormat::Word));
    }

    #[test]
    fn rejects_invalid_json() {
        let result = load_config_from_str("not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    mod env_tests {
        use super::*;
        use serial_test::serial;

        // Tests that modify environment variables must run serially to
        // avoid racing each other.

        #[test]
        #[serial]
        fn env_overrides_win_over_file_values() {
            std::env::set_var("DOCMILL_JOBS_DIR", "/env/jobs");
            std::env::set_var("DOCMILL_CONVERT_TIMEOUT_SECS", "7");

            let config = load_config_from_str(r#"{"jobs_dir": "/file/jobs"}"#).unwrap();
            assert_eq!(config.jobs_dir, std::path::PathBuf::from("/env/jobs"));
            assert_eq!(config.convert_timeout_secs, 7);

            std::env::remove_var("DOCMILL_JOBS_DIR");
            std::env::remove_var("DOCMILL_CONVERT_TIMEOUT_SECS");
        }

        #[test]
        #[serial]
        fn env_only_config_uses_defaults_elsewhere() {
            std::env::set_var("DOCMILL_SOFFICE_PATH", "/opt/libreoffice/soffice");

            let config = load_config_from_env().unwrap();
            assert_eq!(
                config.soffice_path,
                std::path::PathBuf::from("/opt/libreoffice/soffice")
            );
            assert_eq!(config.convert_timeout_secs, 120);

            std::env::remove_var("DOCMILL_SOFFICE_PATH");
        }
    }
}
