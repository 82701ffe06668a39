use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars, expand_tilde, resolve_config_path};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Load, expand, and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse config from YAML text. An empty document yields the defaults.
pub fn parse_config_str(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml_string)?
    };

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Resolve the config location and load it, falling back to built-in
/// defaults when no file exists in any of the default locations.
///
/// Returns the path that was used, if any.
pub fn load_or_default(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    match resolve_config_path(explicit) {
        Some(path) => {
            let config = load_config(&path)?;
            Ok((config, Some(path)))
        }
        None => {
            let mut config = Config::default();
            expand_paths(&mut config);
            validate_config(&config)?;
            Ok((config, None))
        }
    }
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    config.storage.path = expand_tilde(&config.storage.path);
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.batcher.threshold == 0 {
        errors.push("batcher.threshold must be greater than 0".to_string());
    }
    if config.batcher.period.is_zero() {
        errors.push("batcher.period must be greater than 0".to_string());
    }

    validate_stream(&config.stream, &mut errors);

    if config.producer.retry.max_attempts == 0 {
        errors.push("producer.retry.max_attempts must be greater than 0".to_string());
    }
    if config.consumer.retry.max_attempts == 0 {
        errors.push("consumer.retry.max_attempts must be greater than 0".to_string());
    }

    if config.watchdog.poll_interval.is_zero() {
        errors.push("watchdog.poll_interval must be greater than 0".to_string());
    }
    if config.watchdog.probe_timeout.is_zero() {
        errors.push("watchdog.probe_timeout must be greater than 0".to_string());
    }

    if config.storage.path.as_os_str().is_empty() {
        errors.push("storage.path cannot be empty".to_string());
    }

    if let Err(e) = config.web.listen.parse::<SocketAddr>() {
        errors.push(format!(
            "web.listen: invalid address '{}': {}",
            config.web.listen, e
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_stream(stream: &StreamConfig, errors: &mut Vec<String>) {
    if stream.partitions == 0 {
        errors.push("stream.partitions must be greater than 0".to_string());
    }

    for (name, value) in [
        ("topic", &stream.topic),
        ("key", &stream.key),
        ("group_id", &stream.group_id),
        ("consumer_id", &stream.consumer_id),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("stream.{} cannot be empty", name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config_str("").unwrap();

        assert_eq!(config.batcher.threshold, 10);
        assert_eq!(config.batcher.initial_delay, Duration::from_secs(4));
        assert_eq!(config.batcher.period, Duration::from_secs(1));
        assert_eq!(config.stream.topic, "new-event-topic");
        assert_eq!(config.stream.partitions, 3);
        assert_eq!(config.producer.retry.max_attempts, 5);
        assert_eq!(config.consumer.retry.max_attempts, 3);
        assert_eq!(config.watchdog.poll_interval, Duration::from_secs(5));
        assert!(!config.stream.consumer_id.is_empty());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r#"
batcher:
  threshold: 25
consumer:
  retry:
    max_attempts: 7
    interval: 250ms
"#;
        let config = parse_config_str(yaml).unwrap();

        assert_eq!(config.batcher.threshold, 25);
        assert_eq!(config.batcher.period, Duration::from_secs(1));
        assert_eq!(config.consumer.retry.max_attempts, 7);
        assert_eq!(config.consumer.retry.interval, Duration::from_millis(250));
        assert_eq!(config.producer.retry.max_attempts, 5);
    }

    #[test]
    fn test_retry_section_accepts_single_field() {
        let yaml = r#"
producer:
  retry:
    max_attempts: 3
consumer:
  retry:
    interval: 2s
"#;
        let config = parse_config_str(yaml).unwrap();

        assert_eq!(config.producer.retry.max_attempts, 3);
        assert_eq!(config.producer.retry.interval, Duration::from_secs(1));
        assert_eq!(config.consumer.retry.max_attempts, 3);
        assert_eq!(config.consumer.retry.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_retry_section_keeps_section_defaults() {
        let config = parse_config_str("producer:\n  retry: {}\n").unwrap();
        assert_eq!(config.producer.retry.max_attempts, 5);
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let yaml = r#"
batcher:
  threshold: 0
stream:
  partitions: 0
  topic: ""
web:
  listen: "not an address"
"#;
        let err = parse_config_str(yaml).unwrap_err();

        match err {
            ConfigError::ValidationList(errors) => {
                assert_eq!(errors.len(), 4);
                assert!(errors.iter().any(|e| e.contains("batcher.threshold")));
                assert!(errors.iter().any(|e| e.contains("stream.partitions")));
                assert!(errors.iter().any(|e| e.contains("stream.topic")));
                assert!(errors.iter().any(|e| e.contains("web.listen")));
            }
            other => panic!("expected ValidationList, got {:?}", other),
        }
    }

    #[test]
    fn test_unset_env_var_is_reported() {
        let yaml = "stream:\n  consumer_id: $env{REQLOG_SURELY_UNSET_VAR}\n";
        let err = parse_config_str(yaml).unwrap_err();

        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("REQLOG_SURELY_UNSET_VAR")),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_env_var_is_expanded() {
        std::env::set_var("REQLOG_PARSE_TEST_GROUP", "group-from-env");
        let config =
            parse_config_str("stream:\n  group_id: $env{REQLOG_PARSE_TEST_GROUP}\n").unwrap();
        std::env::remove_var("REQLOG_PARSE_TEST_GROUP");

        assert_eq!(config.stream.group_id, "group-from-env");
    }

    #[test]
    fn test_bad_duration_is_a_yaml_error() {
        let err = parse_config_str("batcher:\n  period: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse(_)));
    }
}
