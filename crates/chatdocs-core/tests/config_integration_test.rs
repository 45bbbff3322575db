use chatdocs_core::{ChatDocsConfig, ConfigError, ConfigManager};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let config = ChatDocsConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_create_and_reload_default_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&path).unwrap();
    assert!(path.exists());

    let manager = ConfigManager::from_path(&path).unwrap();
    assert_eq!(manager.config_path(), Some(path.as_path()));
    assert_eq!(manager.config().chunking.chunk_size, 1000);
    assert_eq!(manager.config().retrieval.top_k, 4);
    assert!((manager.config().llm.temperature - 0.7).abs() < 1e-6);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[chunking]
chunk_size = 400
chunk_overlap = 40

[retrieval]
history_window = 6
condense_question = true

[embedding]
provider = "hashing"
dimension = 64
"#,
    )
    .unwrap();

    let config = ConfigManager::from_path(&path).unwrap().into_config();
    assert_eq!(config.chunking.chunk_size, 400);
    assert_eq!(config.chunking.chunk_overlap, 40);
    assert_eq!(config.chunking.separators.len(), 5);
    assert_eq!(config.retrieval.history_window, Some(6));
    assert!(config.retrieval.condense_question);
    assert_eq!(config.retrieval.top_k, 4);
    assert_eq!(config.embedding.provider, "hashing");
    assert_eq!(config.embedding.dimension, 64);
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
fn test_invalid_overlap_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[chunking]\nchunk_size = 10\nchunk_overlap = 15\n").unwrap();

    assert!(matches!(
        ConfigManager::from_path(&path),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[chunking\nchunk_size = ").unwrap();

    assert!(matches!(
        ConfigManager::from_path(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(
        ConfigManager::from_path(&path),
        Err(ConfigError::NotFound(_))
    ));
}
