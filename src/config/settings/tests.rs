use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.embedding_dimension, 768);
    assert!((config.ranking.alpha - 0.2).abs() < f64::EPSILON);
    assert_eq!(config.ranking.default_k, 5);
    assert!(!config.ranking.exclude_consumed);
    assert_eq!(
        config.ranking.unknown_user_policy,
        UnknownUserPolicy::Reject
    );
    assert!(config.explainer.enabled);
    assert_eq!(config.metrics.evaluated_k, 10);
    assert!(config.metrics.hit_rate_at_k.is_none());
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.embedding_dimension = 1;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.explainer.timeout_ms = 10;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.explainer.temperature = 3.0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ranking.half_life_days = 0.0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ranking.saturation = -1.0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.metrics.ndcg_at_k = Some(1.5);
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.ranking.default_k = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn alpha_is_rejected_not_clamped() {
    let mut ranking = RankingConfig::default();

    assert!(matches!(
        ranking.set_alpha(1.5),
        Err(ConfigError::InvalidAlpha(_))
    ));
    assert!(ranking.set_alpha(-0.1).is_err());
    assert!(ranking.set_alpha(f64::NAN).is_err());
    assert!((ranking.alpha - 0.2).abs() < f64::EPSILON);

    assert!(ranking.set_alpha(0.0).is_ok());
    assert!(ranking.set_alpha(1.0).is_ok());
    assert!((ranking.alpha - 1.0).abs() < f64::EPSILON);
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let mut config = Config::default();
    config.metrics.hit_rate_at_k = Some(0.31);
    config.metrics.ndcg_at_k = Some(0.18);
    config.ranking.unknown_user_policy = UnknownUserPolicy::CatalogCentroid;

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_section_defaults() {
    let partial_toml = r#"
        [ranking]
        alpha = 0.35
        unknown_user_policy = "catalog_centroid"
    "#;

    let parsed: Config = toml::from_str(partial_toml).expect("should parse partial toml");
    assert!((parsed.ranking.alpha - 0.35).abs() < f64::EPSILON);
    assert_eq!(
        parsed.ranking.unknown_user_policy,
        UnknownUserPolicy::CatalogCentroid
    );
    assert_eq!(parsed.ranking.default_k, 5);
    assert_eq!(parsed.ollama, OllamaConfig::default());
    assert_eq!(parsed.explainer, ExplainerConfig::default());
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig {
        protocol: "http".to_string(),
        host: "localhost".to_string(),
        port: 11434,
        model: "test-model".to_string(),
        batch_size: 32,
        embedding_dimension: 384,
    };

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(1024).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_embedding_dimension(8192).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load default config");

    assert_eq!(config.ranking, RankingConfig::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(
        config.database_path(),
        temp_dir.path().join("recommender.db")
    );
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config::load(temp_dir.path()).expect("should load default config");
    config.ranking.alpha = 0.6;
    config.explainer.model = "qwen2.5:3b".to_string();
    config.save().expect("should save config");

    let reloaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(config, reloaded);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[ranking]\nalpha = 2.0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn explainer_durations() {
    let explainer = ExplainerConfig::default();
    assert_eq!(explainer.timeout(), Duration::from_millis(8000));
    assert_eq!(explainer.cache_ttl(), Duration::from_secs(300));
    let url = explainer.explainer_url().expect("valid explainer url");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}
