use s3transport::client::Scheme;
use s3transport::endpoint::Selection;
use std::env;
use std::fs;
use tempfile::TempDir;

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
profiles:
  test:
    bucket: test-bucket
    region: us-west-2
    endpoint: "minio.test:9000"
    path_style: true
    scheme: http
    access_key: AKIATEST
    secret_key: secrettest
    session_token: token123
    resolve:
      - 127.0.0.1

default_profile: test

transport:
  max_connections: 10
  min_throughput_bytes_per_second: 65536
  dns_cache_cap: 4
  content_type: application/octet-stream
  selection: least-connections
  connect_timeout: 2
  request_timeout: 30
  throughput_window: 5
  max_retries: 1
  insecure_tls: true
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3transport::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.profiles.len(), 1);
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.bucket, "test-bucket");
    assert_eq!(profile.region, "us-west-2");
    assert_eq!(profile.endpoint.as_deref(), Some("minio.test:9000"));
    assert!(profile.path_style);
    assert_eq!(profile.scheme, Scheme::Http);
    assert_eq!(profile.access_key, "AKIATEST");
    assert_eq!(profile.secret_key, "secrettest");
    assert_eq!(profile.session_token.as_deref(), Some("token123"));
    assert_eq!(profile.resolve, vec!["127.0.0.1".to_string()]);

    let transport = &config.transport;
    assert_eq!(transport.max_connections, 10);
    assert_eq!(transport.min_throughput_bytes_per_second, 65536);
    assert_eq!(transport.dns_cache_cap, 4);
    assert_eq!(transport.content_type, "application/octet-stream");
    assert_eq!(transport.selection, Selection::LeastConnections);
    assert_eq!(transport.max_retries, 1);
    assert!(transport.insecure_tls);

    let options = transport.transport_options(profile);
    assert_eq!(options.host(), "minio.test:9000");
    assert_eq!(options.dns_cache_cap, 4);
}

/// Test loading configuration from environment variables, AWS names then short names.
/// Kept in one test because the process environment is shared between test threads.
#[test]
fn test_load_env_config() {
    let names = [
        "S3_BUCKET",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "AWS_REGION",
        "S3_KEY",
        "S3_SECRET",
        "S3_ENDPOINT",
        "S3_PATH_STYLE",
        "S3_SCHEME",
        "S3_RESOLVE",
        "S3_MAX_CONNECTIONS",
        "S3_MIN_THROUGHPUT",
        "S3_DNS_CACHE_CAP",
        "S3_MAX_RETRIES",
    ];
    let saved: Vec<(&str, Option<String>)> =
        names.iter().map(|name| (*name, env::var(name).ok())).collect();
    for name in names {
        env::remove_var(name);
    }

    // Missing bucket is an error
    env::set_var("AWS_ACCESS_KEY_ID", "test_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "test_secret");
    assert!(s3transport::config::load_from_env().is_err());

    // AWS standard names
    env::set_var("S3_BUCKET", "bench-bucket");
    env::set_var("AWS_REGION", "eu-west-1");
    env::set_var("AWS_SESSION_TOKEN", "session");
    env::set_var("S3_RESOLVE", "10.0.0.1, 10.0.0.2");
    env::set_var("S3_MAX_CONNECTIONS", "10");
    env::set_var("S3_MIN_THROUGHPUT", "1024");
    env::set_var("S3_DNS_CACHE_CAP", "5");
    env::set_var("S3_MAX_RETRIES", "not-a-number");

    let config = s3transport::config::load_from_env().unwrap();
    assert_eq!(config.default_profile.as_deref(), Some("default"));

    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.bucket, "bench-bucket");
    assert_eq!(profile.access_key, "test_key");
    assert_eq!(profile.secret_key, "test_secret");
    assert_eq!(profile.session_token.as_deref(), Some("session"));
    assert_eq!(profile.region, "eu-west-1");
    assert_eq!(profile.resolve, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);

    assert_eq!(config.transport.max_connections, 10);
    assert_eq!(config.transport.min_throughput_bytes_per_second, 1024);
    assert_eq!(config.transport.dns_cache_cap, 5);
    // Unparseable values keep the default
    assert_eq!(config.transport.max_retries, 3);

    // Short names, addressing overrides
    env::remove_var("AWS_ACCESS_KEY_ID");
    env::remove_var("AWS_SECRET_ACCESS_KEY");
    env::remove_var("AWS_REGION");
    env::set_var("S3_KEY", "legacy_key");
    env::set_var("S3_SECRET", "legacy_secret");
    env::set_var("S3_ENDPOINT", "localhost:9000");
    env::set_var("S3_PATH_STYLE", "true");
    env::set_var("S3_SCHEME", "http");

    let config = s3transport::config::load_from_env().unwrap();
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.access_key, "legacy_key");
    assert_eq!(profile.secret_key, "legacy_secret");
    assert_eq!(profile.region, "us-east-1");
    assert_eq!(profile.endpoint.as_deref(), Some("localhost:9000"));
    assert!(profile.path_style);
    assert_eq!(profile.scheme, Scheme::Http);

    env::set_var("S3_SCHEME", "ftp");
    assert!(s3transport::config::load_from_env().is_err());

    for (name, value) in saved {
        cleanup_env(name, value);
    }
}

/// Test get_profile method and profile selection in load_config
#[test]
fn test_get_profile() {
    let yaml = r#"
profiles:
  prod:
    bucket: prod-bucket
    access_key: prod_key
    secret_key: prod_secret
  dev:
    bucket: dev-bucket
    access_key: dev_key
    secret_key: dev_secret

default_profile: prod
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3transport::config::load_from_yaml(&config_path).unwrap();

    let dev_profile = config.get_profile(Some("dev")).unwrap();
    assert_eq!(dev_profile.access_key, "dev_key");

    let default_profile = config.get_profile(None).unwrap();
    assert_eq!(default_profile.bucket, "prod-bucket");

    assert!(config.get_profile(Some("nonexistent")).is_none());

    let path = config_path.to_str().unwrap();
    let config = s3transport::config::load_config(Some(path), Some("dev")).unwrap();
    assert_eq!(config.get_profile(None).unwrap().bucket, "dev-bucket");
    assert!(s3transport::config::load_config(Some(path), Some("missing")).is_err());
}

/// Test that a malformed file is reported
#[test]
fn test_invalid_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "profiles: [not, a, map]").unwrap();

    assert!(s3transport::config::load_from_yaml(&config_path).is_err());
    assert!(s3transport::config::load_from_yaml(temp_dir.path().join("missing.yaml")).is_err());
}

/// Helper function to cleanup environment variables
fn cleanup_env(key: &str, orig_val: Option<String>) {
    match orig_val {
        Some(val) => env::set_var(key, val),
        None => env::remove_var(key),
    }
}
