//! 配置与可观测性集成测试
//!
//! 测试分层配置文件加载以及日志初始化。

use eligibility_shared::config::AppConfig;
use eligibility_shared::observability::{self, ObservabilityConfig};
use std::fs;
use std::path::PathBuf;

fn config_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "eligibility-shared-it-{}-{}",
        name,
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_environment_file_overrides_default() {
    let dir = config_dir("env");
    fs::write(
        dir.join("default.toml"),
        "[engine]\nshort_circuit = false\nmax_nesting_depth = 32\n",
    )
    .unwrap();
    fs::write(
        dir.join("development.toml"),
        "[engine]\nshort_circuit = true\n",
    )
    .unwrap();

    let config = AppConfig::load_from(&dir, "rule-engine").unwrap();

    // 未设置 ELIGIBILITY_ENV 时使用 development
    if config.environment == "development" {
        assert!(config.engine.short_circuit);
    }
    assert_eq!(config.engine.max_nesting_depth, 32);
    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = config_dir("invalid");
    fs::write(dir.join("default.toml"), "[engine]\nmax_nesting_depth = \"deep\"\n").unwrap();

    assert!(AppConfig::load_from(&dir, "rule-engine").is_err());
    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_observability_init_json() {
    let config = ObservabilityConfig {
        log_level: "debug".to_string(),
        log_format: "json".to_string(),
    };

    observability::init("rule-engine", &config).unwrap();
    tracing::info!(rule_id = "r1", "日志已初始化");

    // 全局 subscriber 只能设置一次
    assert!(observability::init("rule-engine", &config).is_err());
}
