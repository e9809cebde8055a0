//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "ELIGIBILITY";

/// 规则引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 启用短路求值（默认严格求值，两侧子树都会被评估）
    pub short_circuit: bool,
    /// 记录评估追踪
    pub trace_enabled: bool,
    /// 括号嵌套的最大深度
    pub max_nesting_depth: usize,
    /// 允许使用的属性，为空时不限制
    pub allowed_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            short_circuit: false,
            trace_enabled: false,
            max_nesting_depth: 64,
            allowed_fields: Vec::new(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub engine: EngineConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（ELIGIBILITY_ 前缀，如 ELIGIBILITY_ENGINE__SHORT_CIRCUIT -> engine.short_circuit）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(config_dir, service_name)
    }

    /// 从指定目录加载配置
    pub fn load_from(
        config_dir: impl AsRef<Path>,
        service_name: &str,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let env = std::env::var(format!("{}_ENV", ENV_PREFIX))
            .unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 嵌套字段使用双下划线分隔，字段名本身可以包含单下划线
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("engine.allowed_fields")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
