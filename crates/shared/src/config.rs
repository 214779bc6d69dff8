//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 环境变量前缀，如 RULES_SERVER_PORT -> server.port
pub const ENV_PREFIX: &str = "RULES";

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 跨域配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// 允许的来源，`*` 表示任意来源
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志和指标的来源
    pub service_name: String,
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载前先读取 `.env` 文件（如果存在）。加载顺序（后加载的覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULES_ 前缀，如 RULES_SERVER_HOST -> server.host）
    /// 5. PORT 环境变量（覆盖监听端口）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let env = std::env::var("RULES_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let mut config = Self::load_from(service_name, Path::new(&config_dir), &env)?;

        if let Some(port) = std::env::var("PORT").ok().and_then(|v| parse_port(&v)) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 从指定目录加载配置，不处理 PORT 覆盖
    pub fn load_from(service_name: &str, config_dir: &Path, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse().ok().filter(|port| *port != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_config_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rule-shared-{}-{}", name, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cors.allowed_origins, vec!["*"]);
        assert!(config.observability.metrics_enabled);
        assert!(!config.observability.json_logs());
    }

    #[test]
    fn test_server_addr() {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_with_service_name() {
        let obs = ObservabilityConfig::default().with_service_name("rule-engine");
        assert_eq!(obs.service_name, "rule-engine");
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("3000"), Some(3000));
        assert_eq!(parse_port(" 8081 "), Some(8081));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("abc"), None);
        assert_eq!(parse_port("70000"), None);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = temp_config_dir("empty");
        let config = AppConfig::load_from("rule-engine", &dir, "test").unwrap();

        assert_eq!(config.service_name, "rule-engine");
        assert_eq!(config.environment, "test");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_load_layers_files() {
        let dir = temp_config_dir("layered");
        fs::write(
            dir.join("default.toml"),
            "[server]\nport = 9000\n\n[observability]\nlog_level = \"debug\"\n",
        )
        .unwrap();
        fs::write(dir.join("staging.toml"), "[server]\nport = 9100\n").unwrap();
        fs::write(
            dir.join("rule-engine.toml"),
            "[cors]\nallowed_origins = [\"http://localhost:3000\"]\n",
        )
        .unwrap();

        let config = AppConfig::load_from("rule-engine", &dir, "staging").unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.cors.allowed_origins, vec!["http://localhost:3000"]);
        assert!(!config.is_production());
    }
}
