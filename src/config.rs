use std::path::PathBuf;

/// 默认的持久化键前缀
pub const DEFAULT_KEY_PREFIX: &str = "xenia";

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 数据库文件路径
    pub db_path: PathBuf,
    /// 持久化键前缀，例如 `xenia` -> `xenia-studyPlan`
    pub key_prefix: String,
    pub log_level: String,
    /// 文件日志目录，`None` 时只输出到 stderr
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = std::env::var("XENIA_DB_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let key_prefix = std::env::var("XENIA_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let log_dir = file_logs.then(|| {
            std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir().join("logs"))
        });

        Self {
            db_path,
            key_prefix,
            log_level,
            log_dir,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xenia")
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("xenia.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.key_prefix, "xenia");
        assert_eq!(config.log_level, "info");
        assert!(config.db_path.ends_with("xenia/xenia.db"));
        assert!(config.log_dir.is_none());
    }
}
