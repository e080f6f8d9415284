use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;

use xenia_progress::commands::{self, map_storage_error, Cli};
use xenia_progress::config::Config;
use xenia_progress::logging;
use xenia_progress::repository::SqliteProgressRepository;
use xenia_progress::storage::Storage;
use xenia_progress::store::ProgressStore;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db.clone() {
        config.db_path = db;
    }

    let _log_guard = logging::init_tracing(&config);

    match run(&config, &cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "命令执行失败");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, cli: &Cli) -> Result<String, String> {
    let storage = Storage::new(&config.db_path).map_err(|e| {
        format!(
            "无法打开数据库 {}: {}",
            config.db_path.display(),
            map_storage_error(e)
        )
    })?;
    tracing::debug!(db_path = storage.db_path(), "数据库已打开");

    let repo = SqliteProgressRepository::new(storage, config.key_prefix.clone());
    let mut store = ProgressStore::open(repo);

    let today = Utc::now().date_naive();
    let value = commands::execute(&mut store, &cli.command, today)?;

    serde_json::to_string_pretty(&value).map_err(|e| format!("序列化错误: {}", e))
}
