use std::{env, io, sync::Arc};

use bot::BotState;
use colored::Colorize;
use log::{error, info};
use teloxide::Bot;
use thiserror::Error;
use tokio::runtime::{self, Runtime};
use tunelink_collab::{Collab, DatabaseError, DefaultCollab, Job, SqliteDatabase, YtDlp};
use tunelink_core::{parse_var, Config, ConfigError, DispatchBridge};
use tunelink_server::{ServerConfig, ServerContext};

mod bot;
mod logging;

const DEFAULT_DATABASE_URL: &str = "sqlite://tunelink.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

pub struct Tunelink {
    collab: Arc<DefaultCollab>,
    bridge: Arc<DispatchBridge<Job>>,
    server_config: ServerConfig,
    bot: Bot,
    webapp_url: Option<String>,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum TunelinkError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("TELEGRAM_TOKEN is not set")]
    MissingToken,

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Fatal error: {0}")]
    Fatal(#[from] io::Error),
}

impl Tunelink {
    fn new() -> Result<Self, TunelinkError> {
        let config = Config::from_env()?;
        let server_config = ServerConfig::from_env()?;
        let token = env::var("TELEGRAM_TOKEN").map_err(|_| TunelinkError::MissingToken)?;
        let webapp_url = env::var("TUNELINK_WEBAPP_URL").ok();

        let database_url =
            env::var("TUNELINK_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let max_connections =
            parse_var("TUNELINK_DB_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_MAX_CONNECTIONS);

        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tunelink-http")
            .build()?;

        info!("Connecting to database...");
        let database = runtime.block_on(SqliteDatabase::new(&database_url, max_connections))?;

        let extractor = YtDlp::from_config(&config);
        let collab = Collab::new(config, database, extractor);

        Ok(Self {
            collab: Arc::new(collab),
            bridge: Arc::new(DispatchBridge::new()),
            bot: Bot::new(token),
            server_config,
            webapp_url,
            runtime,
        })
    }

    fn run(self) -> Result<(), TunelinkError> {
        let bot_thread = bot::spawn_bot(
            self.bot,
            BotState {
                collab: self.collab.clone(),
                bridge: self.bridge.clone(),
                webapp_url: self.webapp_url,
            },
        )?;

        let context = ServerContext::new(self.collab, self.bridge);
        let server_config = self.server_config;

        self.runtime.block_on(async move {
            tokio::select! {
                result = tunelink_server::run_server(server_config, context) => result,
                result = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    result
                }
            }
        })?;

        match bot_thread.join() {
            Ok(result) => result?,
            Err(_) => error!("Bot thread panicked"),
        }

        Ok(())
    }
}

impl TunelinkError {
    fn hint(&self) -> String {
        match self {
            TunelinkError::Config(_) => "Check the TUNELINK_* variables in your environment or .env file.".to_string(),
            TunelinkError::MissingToken => "Create a bot with @BotFather and put its token in TELEGRAM_TOKEN.".to_string(),
            TunelinkError::Database(_) => "This is a database error. Make sure TUNELINK_DATABASE_URL points to a writable SQLite file, then try again.".to_string(),
            TunelinkError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn main() {
    // A missing .env file is fine, the environment may already be set
    let _ = dotenvy::dotenv();

    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {}", e);
    }

    let result = Tunelink::new().and_then(|tunelink| {
        info!("Initialized successfully.");
        tunelink.run()
    });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "tunelink failed to start!".bold().red());
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).dimmed().italic()
        );
    }
}
