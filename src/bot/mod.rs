//! The Telegram front end. Everything in here runs on the bot thread, which owns the
//! bot connection and the job loop that HTTP requests dispatch to.

mod commands;
mod keyboard;
mod transport;

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{error, info};
use teloxide::{prelude::*, RequestError};
use thiserror::Error;
use tokio::runtime;
use tunelink_collab::{DatabaseError, DefaultCollab, Job, LinkError, NewUser};
use tunelink_core::{DispatchBridge, JobLoop};

pub use commands::Command;
pub use transport::TeloxideTransport;

const GENERIC_ERROR: &str = "Something went wrong. Try again later.";

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type HandlerResult = Result<(), BotError>;

/// What every handler gets access to
#[derive(Clone)]
pub struct BotState {
    pub collab: Arc<DefaultCollab>,
    pub bridge: Arc<DispatchBridge<Job>>,
    /// Where users enter their link code
    pub webapp_url: Option<String>,
}

/// Builds the profile we store for a Telegram user
pub fn profile(user: &teloxide::types::User) -> NewUser {
    NewUser {
        // Telegram ids fit in 52 bits
        id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
    }
}

/// Starts the bot on its own thread, with a single-threaded runtime that
/// also runs every dispatched job. Returns once polling stops.
pub fn spawn_bot(bot: Bot, state: BotState) -> io::Result<JoinHandle<io::Result<()>>> {
    thread::Builder::new()
        .name("tunelink-bot".to_string())
        .spawn(move || {
            let runtime = runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            runtime.block_on(run_bot(bot, state));
            Ok(())
        })
}

async fn run_bot(bot: Bot, state: BotState) {
    let transport = Arc::new(TeloxideTransport::new(bot.clone()));
    let collab = state.collab.clone();
    let capacity = collab.config.dispatch_capacity;

    let jobs = JobLoop::start(&state.bridge, capacity, move |job: Job| {
        let collab = collab.clone();
        let transport = transport.clone();

        async move { collab.run_job(job, transport.as_ref()).await }
    });

    info!("Bot is polling for updates");

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(commands::command),
                )
                .branch(dptree::endpoint(commands::query)),
        )
        .branch(Update::filter_callback_query().endpoint(keyboard::callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped polling, finishing scheduled jobs");
    jobs.shutdown().await;
}

/// Logs a failed handler and tells the user something went wrong
async fn report(bot: &Bot, chat_id: ChatId, result: HandlerResult) -> HandlerResult {
    if let Err(e) = result {
        error!("Handler failed in chat {}: {}", chat_id.0, e);
        bot.send_message(chat_id, GENERIC_ERROR).await?;
    }

    Ok(())
}
