use log::warn;
use teloxide::{
    payloads::setters::*,
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup},
    utils::command::BotCommands,
};
use tunelink_collab::{HistoryEntry, Job, Origin};

use super::{keyboard, profile, report, BotState, HandlerResult};

const HISTORY_LIMIT: u32 = 10;
const WELCOME: &str = "Send me a song name or a YouTube link and I will send you the audio.";
const BUSY: &str = "I am busy right now. Try again in a moment.";
const EMPTY_HISTORY: &str = "You have not downloaded anything yet.";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the menu")]
    Start,
    #[command(description = "link your account to the website")]
    Account,
    #[command(description = "show your latest downloads")]
    History,
}

pub async fn command(bot: Bot, msg: Message, cmd: Command, state: BotState) -> HandlerResult {
    let result = run_command(&bot, &msg, cmd, &state).await;
    report(&bot, msg.chat.id, result).await
}

async fn run_command(bot: &Bot, msg: &Message, cmd: Command, state: &BotState) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let profile = profile(user);

    match cmd {
        Command::Start => {
            state.collab.library.find_or_create_user(profile).await?;

            let menu = KeyboardMarkup::new(vec![vec![
                KeyboardButton::new("/account"),
                KeyboardButton::new("/history"),
            ]])
            .resize_keyboard(true);

            bot.send_message(msg.chat.id, WELCOME)
                .reply_markup(menu)
                .await?;
        }
        Command::Account => {
            let user = state.collab.library.find_or_create_user(profile).await?;

            bot.send_message(msg.chat.id, keyboard::account_text(user.linked))
                .reply_markup(keyboard::account_buttons(user.linked))
                .await?;
        }
        Command::History => {
            let entries = state
                .collab
                .library
                .history(profile.id, HISTORY_LIMIT)
                .await?;

            bot.send_message(msg.chat.id, format_history(&entries))
                .await?;
        }
    }

    Ok(())
}

/// Treats any other text as something to search for and deliver
pub async fn query(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let (Some(text), Some(user)) = (msg.text(), msg.from()) else {
        return Ok(());
    };

    let query = text.trim();
    if query.is_empty() || query.starts_with('/') {
        return Ok(());
    }

    let job = Job::deliver(msg.chat.id.0, profile(user), query, Origin::Chat);

    if let Err(e) = state.bridge.try_dispatch(job) {
        warn!("Could not schedule {:?}: {}", query, e);
        bot.send_message(msg.chat.id, BUSY).await?;
    }

    Ok(())
}

fn format_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_HISTORY.to_string();
    }

    let lines: Vec<_> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let track = &entry.track;
            let title = match &track.artist {
                Some(artist) => format!("{} - {}", artist, track.title),
                None => track.title.clone(),
            };

            format!(
                "{}. {} ({})",
                i + 1,
                title,
                entry.downloaded_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();

    format!("Your latest downloads:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tunelink_collab::TrackData;

    fn entry(title: &str, artist: Option<&str>) -> HistoryEntry {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        HistoryEntry {
            history_id: 1,
            downloaded_at: at,
            track: TrackData {
                id: 1,
                title: title.to_string(),
                artist: artist.map(str::to_string),
                url: "https://www.youtube.com/watch?v=abc".to_string(),
                thumbnail_url: None,
                duration: 200,
                created_at: at,
            },
        }
    }

    #[test]
    fn test_format_history() {
        assert_eq!(format_history(&[]), EMPTY_HISTORY);

        let text = format_history(&[entry("Song", Some("Band")), entry("Other", None)]);
        assert_eq!(
            text,
            "Your latest downloads:\n1. Band - Song (2024-05-01 12:30)\n2. Other (2024-05-01 12:30)"
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "tunelink_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/history", "tunelink_bot").unwrap(), Command::History);
        assert!(Command::parse("some song", "tunelink_bot").is_err());
    }
}
