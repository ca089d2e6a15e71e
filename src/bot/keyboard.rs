use log::debug;
use teloxide::{
    payloads::setters::*,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};
use tunelink_collab::{LinkError, MessageRef};

use super::{profile, report, BotState, HandlerResult};

const REQUEST_LINK: &str = "link:request";
const DISCONNECT: &str = "link:disconnect";

pub fn account_text(linked: bool) -> &'static str {
    if linked {
        "Your account is linked to the website."
    } else {
        "Your account is not linked to the website yet."
    }
}

pub fn account_buttons(linked: bool) -> InlineKeyboardMarkup {
    let button = if linked {
        InlineKeyboardButton::callback("Disconnect", DISCONNECT)
    } else {
        InlineKeyboardButton::callback("Get a link code", REQUEST_LINK)
    };

    InlineKeyboardMarkup::new(vec![vec![button]])
}

fn code_text(code: i64, webapp_url: Option<&str>) -> String {
    match webapp_url {
        Some(url) => format!("Your link code is {}\nEnter it at {} to link your account.", code, url),
        None => format!("Your link code is {}\nEnter it on the website to link your account.", code),
    }
}

pub async fn callback(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(message) = &q.message else {
        return Ok(());
    };

    let chat_id = message.chat.id;
    let result = run_callback(&bot, &q, message, &state).await;
    report(&bot, chat_id, result).await
}

async fn run_callback(
    bot: &Bot,
    q: &CallbackQuery,
    message: &Message,
    state: &BotState,
) -> HandlerResult {
    let profile = profile(&q.from);
    let user_id = profile.id;

    match q.data.as_deref() {
        Some(REQUEST_LINK) => {
            let code = state.collab.links.issue_code(profile).await?;
            let text = code_text(code, state.webapp_url.as_deref());

            bot.edit_message_text(message.chat.id, message.id, text)
                .await?;

            // The website marks the code as used, this is the message we update then
            state
                .collab
                .link_messages
                .register(user_id, MessageRef::new(message.chat.id.0, message.id.0));
        }
        Some(DISCONNECT) => {
            match state.collab.links.disconnect(user_id).await {
                Ok(_) | Err(LinkError::UserNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }

            state.collab.link_messages.clear(user_id);

            bot.edit_message_text(message.chat.id, message.id, account_text(false))
                .reply_markup(account_buttons(false))
                .await?;
        }
        other => debug!("Ignoring callback {:?}", other),
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_buttons_follow_link_state() {
        assert_eq!(callback_data(&account_buttons(false)), vec![REQUEST_LINK]);
        assert_eq!(callback_data(&account_buttons(true)), vec![DISCONNECT]);
    }

    #[test]
    fn test_code_text() {
        assert!(code_text(12345678, None).contains("12345678"));
        assert!(code_text(12345678, Some("https://tunelink.example")).contains("https://tunelink.example"));
    }
}
