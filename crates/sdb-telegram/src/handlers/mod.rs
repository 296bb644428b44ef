//! Telegram update handlers.
//!
//! Each handler only translates a teloxide update into the core
//! [`IncomingUpdate`] model and hands it to [`BotService`]. Failures are logged
//! and swallowed so one bad update never stops the dispatcher.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};
use tracing::{debug, error};

use sdb_core::{
    app::BotService,
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{self, Command, IncomingUpdate, Sender, TextMessage},
};

pub async fn handle_message(msg: Message, service: Arc<BotService>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };

    let from = sender(user, msg.chat.id.0);
    let update = if text.starts_with('/') {
        let (name, args) = parse_command(text);
        IncomingUpdate::Command(Command { from, name, args })
    } else {
        IncomingUpdate::Text(TextMessage {
            from,
            text: text.to_string(),
        })
    };

    if let Err(e) = service.handle(update).await {
        error!(chat_id = msg.chat.id.0, error = %e, "message handler failed");
    }
    Ok(())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    service: Arc<BotService>,
) -> ResponseResult<()> {
    let (Some(message), Some(data)) = (q.message.as_ref(), q.data.clone()) else {
        // Nothing to act on, but the button spinner still has to stop.
        let _ = bot.answer_callback_query(q.id.clone()).await;
        return Ok(());
    };

    let update = IncomingUpdate::Callback(types::CallbackQuery {
        from: sender(&q.from, message.chat.id.0),
        callback_id: q.id.clone(),
        data,
        message: MessageRef {
            chat_id: ChatId(message.chat.id.0),
            message_id: MessageId(message.id.0),
        },
    });

    if let Err(e) = service.handle(update).await {
        error!(user_id = q.from.id.0, error = %e, "callback handler failed");
    }
    Ok(())
}

fn sender(user: &User, chat_id: i64) -> Sender {
    Sender {
        chat_id: ChatId(chat_id),
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
    }
}

/// Split `/cmd@botname arg1 ...` into a lowercase command name and the rest.
fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_command() {
        assert_eq!(parse_command("/start"), ("start".to_string(), String::new()));
    }

    #[test]
    fn strips_bot_mention_and_lowercases() {
        assert_eq!(
            parse_command("/Help@SpotifyDlBot"),
            ("help".to_string(), String::new())
        );
    }

    #[test]
    fn keeps_arguments() {
        assert_eq!(
            parse_command("  /status   now please "),
            ("status".to_string(), "now please".to_string())
        );
    }
}
