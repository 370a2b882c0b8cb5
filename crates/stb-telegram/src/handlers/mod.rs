//! Telegram update handlers.
//!
//! Each handler validates the sender, then drives the core services and
//! replies through the `MessagingPort`. Admin-only operations are gated on
//! the configured admin set; ownership of a claim is re-validated by the
//! coordinator regardless.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use stb_core::{domain::UserId, messaging::port::MessagingPort, store::UserProfile};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(()); // channel posts etc.
    };

    let Some(msg_text) = msg.text() else {
        let chat = stb_core::domain::ChatId(msg.chat.id.0);
        let _ = state
            .messenger
            .send_html(chat, "Please send your question as a text message.")
            .await;
        return Ok(());
    };

    if msg_text.starts_with('/') {
        return commands::handle_command(&msg, state).await;
    }

    text::handle_text(&msg, state).await
}

/// Profile attributes refreshed from every inbound message.
fn profile_from(user: &teloxide::types::User) -> UserProfile {
    let mut display_name = user.first_name.clone();
    if let Some(last) = &user.last_name {
        display_name.push(' ');
        display_name.push_str(last);
    }
    let display_name = if display_name.trim().is_empty() {
        None
    } else {
        Some(display_name)
    };

    UserProfile {
        id: UserId(user.id.0 as i64),
        display_name,
        handle: user.username.clone(),
    }
}
