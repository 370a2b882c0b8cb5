use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use stb_core::{
    domain::{AdminId, ChatId, TicketId, UserId},
    errors::Error,
    formatting::escape_html,
    messaging::port::MessagingPort,
    store::{StatusFilter, TicketStatus, TicketStore, UserDirectory},
};

use crate::keyboards;
use crate::router::AppState;

use super::commands::{parse_status_filter, send_stats, send_ticket_list};

/// Admin callback actions (`a:` namespace).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AdminAction {
    Panel,
    Stats,
    FilterMenu,
    List(StatusFilter),
    Broadcast,
    Claim(TicketId),
    Answer(TicketId),
    Unclaim(TicketId),
    Ban(UserId),
}

fn parse_admin_action(data: &str) -> Option<AdminAction> {
    match data {
        "panel" => return Some(AdminAction::Panel),
        "stats" => return Some(AdminAction::Stats),
        "filter_menu" => return Some(AdminAction::FilterMenu),
        "broadcast" => return Some(AdminAction::Broadcast),
        _ => {}
    }

    let (action, arg) = data.split_once(':')?;
    match action {
        "list" => parse_status_filter(arg).map(AdminAction::List),
        "claim" => arg.parse().ok().map(|n| AdminAction::Claim(TicketId(n))),
        "answer" => arg.parse().ok().map(|n| AdminAction::Answer(TicketId(n))),
        "unclaim" => arg.parse().ok().map(|n| AdminAction::Unclaim(TicketId(n))),
        "ban" => arg.parse().ok().map(|n| AdminAction::Ban(UserId(n))),
        _ => None,
    }
}

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();
    let sender = q.from.id.0 as i64;
    let chat = q
        .message
        .as_ref()
        .map(|m| ChatId(m.chat.id.0))
        .unwrap_or(ChatId(sender));

    if let Some(action) = data.strip_prefix("u:") {
        handle_user_action(&state, &cb_id, chat, UserId(sender), action).await;
        return Ok(());
    }

    if let Some(action) = data.strip_prefix("a:") {
        if !state.cfg.is_admin(sender) {
            let _ = state
                .messenger
                .answer_callback_query(&cb_id, Some("You are not allowed to do that."))
                .await;
            return Ok(());
        }

        match parse_admin_action(action) {
            Some(action) => {
                handle_admin_action(&state, &cb_id, chat, AdminId(sender), action).await
            }
            None => {
                let _ = state
                    .messenger
                    .answer_callback_query(&cb_id, Some("Unknown action."))
                    .await;
            }
        }
        return Ok(());
    }

    let _ = state.messenger.answer_callback_query(&cb_id, None).await;
    Ok(())
}

async fn handle_user_action(
    state: &AppState,
    cb_id: &str,
    chat: ChatId,
    user: UserId,
    action: &str,
) {
    let _ = state.messenger.answer_callback_query(cb_id, None).await;

    match action {
        "ask" => {
            let _ = state
                .messenger
                .send_html(chat, "✉️ Just type your question and send it.")
                .await;
        }
        "history" => {
            let tickets = match state
                .tickets
                .list_for_user(user, state.cfg.ticket_list_limit)
                .await
            {
                Ok(tickets) => tickets,
                Err(e) => {
                    tracing::error!("history query failed: {e}");
                    return;
                }
            };

            if tickets.is_empty() {
                let _ = state
                    .messenger
                    .send_html(chat, "🕓 You have not asked anything yet.")
                    .await;
                return;
            }

            let mut html = String::from("🕓 <b>Your questions</b>\n");
            for t in &tickets {
                html.push_str(&format!(
                    "\n<b>{}</b> {}\n{}\n",
                    t.id,
                    t.status.label(),
                    escape_html(&t.question),
                ));
                if let Some(answer) = &t.answer {
                    html.push_str(&format!("💡 {}\n", escape_html(answer)));
                }
            }
            let _ = state.messenger.send_html(chat, &html).await;
        }
        "menu" => {
            let _ = state
                .messenger
                .send_inline_keyboard(chat, "🏠 Menu", keyboards::user_menu())
                .await;
        }
        "info" => {
            let _ = state
                .messenger
                .send_html(
                    chat,
                    "ℹ️ This bot forwards your questions to our support team. \
                     Answers arrive right here, usually within a day.",
                )
                .await;
        }
        "contact" => {
            let _ = state
                .messenger
                .send_html(
                    chat,
                    "📞 For urgent matters, mention it in your question and an \
                     admin will prioritize it.",
                )
                .await;
        }
        _ => {}
    }
}

async fn handle_admin_action(
    state: &AppState,
    cb_id: &str,
    chat: ChatId,
    admin: AdminId,
    action: AdminAction,
) {
    match action {
        AdminAction::Panel => {
            state.sessions.clear(admin).await;
            let _ = state.messenger.answer_callback_query(cb_id, None).await;
            let _ = state
                .messenger
                .send_inline_keyboard(chat, "🛠 <b>Admin panel</b>", keyboards::admin_panel())
                .await;
        }

        AdminAction::Stats => {
            let _ = state.messenger.answer_callback_query(cb_id, None).await;
            send_stats(state, chat).await;
        }

        AdminAction::FilterMenu => {
            let _ = state.messenger.answer_callback_query(cb_id, None).await;
            let _ = state
                .messenger
                .send_inline_keyboard(
                    chat,
                    "🧾 Which tickets?",
                    keyboards::admin_filter_menu(),
                )
                .await;
        }

        AdminAction::List(filter) => {
            let _ = state.messenger.answer_callback_query(cb_id, None).await;
            send_ticket_list(state, chat, filter).await;
        }

        AdminAction::Broadcast => {
            state.sessions.expect_broadcast(admin).await;
            let _ = state.messenger.answer_callback_query(cb_id, None).await;
            let _ = state
                .messenger
                .send_html(chat, "📢 Send the message to broadcast to all users.")
                .await;
        }

        AdminAction::Claim(ticket_id) => {
            claim(state, cb_id, chat, admin, ticket_id).await;
        }

        AdminAction::Answer(ticket_id) => {
            arm_answer(state, cb_id, chat, admin, ticket_id).await;
        }

        AdminAction::Unclaim(ticket_id) => {
            let toast = match state.coordinator.unclaim(ticket_id, admin).await {
                Ok(_) => format!("♻️ Ticket {ticket_id} released."),
                Err(Error::NotClaimedByYou(_)) => {
                    format!("Ticket {ticket_id} is not claimed by you.")
                }
                Err(Error::TicketNotFound(_)) => "Ticket not found.".to_string(),
                Err(e) => {
                    tracing::error!("unclaim failed: {e}");
                    "Something went wrong, try again.".to_string()
                }
            };
            state.sessions.clear(admin).await;
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some(&toast))
                .await;
        }

        AdminAction::Ban(user_id) => {
            ban(state, cb_id, chat, user_id).await;
        }
    }
}

async fn claim(state: &AppState, cb_id: &str, chat: ChatId, admin: AdminId, ticket_id: TicketId) {
    match state.coordinator.claim(ticket_id, admin).await {
        Ok(ticket) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some(&format!("✍️ Ticket {ticket_id} is yours.")))
                .await;

            let asker = state
                .directory
                .get(ticket.user_id)
                .await
                .map(|u| u.label())
                .unwrap_or_else(|_| ticket.user_id.to_string());
            let html = format!(
                "✍️ <b>Ticket {} claimed</b>\n\n👤 {}\n\n{}",
                ticket.id,
                escape_html(&asker),
                escape_html(&ticket.question),
            );
            let _ = state
                .messenger
                .send_inline_keyboard(chat, &html, keyboards::claimed_actions(ticket.id))
                .await;
        }
        Err(Error::AlreadyClaimed { by, .. }) => {
            let toast = if by == admin {
                format!("Ticket {ticket_id} is already yours.")
            } else {
                format!("Ticket {ticket_id} is already claimed by admin {by}.")
            };
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some(&toast))
                .await;
        }
        Err(Error::AlreadyAnswered(_)) => {
            let _ = state
                .messenger
                .answer_callback_query(
                    cb_id,
                    Some(&format!("Ticket {ticket_id} is already answered.")),
                )
                .await;
        }
        Err(Error::TicketNotFound(_)) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Ticket not found."))
                .await;
        }
        Err(e) => {
            tracing::error!("claim failed: {e}");
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Something went wrong, try again."))
                .await;
        }
    }
}

async fn arm_answer(
    state: &AppState,
    cb_id: &str,
    chat: ChatId,
    admin: AdminId,
    ticket_id: TicketId,
) {
    // The coordinator re-validates on submit; this check only gives the admin
    // an early, accurate prompt.
    let ticket = match state.tickets.get(ticket_id).await {
        Ok(t) => t,
        Err(_) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Ticket not found."))
                .await;
            return;
        }
    };

    if ticket.status != TicketStatus::InProgress || ticket.claimed_by != Some(admin) {
        let _ = state
            .messenger
            .answer_callback_query(
                cb_id,
                Some(&format!("Claim ticket {ticket_id} first, then answer.")),
            )
            .await;
        return;
    }

    state.sessions.expect_answer(admin, ticket_id).await;
    let _ = state.messenger.answer_callback_query(cb_id, None).await;
    let _ = state
        .messenger
        .send_html(
            chat,
            &format!(
                "❓ <b>Ticket {}</b>\n{}\n\nSend your answer as a message.",
                ticket.id,
                escape_html(&ticket.question),
            ),
        )
        .await;
}

async fn ban(state: &AppState, cb_id: &str, chat: ChatId, user_id: UserId) {
    match state.directory.set_banned(user_id, true).await {
        Ok(user) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("⛔ User banned."))
                .await;
            let _ = state
                .messenger
                .send_html(
                    chat,
                    &format!("⛔ Banned {} (id {user_id}).", escape_html(&user.label())),
                )
                .await;
            // Best-effort notice; a user who already blocked the bot stays silent.
            let _ = state
                .messenger
                .notify(
                    user_id.chat(),
                    "⚠️ An admin has blocked your profile. If you believe this is a \
                     mistake, contact the team another way.",
                    None,
                )
                .await;
        }
        Err(Error::UserNotFound(_)) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("User not found."))
                .await;
        }
        Err(e) => {
            tracing::error!("ban failed: {e}");
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Something went wrong, try again."))
                .await;
        }
    }
}
