use std::sync::Arc;

use teloxide::prelude::*;

use stb_core::{
    broadcast::{BroadcastProgress, BroadcastReport},
    domain::{AdminId, ChatId, TicketId},
    errors::Error,
    formatting::{ellipsize, escape_html},
    messaging::{port::MessagingPort, types::DeliveryOutcome},
    sessions::Awaiting,
};

use crate::keyboards;
use crate::router::AppState;

use super::profile_from;

/// How much of the question/answer is quoted in the peer-admin notice.
const PEER_NOTICE_CHARS: usize = 100;

pub async fn handle_text(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let chat = ChatId(msg.chat.id.0);
    let sender = from.id.0 as i64;
    let text = msg.text().unwrap_or_default();

    if state.cfg.is_admin(sender) {
        let admin = AdminId(sender);
        match state.sessions.take(admin).await {
            Awaiting::Answer(ticket_id) => {
                deliver_answer(&state, chat, admin, ticket_id, text).await;
            }
            Awaiting::Broadcast => {
                run_broadcast(&state, chat, text).await;
            }
            Awaiting::Nothing => {
                let _ = state
                    .messenger
                    .send_inline_keyboard(
                        chat,
                        "Pick an action first. Claim a ticket to answer it, or use \
                         the panel below.",
                        keyboards::admin_panel(),
                    )
                    .await;
            }
        }
        return Ok(());
    }

    submit_question(&state, chat, from, text).await;
    Ok(())
}

async fn submit_question(
    state: &AppState,
    chat: ChatId,
    from: &teloxide::types::User,
    text: &str,
) {
    match state.intake.submit(profile_from(from), text).await {
        Ok(ticket) => {
            let _ = state
                .messenger
                .send_html(
                    chat,
                    &format!(
                        "✅ Got it! Your question is registered as <b>{}</b>. \
                         An admin will answer you right here.",
                        ticket.id,
                    ),
                )
                .await;
        }
        Err(Error::Banned(_)) => {
            let _ = state
                .messenger
                .send_html(chat, "⛔ You are blocked from using this bot.")
                .await;
        }
        Err(Error::InvalidInput(_)) => {
            let _ = state
                .messenger
                .send_html(chat, "Please send your question as a non-empty message.")
                .await;
        }
        Err(e) => {
            tracing::error!("question intake failed: {e}");
            let _ = state
                .messenger
                .send_html(chat, "❌ Something went wrong, please try again.")
                .await;
        }
    }
}

async fn deliver_answer(
    state: &AppState,
    chat: ChatId,
    admin: AdminId,
    ticket_id: TicketId,
    text: &str,
) {
    let ticket = match state.coordinator.answer(ticket_id, admin, text).await {
        Ok(ticket) => ticket,
        Err(Error::NotClaimedByYou(_)) => {
            let _ = state
                .messenger
                .send_html(
                    chat,
                    &format!("Ticket {ticket_id} is no longer claimed by you."),
                )
                .await;
            return;
        }
        Err(Error::AlreadyAnswered(_)) => {
            let _ = state
                .messenger
                .send_html(chat, &format!("Ticket {ticket_id} was already answered."))
                .await;
            return;
        }
        Err(Error::TicketNotFound(_)) => {
            let _ = state
                .messenger
                .send_html(chat, "Ticket not found.")
                .await;
            return;
        }
        Err(Error::InvalidInput(_)) => {
            // Re-arm so the admin can try again without re-clicking.
            state.sessions.expect_answer(admin, ticket_id).await;
            let _ = state
                .messenger
                .send_html(chat, "The answer must not be empty. Send it again.")
                .await;
            return;
        }
        Err(e) => {
            tracing::error!("answer failed: {e}");
            let _ = state
                .messenger
                .send_html(chat, "❌ Something went wrong, please try again.")
                .await;
            return;
        }
    };

    let answer = ticket.answer.as_deref().unwrap_or_default();
    let html = format!(
        "💡 <b>Your question {} was answered</b>\n\n❓ {}\n\n💡 {}",
        ticket.id,
        escape_html(&ticket.question),
        escape_html(answer),
    );

    let delivery = state
        .messenger
        .notify(
            ticket.user_id.chat(),
            &html,
            Some(keyboards::after_answer_menu()),
        )
        .await;

    let confirm = match delivery {
        Ok(DeliveryOutcome::Delivered) => {
            format!("✅ Ticket {} answered and delivered.", ticket.id)
        }
        Ok(outcome) => {
            tracing::warn!(ticket = %ticket.id, ?outcome, "answer not delivered");
            format!(
                "✅ Ticket {} answered, but the user could not be reached. \
                 The answer is stored in their history.",
                ticket.id,
            )
        }
        Err(e) => {
            tracing::warn!(ticket = %ticket.id, "answer delivery failed: {e}");
            format!(
                "✅ Ticket {} answered, but delivery failed. \
                 The answer is stored in their history.",
                ticket.id,
            )
        }
    };
    let _ = state.messenger.send_html(chat, &confirm).await;

    notify_peer_admins(state, admin, &ticket, answer).await;
}

/// Tell the rest of the admin pool the ticket is handled.
async fn notify_peer_admins(
    state: &AppState,
    answered_by: AdminId,
    ticket: &stb_core::store::Ticket,
    answer: &str,
) {
    let notice = format!(
        "ℹ️ Admin {answered_by} answered ticket {}\n\n👤 User: {}\n❓ {}\n💡 {}",
        ticket.id,
        ticket.user_id,
        escape_html(&ellipsize(&ticket.question, PEER_NOTICE_CHARS)),
        escape_html(&ellipsize(answer, PEER_NOTICE_CHARS)),
    );
    for &id in &state.cfg.admin_ids {
        if id == answered_by.0 {
            continue;
        }
        let _ = state
            .messenger
            .notify(AdminId(id).chat(), &notice, None)
            .await;
    }
}

async fn run_broadcast(state: &AppState, chat: ChatId, text: &str) {
    let html = escape_html(text.trim());
    if html.is_empty() {
        let _ = state
            .messenger
            .send_html(chat, "The broadcast message must not be empty.")
            .await;
        return;
    }

    let status = state
        .messenger
        .send_html(chat, "📢 Broadcast started…")
        .await
        .ok();

    // Progress arrives from a sync callback inside the fan-out loop; edits go
    // through a channel so the loop never waits on the status message.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BroadcastProgress>();
    let editor = status.map(|msg| {
        let messenger = state.messenger.clone();
        tokio::spawn(async move {
            while let Some(p) = rx.recv().await {
                let _ = messenger.edit_html(msg, &progress_html(&p)).await;
            }
        })
    });

    let result = state
        .broadcast
        .send_with_progress(&html, &mut |p| {
            let _ = tx.send(p);
        })
        .await;
    drop(tx);
    if let Some(editor) = editor {
        let _ = editor.await;
    }

    match result {
        Ok(report) => {
            let _ = state.messenger.send_html(chat, &report_html(&report)).await;
        }
        Err(e) => {
            tracing::error!("broadcast failed: {e}");
            let _ = state
                .messenger
                .send_html(chat, "❌ Broadcast failed before any message was sent.")
                .await;
        }
    }
}

fn progress_html(p: &BroadcastProgress) -> String {
    format!(
        "📢 Broadcasting… {}/{}\n✅ {}  ❌ {}",
        p.attempted, p.total, p.success, p.failure,
    )
}

fn report_html(r: &BroadcastReport) -> String {
    format!(
        "📢 <b>Broadcast finished</b>\n\n👥 Recipients: {}\n✅ Delivered: {}\n❌ Failed: {}",
        r.total, r.success, r.failure,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_and_report_render_the_accounting() {
        let p = BroadcastProgress {
            attempted: 10,
            total: 25,
            success: 9,
            failure: 1,
        };
        assert_eq!(progress_html(&p), "📢 Broadcasting… 10/25\n✅ 9  ❌ 1");

        let r = BroadcastReport {
            total: 25,
            success: 23,
            failure: 2,
        };
        let html = report_html(&r);
        assert!(html.contains("Recipients: 25"));
        assert!(html.contains("Delivered: 23"));
        assert!(html.contains("Failed: 2"));
    }
}
