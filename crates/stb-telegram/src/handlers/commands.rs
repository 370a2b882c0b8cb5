use std::sync::Arc;

use teloxide::prelude::*;

use stb_core::{
    domain::ChatId,
    formatting::{ellipsize, escape_html},
    messaging::port::MessagingPort,
    reporting::{self, StatsSnapshot},
    store::{StatusFilter, Ticket, TicketStatus, TicketStore, UserDirectory},
};

use crate::keyboards;
use crate::router::AppState;

use super::profile_from;

/// How much of a question is quoted per line in list views.
const LIST_QUESTION_CHARS: usize = 60;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
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

pub(crate) fn parse_status_filter(arg: &str) -> Option<StatusFilter> {
    match arg {
        "open" => Some(StatusFilter::Only(TicketStatus::Open)),
        "in_progress" => Some(StatusFilter::Only(TicketStatus::InProgress)),
        "answered" => Some(StatusFilter::Only(TicketStatus::Answered)),
        "all" => Some(StatusFilter::All),
        _ => None,
    }
}

pub async fn handle_command(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let chat = ChatId(msg.chat.id.0);
    let sender = from.id.0 as i64;
    let is_admin = state.cfg.is_admin(sender);
    let (cmd, args) = parse_command(msg.text().unwrap_or_default());

    match cmd.as_str() {
        "start" => {
            // Register (or refresh) the sender either way; admins may also ask
            // questions from another account, but this one is theirs.
            let _ = state.directory.upsert(profile_from(from)).await;

            if is_admin {
                let _ = state
                    .messenger
                    .send_inline_keyboard(chat, "🛠 <b>Admin panel</b>", keyboards::admin_panel())
                    .await;
            } else {
                let _ = state
                    .messenger
                    .send_inline_keyboard(
                        chat,
                        "👋 Welcome! Send your question as a message and an admin will \
                         answer you here.",
                        keyboards::user_menu(),
                    )
                    .await;
            }
        }

        "help" => {
            let text = if is_admin {
                "Commands:\n\
                 /start — admin panel\n\
                 /stats — ticket and user counters\n\
                 /tickets [open|in_progress|answered|all] — ticket queue\n\
                 /broadcast — message all users\n\
                 /panel — admin panel"
            } else {
                "Send your question as a plain message and an admin will answer \
                 you here.\n\n/start — main menu"
            };
            let _ = state.messenger.send_html(chat, text).await;
        }

        "stats" if is_admin => {
            send_stats(&state, chat).await;
        }

        "tickets" if is_admin => {
            let filter = parse_status_filter(args.trim())
                .unwrap_or(StatusFilter::Only(TicketStatus::Open));
            send_ticket_list(&state, chat, filter).await;
        }

        "broadcast" if is_admin => {
            state
                .sessions
                .expect_broadcast(stb_core::domain::AdminId(sender))
                .await;
            let _ = state
                .messenger
                .send_html(
                    chat,
                    "📢 Send the message to broadcast to all users.",
                )
                .await;
        }

        "panel" if is_admin => {
            // A new prompt cancels whatever input was pending.
            state
                .sessions
                .clear(stb_core::domain::AdminId(sender))
                .await;
            let _ = state
                .messenger
                .send_inline_keyboard(chat, "🛠 <b>Admin panel</b>", keyboards::admin_panel())
                .await;
        }

        _ => {
            let hint = if is_admin {
                "Unknown command. /help lists the admin commands."
            } else {
                "Unknown command. Send your question as a plain message, or /start for the menu."
            };
            let _ = state.messenger.send_html(chat, hint).await;
        }
    }

    Ok(())
}

pub(crate) async fn send_stats(state: &AppState, chat: ChatId) {
    match reporting::gather(state.tickets.as_ref(), state.directory.as_ref()).await {
        Ok(stats) => {
            let _ = state
                .messenger
                .send_inline_keyboard(chat, &stats_html(&stats), keyboards::back_to_panel())
                .await;
        }
        Err(e) => {
            tracing::error!("stats query failed: {e}");
            let _ = state
                .messenger
                .send_html(chat, "❌ Could not load stats, try again.")
                .await;
        }
    }
}

fn stats_html(stats: &StatsSnapshot) -> String {
    format!(
        "📊 <b>Stats</b>\n\n\
         🟢 Open: {}\n\
         🟡 In progress: {}\n\
         ✅ Answered: {}\n\
         🧾 Total tickets: {}\n\n\
         👥 Active users: {}\n\
         ⛔ Banned users: {}",
        stats.open,
        stats.in_progress,
        stats.answered,
        stats.total_tickets,
        stats.active_users,
        stats.banned_users,
    )
}

pub(crate) async fn send_ticket_list(state: &AppState, chat: ChatId, filter: StatusFilter) {
    let tickets = match state
        .tickets
        .list(filter, state.cfg.ticket_list_limit)
        .await
    {
        Ok(tickets) => tickets,
        Err(e) => {
            tracing::error!("ticket list query failed: {e}");
            let _ = state
                .messenger
                .send_html(chat, "❌ Could not load tickets, try again.")
                .await;
            return;
        }
    };

    if tickets.is_empty() {
        let _ = state
            .messenger
            .send_inline_keyboard(chat, "🎉 Nothing here.", keyboards::admin_filter_menu())
            .await;
        return;
    }

    let body = render_ticket_lines(&tickets);
    let html = ellipsize(&body, state.cfg.safe_message_limit);
    let _ = state
        .messenger
        .send_inline_keyboard(chat, &html, keyboards::admin_filter_menu())
        .await;
}

pub(crate) fn render_ticket_lines(tickets: &[Ticket]) -> String {
    let mut out = String::from("🧾 <b>Tickets</b>\n");
    for t in tickets {
        let marker = match t.status {
            TicketStatus::Open => "🟢",
            TicketStatus::InProgress => "🟡",
            TicketStatus::Answered => "✅",
        };
        out.push_str(&format!(
            "\n{marker} <b>{}</b> {}",
            t.id,
            escape_html(&ellipsize(&t.question, LIST_QUESTION_CHARS)),
        ));
        if let Some(admin) = t.claimed_by {
            out.push_str(&format!(" — claimed by {admin}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stb_core::domain::{AdminId, TicketId, UserId};

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/tickets@support_bot  in_progress "),
            ("tickets".to_string(), "in_progress".to_string())
        );
        assert_eq!(parse_command("/start"), ("start".to_string(), String::new()));
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(
            parse_status_filter("open"),
            Some(StatusFilter::Only(TicketStatus::Open))
        );
        assert_eq!(parse_status_filter("all"), Some(StatusFilter::All));
        assert_eq!(parse_status_filter("bogus"), None);
    }

    #[test]
    fn ticket_lines_escape_and_mark_claims() {
        let tickets = vec![Ticket {
            id: TicketId(3),
            user_id: UserId(1),
            question: "<b>bold?</b>".to_string(),
            status: TicketStatus::InProgress,
            claimed_by: Some(AdminId(77)),
            answer: None,
            answered_by: None,
            created_at: Utc::now(),
            answered_at: None,
        }];

        let html = render_ticket_lines(&tickets);
        assert!(html.contains("#3"));
        assert!(html.contains("&lt;b&gt;bold?&lt;/b&gt;"));
        assert!(html.contains("claimed by 77"));
        assert!(!html.contains("<b>bold?"));
    }
}
