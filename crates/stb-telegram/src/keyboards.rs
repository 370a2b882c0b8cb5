//! Inline keyboard layouts and their callback-data scheme.
//!
//! Callback data is namespaced: `u:` for end-user menu actions, `a:` for
//! admin actions. Parameterized actions append the target id
//! (`a:claim:17`, `a:ban:12345`).

use stb_core::{
    domain::TicketId,
    messaging::types::{InlineButton, InlineKeyboard},
};

pub fn user_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![InlineButton::new("✉️ Ask a question", "u:ask")],
        vec![InlineButton::new("🕓 My questions", "u:history")],
        vec![
            InlineButton::new("ℹ️ Info", "u:info"),
            InlineButton::new("📞 Contact", "u:contact"),
        ],
    ])
}

pub fn after_answer_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![InlineButton::new("✉️ Ask another question", "u:ask")],
        vec![
            InlineButton::new("🕓 My questions", "u:history"),
            InlineButton::new("🏠 Menu", "u:menu"),
        ],
    ])
}

pub fn admin_panel() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![InlineButton::new("📊 Stats", "a:stats")],
        vec![InlineButton::new("🧾 Tickets", "a:filter_menu")],
        vec![InlineButton::new("📢 Broadcast", "a:broadcast")],
    ])
}

pub fn admin_filter_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![
            InlineButton::new("🟢 Open", "a:list:open"),
            InlineButton::new("🟡 In progress", "a:list:in_progress"),
        ],
        vec![
            InlineButton::new("✅ Answered", "a:list:answered"),
            InlineButton::new("🧾 All", "a:list:all"),
        ],
        vec![InlineButton::new("⬅️ Panel", "a:panel")],
    ])
}

/// Actions offered to the claimant after a successful claim.
pub fn claimed_actions(ticket: TicketId) -> InlineKeyboard {
    InlineKeyboard::column(vec![
        InlineButton::new("✅ Write the answer", format!("a:answer:{}", ticket.0)),
        InlineButton::new("♻️ Release (unclaim)", format!("a:unclaim:{}", ticket.0)),
    ])
}

pub fn back_to_panel() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![InlineButton::new("⬅️ Back to panel", "a:panel")]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_actions_encode_the_ticket_id() {
        let kb = claimed_actions(TicketId(42));
        assert_eq!(kb.rows[0][0].callback_data, "a:answer:42");
        assert_eq!(kb.rows[1][0].callback_data, "a:unclaim:42");
    }

    #[test]
    fn filter_menu_covers_every_status() {
        let kb = admin_filter_menu();
        let data: Vec<&str> = kb
            .rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
            .collect();
        assert!(data.contains(&"a:list:open"));
        assert!(data.contains(&"a:list:in_progress"));
        assert!(data.contains(&"a:list:answered"));
        assert!(data.contains(&"a:list:all"));
    }
}
