use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use stb_core::{
    broadcast::{BroadcastConfig, BroadcastDispatcher},
    claim::ClaimCoordinator,
    config::Config,
    domain::AdminId,
    intake::IntakeService,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    sessions::AdminSessions,
    store::{TicketStore, UserDirectory},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub tickets: Arc<dyn TicketStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub coordinator: Arc<ClaimCoordinator>,
    pub intake: Arc<IntakeService>,
    pub broadcast: Arc<BroadcastDispatcher>,
    pub sessions: Arc<AdminSessions>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    tickets: Arc<dyn TicketStore>,
    directory: Arc<dyn UserDirectory>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!("support bot started: @{}", me.username());
    }
    tracing::info!(admins = cfg.admin_ids.len(), store = %cfg.store_path.display(), "configuration loaded");

    // Raw messenger wrapped in a pacing decorator: question alerts fan out to
    // every admin and broadcasts to every user, and Telegram flood-limits both.
    let raw: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(raw, ThrottleConfig::default()));

    let admins: Vec<AdminId> = cfg.admin_ids.iter().map(|&id| AdminId(id)).collect();

    let coordinator = Arc::new(ClaimCoordinator::new(tickets.clone()));
    let intake = Arc::new(IntakeService::new(
        tickets.clone(),
        directory.clone(),
        messenger.clone(),
        admins.clone(),
    ));
    let broadcast = Arc::new(BroadcastDispatcher::new(
        directory.clone(),
        messenger.clone(),
        BroadcastConfig {
            per_recipient_delay: cfg.broadcast_delay,
            progress_every: cfg.broadcast_progress_every,
        },
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        tickets,
        directory,
        coordinator,
        intake,
        broadcast,
        sessions: Arc::new(AdminSessions::new()),
        messenger: messenger.clone(),
    });

    // Startup notice to every admin (best-effort).
    {
        let messenger = messenger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            for admin in admins {
                let _ = messenger
                    .notify(
                        admin.chat(),
                        "🤖 Support bot is up. You are registered as an admin; /help lists the commands.",
                        None,
                    )
                    .await;
            }
        });
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
