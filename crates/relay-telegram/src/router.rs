use std::sync::Arc;

use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    types::AllowedUpdate, update_listeners::Polling,
};
use tracing::{error, info};

use relay_core::{
    config::Config,
    messaging::{port::DeliveryPort, throttled::ThrottledDelivery},
    relay::{Relay, RelayOptions},
    store::Store,
    sweeper::AutoDeleteSweeper,
};

use crate::handlers;
use crate::TelegramDelivery;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn delivery(&self) -> &dyn DeliveryPort {
        self.relay.delivery()
    }

    pub fn store(&self) -> &dyn Store {
        self.relay.store()
    }
}

/// Updates the relay subscribes to. Reactions are not delivered unless asked
/// for explicitly.
const ALLOWED_UPDATES: [AllowedUpdate; 6] = [
    AllowedUpdate::Message,
    AllowedUpdate::EditedMessage,
    AllowedUpdate::CallbackQuery,
    AllowedUpdate::MessageReaction,
    AllowedUpdate::MyChatMember,
    AllowedUpdate::PurchasedPaidMedia,
];

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "relay started"),
        Err(e) => error!("get_me failed: {e}"),
    }

    // Fan-out is a burst of sends; pace them so one message to a large
    // audience does not trip flood control.
    let raw: Arc<dyn DeliveryPort> = Arc::new(TelegramDelivery::new(bot.clone()));
    let delivery: Arc<dyn DeliveryPort> = Arc::new(ThrottledDelivery::new(raw, cfg.throttle()));

    let relay = Arc::new(Relay::new(
        store.clone(),
        delivery.clone(),
        RelayOptions {
            default_cooldown: cfg.send_cooldown,
            poll_channel: cfg.poll_channel_id,
        },
    ));
    relay.bootstrap(cfg.creator_id).await?;

    let sweeper = AutoDeleteSweeper::new(store, delivery, cfg.autodel_sweep_interval);
    sweeper.start().await;

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        relay,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited))
        .branch(Update::filter_message_reaction_updated().endpoint(handlers::handle_reaction))
        .branch(Update::filter_my_chat_member().endpoint(handlers::handle_membership))
        .branch(Update::filter_purchased_paid_media().endpoint(handlers::handle_purchase))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let listener = Polling::builder(bot.clone())
        .allowed_updates(ALLOWED_UPDATES.to_vec())
        .build();

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener error"),
        )
        .await;

    sweeper.stop().await;
    info!("relay stopped");
    Ok(())
}
