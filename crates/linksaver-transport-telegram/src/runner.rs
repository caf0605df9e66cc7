use crate::bot;
use crate::bot::handlers::Command;
use crate::bot::TelegramGateway;
use crate::config::BotSettings;
use linksaver_core::link::{parse_message_link, MessageLink};
use linksaver_core::RelayController;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let shutdown = CancellationToken::new();
    let controller = init_controller(&bot, &settings, shutdown.clone());
    info!(channel = %controller.channel(), "Relay controller initialized.");

    let signal = spawn_shutdown_signal(shutdown.clone());
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![controller])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    signal.abort();
    info!("Bot stopped.");
}

fn init_controller(
    bot: &Bot,
    settings: &BotSettings,
    shutdown: CancellationToken,
) -> Arc<RelayController> {
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let store = Arc::new(settings.relay.store());

    match RelayController::new(settings.relay.as_ref(), gateway, store, shutdown) {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            error!("Failed to initialize relay controller: {}", e);
            std::process::exit(1);
        }
    }
}

/// Cancel in-flight requests as soon as Ctrl-C arrives, before the dispatcher drains.
fn spawn_shutdown_signal(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, cancelling in-flight requests.");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for the shutdown signal: {}", e),
        }
    })
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter_map(|msg: Message| msg.text().and_then(parse_message_link))
                        .endpoint(handle_link),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some())
                        .endpoint(handle_text),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    controller: Arc<RelayController>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(msg, controller).await,
        Command::Help => bot::handlers::help(bot, msg, controller).await,
        Command::Healthcheck => bot::handlers::healthcheck(bot, msg).await,
        Command::Stats => bot::handlers::stats(bot, msg, controller).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_link(
    msg: Message,
    link: MessageLink,
    controller: Arc<RelayController>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_link(msg, link, controller).await {
        error!("Link handler error: {}", e);
    }
    respond(())
}

async fn handle_text(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(bot, msg).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    q: CallbackQuery,
    controller: Arc<RelayController>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_callback(q, controller).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}
