use std::path::Path;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

use intake_bot::config::Config;
use intake_bot::intake::{detect, IntakeController, Locale, ResponseComposer};
use intake_bot::report::ErrorReporter;
use intake_bot::store::{self, StoreErrorKind};
use intake_bot::telegram::TelegramClient;
use intake_bot::telegram_log::TelegramLogLayer;

const DEFAULT_CONFIG_PATH: &str = "intake.json";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Commands:")]
enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "list every saved question")]
    GetQuestions,
}

struct BotState {
    controller: IntakeController,
    telegram: TelegramClient,
}

fn load_config() -> (Config, String) {
    let result = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).map(|c| (c, path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).map(|c| (c, DEFAULT_CONFIG_PATH.to_string()))
        }
        None => Config::from_env().map(|c| (c, "environment".to_string())),
    };
    match result {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let (config, source) = load_config();

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("intake.log"))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("❌ Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(TelegramLogLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🤖 Starting intake bot...");
    info!("Loaded config from {source}");

    let store = match store::open(&config.storage) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open question store: {e}");
            std::process::exit(1);
        }
    };
    match store.initialize().await {
        Ok(()) => info!("Question store ready: {}", store.describe()),
        Err(e) if e.kind == StoreErrorKind::Unavailable => {
            warn!("Question store not reachable yet ({}), continuing: {e}", store.describe());
        }
        Err(e) => {
            error!("Failed to initialize {}: {e}", store.describe());
            std::process::exit(1);
        }
    }

    let controller = IntakeController::new(
        store,
        ResponseComposer::new(config.trigger_image.clone()),
        Arc::new(ErrorReporter::new()),
        config.timezone,
    );
    let state = Arc::new(BotState {
        controller,
        telegram: TelegramClient::new(bot.clone()),
    });

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let handler = Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
        .branch(dptree::endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Locale for commands, whose text carries no language signal.
fn command_locale(msg: &Message) -> Locale {
    msg.from
        .as_ref()
        .and_then(|u| Locale::from_language_code(u.language_code.as_deref()))
        .unwrap_or_else(|| detect(msg.text().unwrap_or("")))
}

async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let locale = command_locale(&msg);

    let result = match cmd {
        Command::Start => {
            let reply = state.controller.greet(locale);
            state.telegram.send_reply(chat_id, &reply, None).await
        }
        Command::GetQuestions => {
            info!("📋 Question dump requested in chat {chat_id}");
            let chunks = state.controller.handle_dump(locale).await;
            state.telegram.send_chunks(chat_id, &chunks).await
        }
    };

    if let Err(e) = result {
        state.controller.reporter().transport(chat_id, &e);
    }
    Ok(())
}

async fn handle_text(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    // Unknown commands get no reply.
    if text.starts_with('/') {
        debug!("Ignoring unknown command {text:?}");
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    let (sender_id, sender_name) = match msg.from {
        Some(ref user) => (user.id.0 as i64, Some(user.first_name.as_str())),
        None => (chat_id, None),
    };

    let reply = state.controller.handle(sender_id, sender_name, text).await;

    if let Err(e) = state.telegram.send_reply(chat_id, &reply, Some(msg.id.0)).await {
        state.controller.reporter().transport(chat_id, &e);
    }
    Ok(())
}
