use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use voxmate::assistant::database::ChatEntry;
use voxmate::assistant::tasks::deployment_offset;
use voxmate::assistant::{
    AssistantEngine, Database, EngineConfig, IncomingMessage, Scheduler, TelegramClient, TtsClient, Whisper,
};
use voxmate::config::Config;
use voxmate::openai::Client as OpenAiClient;
use voxmate::telegram_log::TelegramLogLayer;

struct BotState {
    config: Config,
    engine: AssistantEngine,
}

fn init_logging(config: &Config, bot: &Bot) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("voxmate.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

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
        registry
            .with(TelegramLogLayer::new(bot.clone(), log_chat_id, env!("CARGO_CRATE_NAME")))
            .init();
    } else {
        registry.init();
    }
    guard
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "voxmate.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);
    let _log_guard = init_logging(&config, &bot);

    info!("Starting voxmate...");
    info!("Loaded config from {config_path}");
    info!("Owner IDs: {:?}", config.owner_ids);

    let database = match Database::open(&config.data_dir.join("voxmate.db")) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let whisper = config.whisper_model_path.as_ref().and_then(|path| {
        match Whisper::new(path, config.whisper_language.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Voice input disabled: {e}");
                None
            }
        }
    });
    let tts = config.voice_replies.then(|| {
        TtsClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.tts_voice.clone(),
        )
    });

    let offset = deployment_offset(config.utc_offset_hours);
    let telegram = Arc::new(TelegramClient::new(bot.clone()));

    Scheduler::new(
        database.clone(),
        telegram.clone(),
        Duration::from_secs(config.poll_interval_secs),
        offset,
    )
    .spawn();

    let engine = AssistantEngine::new(
        EngineConfig {
            owner_name: config.owner_name.clone(),
            alert_chat_id: config.primary_owner().0 as i64,
            voice_replies: config.voice_replies,
            offset,
        },
        database,
        telegram,
        OpenAiClient::new(config.openai_api_key.clone(), config.openai_base_url.clone()),
        tts,
        whisper,
    );

    let state = Arc::new(BotState { config, engine });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Ok(());
    }
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    if !state.config.is_owner(user.id) {
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let name = user.full_name();
        state
            .engine
            .handle_incoming(IncomingMessage {
                chat: ChatEntry { chat_id: msg.chat.id.0, name, is_bot: user.is_bot },
                text: text.to_string(),
            })
            .await;
        return Ok(());
    }

    if let Some(voice) = msg.voice() {
        info!("Voice note from owner {}", user_id);
        state.engine.handle_voice(user_id, &voice.file.id.0).await;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    match text.split_whitespace().next() {
        Some("/start") => state.engine.greet(user_id).await,
        Some("/tasks") => state.engine.list_tasks(user_id).await,
        _ => state.engine.handle_text(user_id, text).await,
    }

    Ok(())
}
