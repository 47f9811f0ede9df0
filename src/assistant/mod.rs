//! Voice assistant: task scheduling, relay and conversation over Telegram.

pub mod audio;
pub mod database;
pub mod engine;
pub mod relay;
pub mod scheduler;
pub mod tasks;
pub mod telegram;
pub mod tts;
pub mod whisper;

pub use database::Database;
pub use engine::{AssistantEngine, EngineConfig, IncomingMessage};
pub use scheduler::{CycleReport, Notifier, Scheduler};
pub use telegram::TelegramClient;
pub use tts::TtsClient;
pub use whisper::Whisper;
