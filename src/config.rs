use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::{ChatId, UserId};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    owner_ids: Vec<u64>,
    telegram_bot_token: String,
    #[serde(default)]
    openai_api_key: String,
    /// Base URL for chat completions and speech. Defaults to the public OpenAI API.
    openai_base_url: Option<String>,
    /// How the assistant addresses the owner in conversation.
    owner_name: Option<String>,
    log_chat_id: Option<i64>,
    /// Directory for state files (logs, database). Defaults to current directory.
    data_dir: Option<String>,
    /// Path to Whisper model file (.bin) for voice transcription.
    whisper_model_path: Option<String>,
    /// Whisper language code ("ru", "en", ...). Auto-detect when unset.
    whisper_language: Option<String>,
    /// Voice name passed to the speech endpoint.
    tts_voice: Option<String>,
    #[serde(default = "default_true")]
    voice_replies: bool,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
    #[serde(default = "default_utc_offset")]
    utc_offset_hours: i32,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60
}

fn default_utc_offset() -> i32 {
    3
}

pub struct Config {
    /// Owner IDs - first ID is the primary owner (receives incoming-message alerts).
    pub owner_ids: Vec<UserId>,
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub owner_name: Option<String>,
    pub log_chat_id: Option<ChatId>,
    pub data_dir: PathBuf,
    pub whisper_model_path: Option<PathBuf>,
    pub whisper_language: Option<String>,
    pub tts_voice: String,
    /// Send every assistant reply as a voice note as well as text.
    pub voice_replies: bool,
    /// Seconds between scheduler scans.
    pub poll_interval_secs: u64,
    /// Fixed offset added to UTC for task due times.
    pub utc_offset_hours: i32,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.owner_ids.is_empty() {
            return Err(ConfigError::Validation("owner_ids must contain at least one owner ID".into()));
        }
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.openai_api_key.is_empty() {
            return Err(ConfigError::Validation("openai_api_key is required".into()));
        }
        if file.poll_interval_secs == 0 {
            return Err(ConfigError::Validation("poll_interval_secs must be greater than zero".into()));
        }
        if !(-14..=14).contains(&file.utc_offset_hours) {
            return Err(ConfigError::Validation(format!(
                "utc_offset_hours must be between -14 and 14, got {}",
                file.utc_offset_hours
            )));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let openai_base_url = file
            .openai_base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            owner_ids: file.owner_ids.into_iter().map(UserId).collect(),
            telegram_bot_token: file.telegram_bot_token,
            openai_api_key: file.openai_api_key,
            openai_base_url,
            owner_name: file.owner_name.filter(|n| !n.trim().is_empty()),
            log_chat_id: file.log_chat_id.map(ChatId),
            data_dir,
            whisper_model_path: file.whisper_model_path.map(PathBuf::from),
            whisper_language: file.whisper_language,
            tts_voice: file.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            voice_replies: file.voice_replies,
            poll_interval_secs: file.poll_interval_secs,
            utc_offset_hours: file.utc_offset_hours,
        })
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_ids.contains(&user_id)
    }

    /// The owner who receives alerts about incoming messages.
    pub fn primary_owner(&self) -> UserId {
        self.owner_ids[0]
    }
}
