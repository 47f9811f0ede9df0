//! Assistant engine: routes owner messages to reminders, relay or conversation.

use std::sync::Arc;

use chrono::FixedOffset;
use tracing::{debug, error, info, warn};

use crate::assistant::database::{ChatEntry, Database, Session};
use crate::assistant::relay::{self, RelayAction};
use crate::assistant::tasks::{deployment_now, extract_task, Recurrence, Task, TIME_FORMAT};
use crate::assistant::telegram::TelegramClient;
use crate::assistant::tts::TtsClient;
use crate::assistant::whisper::Whisper;
use crate::classifier::{classify_intent, classify_read_aloud_reply, Intent, ReadAloudReply};
use crate::openai::{Client, Message, Model};

const DELETE_UNSUPPORTED: &str = "Deleting messages is not supported yet.";
const APOLOGY: &str = "Sorry, something went wrong while handling your request. Please try again.";

/// Engine settings derived from the config file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How the assistant addresses the owner.
    pub owner_name: Option<String>,
    /// Chat that receives incoming-message alerts.
    pub alert_chat_id: i64,
    pub voice_replies: bool,
    pub offset: FixedOffset,
}

/// A private message from someone other than an owner.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat: ChatEntry,
    pub text: String,
}

pub struct AssistantEngine {
    config: EngineConfig,
    database: Arc<Database>,
    telegram: Arc<TelegramClient>,
    openai: Client,
    tts: Option<TtsClient>,
    whisper: Option<Whisper>,
}

impl AssistantEngine {
    pub fn new(
        config: EngineConfig,
        database: Arc<Database>,
        telegram: Arc<TelegramClient>,
        openai: Client,
        tts: Option<TtsClient>,
        whisper: Option<Whisper>,
    ) -> Self {
        Self { config, database, telegram, openai, tts, whisper }
    }

    /// Send text, then the same text as a voice note when enabled.
    /// A failed voice note never affects the text reply.
    pub async fn reply(&self, chat_id: i64, text: &str) {
        if self.telegram.send_message(chat_id, text).await.is_err() {
            return;
        }
        if !self.config.voice_replies {
            return;
        }
        let Some(ref tts) = self.tts else {
            return;
        };
        match tts.synthesize(text).await {
            Ok(voice) => {
                let _ = self.telegram.send_voice(chat_id, voice).await;
            }
            Err(e) => warn!("TTS failed: {}", e),
        }
    }

    pub async fn greet(&self, chat_id: i64) {
        self.reply(chat_id, &greeting(self.config.owner_name.as_deref())).await;
    }

    /// Reply with the owner's pending tasks.
    pub async fn list_tasks(&self, user_id: i64) {
        let text = match self.database.list_tasks_for_user(&user_id.to_string()) {
            Ok(tasks) => format_task_list(&tasks),
            Err(e) => {
                error!("Failed to list tasks for {}: {}", user_id, e);
                APOLOGY.to_string()
            }
        };
        if let Err(e) = self.telegram.send_message(user_id, &text).await {
            warn!("Failed to send task list: {}", e);
        }
    }

    /// Handle a voice note: transcribe, echo, then treat as text.
    pub async fn handle_voice(&self, user_id: i64, file_id: &str) {
        let Some(ref whisper) = self.whisper else {
            self.reply(user_id, "Voice messages are not available: no speech model is configured.").await;
            return;
        };

        let audio = match self.telegram.download_file(file_id).await {
            Ok(audio) => audio,
            Err(e) => {
                error!("Voice download failed: {}", e);
                self.reply(user_id, APOLOGY).await;
                return;
            }
        };

        let text = match whisper.transcribe_async(audio).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                self.reply(user_id, "I couldn't make out any words in that voice message.").await;
                return;
            }
            Err(e) => {
                error!("Transcription failed: {}", e);
                self.reply(user_id, APOLOGY).await;
                return;
            }
        };

        let _ = self.telegram.send_message(user_id, &format!("You said: {text}")).await;
        self.handle_text(user_id, &text).await;
    }

    /// Handle an owner's text message.
    pub async fn handle_text(&self, user_id: i64, text: &str) {
        let identity = user_id.to_string();
        let preview: String = text.chars().take(100).collect();
        info!("Owner {}: \"{}\"", user_id, preview);

        match self.database.get_session(&identity) {
            Ok(Some(session)) if session.waiting_answer => {
                self.answer_read_aloud(user_id, &session, text).await;
                return;
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to load session for {}: {}", user_id, e),
        }

        let intent = match classify_intent(text, &self.openai).await {
            Ok(intent) => intent,
            Err(e) => {
                error!("Intent classification failed: {}", e);
                self.reply(user_id, APOLOGY).await;
                return;
            }
        };
        info!("Intent: {:?}", intent);

        let answer = match intent {
            Intent::Reminder => self.schedule_task(&identity, text).await,
            Intent::Relay => self.relay(text).await,
            Intent::Conversation => self.converse(&identity, text).await,
            Intent::SmartHome => "Smart home control is not available yet.".to_string(),
            Intent::Unsupported(label) => format!("The {} is not available yet.", label.to_lowercase()),
        };
        self.reply(user_id, &answer).await;
    }

    async fn answer_read_aloud(&self, user_id: i64, session: &Session, text: &str) {
        let identity = user_id.to_string();
        // Cleared first: an unclear answer does not keep the question open.
        if let Err(e) = self.database.set_session(&identity, &Session::default()) {
            warn!("Failed to clear session for {}: {}", user_id, e);
        }

        let answer = match classify_read_aloud_reply(text, &self.openai).await {
            Ok(ReadAloudReply::ReadAloud) => {
                format!("{} wrote to you: {}", session.incoming_from, session.incoming_text)
            }
            Ok(ReadAloudReply::Skip) => "Okay, I won't read it. What else can I help with?".to_string(),
            Ok(ReadAloudReply::Unclear) => "Sorry, I couldn't understand your answer.".to_string(),
            Err(e) => {
                error!("Read-aloud classification failed: {}", e);
                "Something went wrong while processing your answer. Please try again.".to_string()
            }
        };
        self.reply(user_id, &answer).await;
    }

    async fn schedule_task(&self, identity: &str, text: &str) -> String {
        let now = deployment_now(self.config.offset);
        let draft = match extract_task(&self.openai, text, now, self.config.offset).await {
            Ok(draft) => draft,
            Err(e) => {
                info!("Task not scheduled: {}", e);
                return e.user_message().to_string();
            }
        };

        match self.database.add_task(identity, &draft) {
            Ok(_) => task_added(&draft.text, &draft.due_at.format(TIME_FORMAT).to_string(), draft.recurrence),
            Err(e) => {
                error!("Failed to store task: {}", e);
                APOLOGY.to_string()
            }
        }
    }

    async fn relay(&self, text: &str) -> String {
        let now = deployment_now(self.config.offset);
        let action = match relay::extract_action(&self.openai, text, now).await {
            Ok(action) => action,
            Err(e) => {
                info!("Relay request incomplete: {}", e);
                return e.user_message();
            }
        };
        info!("Relay action: {:?}", action);

        // Sending only goes to people; reading may use any chat.
        let include_bots = match action {
            RelayAction::Send { .. } => false,
            RelayAction::Read { .. } => true,
            RelayAction::Delete { .. } => return DELETE_UNSUPPORTED.to_string(),
        };
        let chats = match self.database.list_chats(include_bots) {
            Ok(chats) => chats,
            Err(e) => {
                error!("Failed to load chat directory: {}", e);
                return APOLOGY.to_string();
            }
        };

        let chat = match relay::find_chat(&self.openai, &chats, action.recipient()).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                return format!("I couldn't find a chat named '{}'. Please try again.", action.recipient());
            }
            Err(e) => {
                error!("Chat lookup failed: {}", e);
                return APOLOGY.to_string();
            }
        };

        match action {
            RelayAction::Send { content, .. } => match self.telegram.send_message(chat.chat_id, &content).await {
                Ok(_) => format!("Message to {} sent successfully!", chat.name),
                Err(_) => "The message was not sent. Please try again!".to_string(),
            },
            RelayAction::Read { count, .. } => match self.database.recent_messages(chat.chat_id, count) {
                Ok(messages) => format_read_result(&chat.name, messages),
                Err(e) => {
                    error!("Failed to read messages from {}: {}", chat.chat_id, e);
                    APOLOGY.to_string()
                }
            },
            RelayAction::Delete { .. } => DELETE_UNSUPPORTED.to_string(),
        }
    }

    async fn converse(&self, identity: &str, text: &str) -> String {
        let history = self.database.get_history(identity).unwrap_or_else(|e| {
            warn!("Failed to load history for {}: {}", identity, e);
            Vec::new()
        });
        let messages = conversation_messages(self.config.owner_name.as_deref(), &history, text);
        debug!("Conversation with {} prior replies", history.len());

        match self.openai.complete(Model::Full, &messages).await {
            Ok(answer) => {
                if let Err(e) = self.database.push_history(identity, &answer) {
                    warn!("Failed to save history for {}: {}", identity, e);
                }
                answer
            }
            Err(e) => {
                error!("Conversation failed: {}", e);
                APOLOGY.to_string()
            }
        }
    }

    /// Record a non-owner private message and ask the owner whether to read it.
    pub async fn handle_incoming(&self, incoming: IncomingMessage) {
        let seen_at = deployment_now(self.config.offset).format(TIME_FORMAT).to_string();
        if let Err(e) = self.database.record_chat(&incoming.chat, &seen_at) {
            warn!("Failed to record chat {}: {}", incoming.chat.chat_id, e);
        }
        if let Err(e) = self.database.record_message(
            incoming.chat.chat_id,
            &incoming.chat.name,
            &incoming.text,
            &seen_at,
        ) {
            warn!("Failed to record message from {}: {}", incoming.chat.chat_id, e);
        }

        if incoming.chat.is_bot {
            return;
        }

        let owner = self.config.alert_chat_id;
        let session = Session {
            waiting_answer: true,
            incoming_text: incoming.text,
            incoming_from: incoming.chat.name.clone(),
        };
        if let Err(e) = self.database.set_session(&owner.to_string(), &session) {
            error!("Failed to save pending message for {}: {}", owner, e);
            return;
        }

        info!("Incoming message from {} ({})", incoming.chat.name, incoming.chat.chat_id);
        self.reply(owner, &incoming_alert(&incoming.chat.name)).await;
    }
}

fn greeting(owner_name: Option<&str>) -> String {
    let name = owner_name.map(|n| format!(", {n}")).unwrap_or_default();
    format!(
        "Hello{name}! I'm your voice assistant. Tell me what to remind you about, \
         ask me to message someone, or just talk to me. Send /tasks to see your reminders."
    )
}

fn task_added(text: &str, due_at: &str, recurrence: Recurrence) -> String {
    let repeat = match recurrence {
        Recurrence::None => "",
        Recurrence::Daily => ", repeating daily",
        Recurrence::Weekly => ", repeating weekly",
    };
    format!("Task added: {text} at {due_at}{repeat}. What else can I help with?")
}

fn incoming_alert(sender: &str) -> String {
    format!("You have a new message from {sender}. Do you want me to read it aloud?")
}

fn format_task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "You have no scheduled tasks.".to_string();
    }
    let lines: Vec<String> = tasks
        .iter()
        .map(|t| {
            let repeat = t.recurrence.as_db().map(|r| format!(" ({r})")).unwrap_or_default();
            format!("#{} {} - {}{}", t.id, t.due_at.format("%Y-%m-%d %H:%M"), t.text, repeat)
        })
        .collect();
    format!("Your tasks:\n{}", lines.join("\n"))
}

/// `messages` arrive newest first and are shown oldest first.
fn format_read_result(chat_name: &str, mut messages: Vec<String>) -> String {
    if messages.is_empty() {
        return format!("There are no messages from {chat_name} yet.");
    }
    messages.reverse();
    format!("Last {} message(s) from {}:\n{}", messages.len(), chat_name, messages.join("\n"))
}

/// Prompt for a conversational reply. `history` is newest first.
fn conversation_messages(owner_name: Option<&str>, history: &[String], text: &str) -> Vec<Message> {
    let addressee = owner_name.unwrap_or("the user");
    let mut messages = vec![Message::system(format!(
        "You are a personal assistant for {addressee}. Help with managing tasks, setting reminders, \
         organizing the schedule and giving useful advice. Be polite and professional and address \
         the user as {addressee}. If a request needs details such as a date, time or task description, \
         ask for them. Keep answers short enough to be read aloud."
    ))];
    messages.extend(history.iter().rev().map(|reply| Message::assistant(reply.as_str())));
    messages.push(Message::user(text));
    messages
}
