//! Forwards log events to a Telegram chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Telegram's message limit is 4096; leave room for the ellipsis.
const MAX_LOG_CHARS: usize = 4000;
const FLUSH_EVERY: Duration = Duration::from_secs(5);
const MAX_BATCH: usize = 50;

enum LogLine {
    /// WARN/ERROR, sent as soon as received.
    Urgent(String),
    /// INFO, batched.
    Routine(String),
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
    /// Only INFO events from targets with this prefix are forwarded.
    info_target: &'static str,
}

impl TelegramLogLayer {
    /// Must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId, info_target: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(bot, chat_id, rx));
        Self { tx, info_target }
    }
}

async fn forward(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<LogLine>) {
    let mut batch: Vec<String> = Vec::new();
    let mut ticker = tokio::time::interval(FLUSH_EVERY);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(LogLine::Urgent(text)) => post(&bot, chat_id, &text).await,
                Some(LogLine::Routine(text)) => {
                    batch.push(text);
                    if batch.len() >= MAX_BATCH {
                        post(&bot, chat_id, &batch.join("\n")).await;
                        batch.clear();
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    post(&bot, chat_id, &batch.join("\n")).await;
                    batch.clear();
                }
            }
        }
    }
}

fn clip(text: &str) -> String {
    match text.char_indices().nth(MAX_LOG_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

async fn post(bot: &Bot, chat_id: ChatId, text: &str) {
    // Logging from here would feed back into this layer.
    if let Err(e) = bot.send_message(chat_id, clip(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

#[derive(Default)]
struct FieldCollector {
    text: String,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, &format!("{value:?}"));
    }
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.text.insert_str(0, value);
        } else {
            if !self.text.is_empty() {
                self.text.push_str(", ");
            }
            self.text.push_str(&format!("{} = {}", field.name(), value));
        }
    }
}

fn classify(level: Level, target: &str, info_target: &str, text: String) -> Option<LogLine> {
    match level {
        Level::ERROR => Some(LogLine::Urgent(format!("ERROR {text}"))),
        Level::WARN => Some(LogLine::Urgent(format!("WARN {text}"))),
        Level::INFO if target.starts_with(info_target) => Some(LogLine::Routine(text)),
        _ => None,
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::INFO {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        if let Some(line) = classify(*meta.level(), meta.target(), self.info_target, fields.text) {
            let _ = self.tx.send(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short"), "short");
        let long = "я".repeat(MAX_LOG_CHARS + 10);
        let clipped = clip(&long);
        assert!(clipped.ends_with("..."));
        assert_eq!(clipped.chars().count(), MAX_LOG_CHARS + 3);
    }

    #[test]
    fn test_classify_levels() {
        assert!(matches!(
            classify(Level::WARN, "teloxide::dispatching", "voxmate", "x".into()),
            Some(LogLine::Urgent(t)) if t == "WARN x"
        ));
        assert!(matches!(
            classify(Level::INFO, "voxmate::assistant::scheduler", "voxmate", "y".into()),
            Some(LogLine::Routine(_))
        ));
        assert!(classify(Level::INFO, "hyper::client", "voxmate", "z".into()).is_none());
        assert!(classify(Level::DEBUG, "voxmate", "voxmate", "d".into()).is_none());
    }
}
