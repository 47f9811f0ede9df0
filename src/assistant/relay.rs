//! Relaying messages to and from known chats.
//!
//! The model extracts what to do and with whom; the recipient name is then
//! resolved against the chat directory, first exactly, then by fuzzy rank
//! with the model choosing among the closest names.

use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::assistant::database::ChatEntry;
use crate::assistant::tasks::optional_text;
use crate::classifier::{classify_label, match_label};
use crate::openai::{Client, FunctionTool, Message, Model};

/// Candidates passed to the model for the final pick.
const MAX_CANDIDATES: usize = 15;
const MAX_READ_COUNT: u32 = 50;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{N}]+").expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    Send { recipient: String, content: String },
    Read { recipient: String, count: u32 },
    Delete { recipient: String },
}

impl RelayAction {
    pub fn recipient(&self) -> &str {
        match self {
            Self::Send { recipient, .. } | Self::Read { recipient, .. } | Self::Delete { recipient } => {
                recipient
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Human-readable names of the fields the model could not fill.
    Missing(Vec<&'static str>),
    Classifier(String),
}

impl RelayError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing(fields) => format!(
                "I couldn't extract the following from your message: {}.\nPlease clarify your request!",
                fields.join(", ")
            ),
            Self::Classifier(_) => "Sorry, I couldn't understand that request. Please try again.".to_string(),
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(fields) => write!(f, "missing fields: {}", fields.join(", ")),
            Self::Classifier(e) => write!(f, "classifier error: {e}"),
        }
    }
}

impl std::error::Error for RelayError {}

#[derive(Debug, Default, Deserialize)]
struct RawRelay {
    #[serde(default, deserialize_with = "optional_text")]
    action_type: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    recipient: Option<String>,
    #[serde(default)]
    read_count: Value,
    #[serde(default, deserialize_with = "optional_text")]
    message_content: Option<String>,
}

fn read_count(value: &Value) -> u32 {
    let n = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.map(|n| n.clamp(1, MAX_READ_COUNT as u64) as u32).unwrap_or(1)
}

fn interpret(raw: RawRelay) -> Result<RelayAction, RelayError> {
    let kind = raw.action_type.map(|a| a.to_lowercase());
    let mut missing = Vec::new();

    if !matches!(kind.as_deref(), Some("send" | "read" | "delete")) {
        missing.push("action type");
    }
    if raw.recipient.is_none() {
        missing.push("recipient");
    }
    if kind.as_deref() == Some("send") && raw.message_content.is_none() {
        missing.push("message text to send");
    }

    if !missing.is_empty() {
        return Err(RelayError::Missing(missing));
    }
    let recipient = raw.recipient.unwrap_or_default();

    Ok(match kind.as_deref() {
        Some("send") => RelayAction::Send {
            recipient,
            content: raw.message_content.unwrap_or_default(),
        },
        Some("read") => RelayAction::Read { recipient, count: read_count(&raw.read_count) },
        _ => RelayAction::Delete { recipient },
    })
}

fn action_tool() -> FunctionTool {
    FunctionTool {
        name: "message_action_filter",
        description: "Classify and filter message actions, determining parameters based on the type of action: send, read, or delete.",
        parameters: json!({
            "type": "object",
            "properties": {
                "action_type": {
                    "type": "string",
                    "description": "The action: \"send\" (write a message to a user or group), \
                                    \"read\" (read messages from a chat) or \"delete\" (delete messages in a chat)."
                },
                "recipient": {
                    "type": "string",
                    "description": "The user or group the action targets, with the name in its nominative, \
                                    unaltered form (\"Write to Ivanu\" -> \"Ivan\"). Return false if no recipient is given."
                },
                "read_count": {
                    "type": "integer",
                    "description": "For \"read\" only: how many recent messages to read. Default 1. Null otherwise."
                },
                "message_content": {
                    "type": "string",
                    "description": "For \"send\" only: the message to send, paraphrased into a concise neutral form \
                                    in the language the user asked for. Null if not defined or for other actions."
                }
            },
            "required": ["action_type", "recipient"],
            "additionalProperties": false
        }),
    }
}

/// Ask the model what relay action the owner wants.
pub async fn extract_action(
    client: &Client,
    message_text: &str,
    reference: NaiveDateTime,
) -> Result<RelayAction, RelayError> {
    let prompt = format!(
        "Current datetime is: {}.\n\
         Analyze the following message request: '{message_text}'.\n\
         Determine the action type (\"send\", \"read\" or \"delete\") and extract its parameters:\n\
         - send: the recipient and the message content to send.\n\
         - read: the recipient and how many messages to read (default 1).\n\
         - delete: the recipient.\n\
         If the action type or recipient is not defined, return false for it.",
        reference.format("%Y-%m-%dT%H:%M:%S")
    );

    let args = client
        .call_function(
            Model::Mini,
            &[
                Message::system("You are a messaging assistant that classifies and extracts action details."),
                Message::user(prompt),
            ],
            &action_tool(),
        )
        .await
        .map_err(|e| RelayError::Classifier(e.to_string()))?;

    let raw: RawRelay = serde_json::from_value(args)
        .map_err(|e| RelayError::Classifier(format!("bad relay output: {e}")))?;
    debug!("Relay extraction: {:?}", raw);
    interpret(raw)
}

fn token_sort_key(s: &str) -> String {
    let lowered = s.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, " ");
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }
    row[b.len()]
}

/// Token-sort similarity in 0..=100: word order, case and punctuation are ignored.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = token_sort_key(a).chars().collect();
    let b: Vec<char> = token_sort_key(b).chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / (a.len() + b.len()) as f64
}

/// Chats ordered by similarity to `recipient`, best first, at most `MAX_CANDIDATES`.
/// Names with no overlap at all are dropped.
pub fn rank_candidates<'a>(recipient: &str, chats: &'a [ChatEntry]) -> Vec<(&'a ChatEntry, f64)> {
    let mut scored: Vec<(&ChatEntry, f64)> = chats
        .iter()
        .map(|c| (c, similarity(recipient, &c.name)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(MAX_CANDIDATES);
    scored
}

fn exact_match<'a>(recipient: &str, chats: &'a [ChatEntry]) -> Option<&'a ChatEntry> {
    let wanted = recipient.trim().to_lowercase();
    chats.iter().find(|c| c.name.trim().to_lowercase() == wanted)
}

/// Resolve a spoken recipient name to a chat from `chats`.
pub async fn find_chat(
    client: &Client,
    chats: &[ChatEntry],
    recipient: &str,
) -> Result<Option<ChatEntry>, String> {
    if let Some(chat) = exact_match(recipient, chats) {
        return Ok(Some(chat.clone()));
    }

    let ranked = rank_candidates(recipient, chats);
    if ranked.is_empty() {
        return Ok(None);
    }
    debug!(
        "Candidates for {:?}: {:?}",
        recipient,
        ranked.iter().map(|(c, s)| (c.name.as_str(), *s as u32)).collect::<Vec<_>>()
    );

    let labels: Vec<&str> = ranked.iter().map(|(c, _)| c.name.as_str()).collect();
    let answer = classify_label(recipient, &labels, client).await?;
    let chosen = match_label(&answer, &labels).map(|i| ranked[i].0.clone());

    info!("Resolved recipient {:?} -> {:?}", recipient, chosen.as_ref().map(|c| &c.name));
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: i64, name: &str) -> ChatEntry {
        ChatEntry { chat_id: id, name: name.to_string(), is_bot: false }
    }

    fn raw(json: &str) -> RawRelay {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_similarity_ignores_word_order_and_case() {
        assert_eq!(similarity("Oleg Petrov", "petrov oleg"), 100.0);
        assert_eq!(similarity("Oleg, Petrov!", "Petrov Oleg"), 100.0);
        assert_eq!(similarity("Oleg Petrov", "Anna"), similarity("Petrov Oleg", "Anna"));
    }

    #[test]
    fn test_similarity_partial() {
        let close = similarity("Oleg", "Oleg Petrov");
        let far = similarity("Oleg", "Anna Smirnova");
        assert!(close > far, "{close} <= {far}");
        assert!(close > 0.0 && close < 100.0);
        assert_eq!(similarity("", "Oleg"), 0.0);
    }

    #[test]
    fn test_similarity_known_value() {
        // "abcd" vs "abce": LCS 3, 2*3/8
        assert_eq!(similarity("abcd", "abce"), 75.0);
    }

    #[test]
    fn test_rank_candidates_best_first_and_capped() {
        let mut chats: Vec<ChatEntry> = (0..20).map(|i| chat(i, &format!("Person {i}"))).collect();
        chats.push(chat(100, "Oleg"));
        let ranked = rank_candidates("oleg", &chats);
        assert_eq!(ranked.len(), MAX_CANDIDATES);
        assert_eq!(ranked[0].0.chat_id, 100);
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let chats = vec![chat(1, "Anna"), chat(2, " Oleg ")];
        assert_eq!(exact_match("oleg", &chats).map(|c| c.chat_id), Some(2));
        assert!(exact_match("Ole", &chats).is_none());
    }

    #[test]
    fn test_interpret_send() {
        let action = interpret(raw(r#"{"action_type": "send", "recipient": "Oleg", "message_content": "See you at 5"}"#)).unwrap();
        assert_eq!(
            action,
            RelayAction::Send { recipient: "Oleg".into(), content: "See you at 5".into() }
        );
    }

    #[test]
    fn test_interpret_read_count_defaults_and_clamps() {
        let a = interpret(raw(r#"{"action_type": "read", "recipient": "Oleg", "read_count": null}"#)).unwrap();
        let b = interpret(raw(r#"{"action_type": "read", "recipient": "Oleg", "read_count": 5}"#)).unwrap();
        let c = interpret(raw(r#"{"action_type": "read", "recipient": "Oleg", "read_count": "1000"}"#)).unwrap();
        assert_eq!(a, RelayAction::Read { recipient: "Oleg".into(), count: 1 });
        assert_eq!(b, RelayAction::Read { recipient: "Oleg".into(), count: 5 });
        assert_eq!(c, RelayAction::Read { recipient: "Oleg".into(), count: MAX_READ_COUNT });
    }

    #[test]
    fn test_interpret_collects_all_missing_fields() {
        let err = interpret(raw(r#"{"action_type": "send", "recipient": false, "message_content": null}"#)).unwrap_err();
        assert_eq!(err, RelayError::Missing(vec!["recipient", "message text to send"]));
        assert!(err.user_message().contains("recipient, message text to send"));

        let err = interpret(raw(r#"{"action_type": false, "recipient": false}"#)).unwrap_err();
        assert_eq!(err, RelayError::Missing(vec!["action type", "recipient"]));
    }

    #[test]
    fn test_interpret_delete() {
        let action = interpret(raw(r#"{"action_type": "Delete", "recipient": "Team"}"#)).unwrap();
        assert_eq!(action, RelayAction::Delete { recipient: "Team".into() });
        assert_eq!(action.recipient(), "Team");
    }
}
