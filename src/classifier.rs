use serde_json::json;

use crate::openai::{Client, FunctionTool, Message, Model};

const PRIMARY_LABELS: [&str; 3] = [
    "Smart home control",
    "Personal assistant functions",
    "Other",
];

const ASSISTANT_LABELS: [&str; 5] = [
    "Reminders and scheduling",
    "Telegram messenger manager",
    "Video call manager",
    "Screenshot manager",
    "Translation manager",
];

const REPLY_LABELS: [&str; 3] = [
    "Read the message aloud",
    "Do not read the message",
    "Other",
];

/// What the owner wants from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Reminder,
    Relay,
    SmartHome,
    /// A recognized assistant function that is not implemented.
    Unsupported(String),
    Conversation,
}

/// Answer to "do you want me to read it aloud?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAloudReply {
    ReadAloud,
    Skip,
    Unclear,
}

fn label_tool() -> FunctionTool {
    FunctionTool {
        name: "classify_text",
        description: "Classify the input text into predefined categories.",
        parameters: json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "The category the input text belongs to."
                }
            },
            "required": ["category"],
            "additionalProperties": false
        }),
    }
}

/// Ask the model to pick one of `labels` for `text`. Returns the raw answer.
pub async fn classify_label(text: &str, labels: &[&str], client: &Client) -> Result<String, String> {
    let prompt = format!(
        "Classify the following text: '{text}' into one of the following categories: {}. \
         Respond with the category that best describes the text.",
        labels.join(", ")
    );

    let args = client
        .call_function(
            Model::Mini,
            &[Message::system("You are a text classifier."), Message::user(prompt)],
            &label_tool(),
        )
        .await
        .map_err(|e| e.to_string())?;

    args.get("category")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
        .ok_or_else(|| "classifier returned no category".to_string())
}

fn clean_answer(answer: &str) -> String {
    answer
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c.is_whitespace())
        .to_lowercase()
}

/// The label the answer names exactly, ignoring case, quotes and trailing punctuation.
pub fn match_label_exact(answer: &str, labels: &[&str]) -> Option<usize> {
    let cleaned = clean_answer(answer);
    if cleaned.is_empty() {
        return None;
    }
    labels.iter().position(|l| l.to_lowercase() == cleaned)
}

/// Find which label the model meant. Falls back to the longest label
/// contained in the answer, so "Do not read the message aloud" picks
/// "Do not read the message" over "Read the message aloud".
pub fn match_label(answer: &str, labels: &[&str]) -> Option<usize> {
    match_label_exact(answer, labels).or_else(|| {
        let cleaned = clean_answer(answer);
        labels
            .iter()
            .enumerate()
            .filter(|(_, l)| !cleaned.is_empty() && cleaned.contains(&l.to_lowercase()))
            .max_by_key(|(i, l)| (l.len(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
    })
}

/// Two-level routing: primary category, then assistant function.
pub async fn classify_intent(text: &str, client: &Client) -> Result<Intent, String> {
    let primary = classify_label(text, &PRIMARY_LABELS, client).await?;
    match match_label(&primary, &PRIMARY_LABELS) {
        Some(0) => return Ok(Intent::SmartHome),
        Some(1) => {}
        _ => return Ok(Intent::Conversation),
    }

    let secondary = classify_label(text, &ASSISTANT_LABELS, client).await?;
    Ok(assistant_intent(&secondary))
}

fn assistant_intent(answer: &str) -> Intent {
    match match_label(answer, &ASSISTANT_LABELS) {
        Some(0) => Intent::Reminder,
        Some(1) => Intent::Relay,
        Some(i) => Intent::Unsupported(ASSISTANT_LABELS[i].to_string()),
        None => Intent::Conversation,
    }
}

/// Classify the owner's answer to a pending read-aloud question.
pub async fn classify_read_aloud_reply(text: &str, client: &Client) -> Result<ReadAloudReply, String> {
    let answer = classify_label(text, &REPLY_LABELS, client).await?;
    Ok(read_aloud_reply(&answer))
}

// Exact only: a refusal must never be read as consent.
fn read_aloud_reply(answer: &str) -> ReadAloudReply {
    match match_label_exact(answer, &REPLY_LABELS) {
        Some(0) => ReadAloudReply::ReadAloud,
        Some(1) => ReadAloudReply::Skip,
        _ => ReadAloudReply::Unclear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_label_exact_and_case() {
        assert_eq!(match_label("Other", &PRIMARY_LABELS), Some(2));
        assert_eq!(match_label("smart home control", &PRIMARY_LABELS), Some(0));
    }

    #[test]
    fn test_match_label_quotes_and_punctuation() {
        assert_eq!(match_label("\"Personal assistant functions\".", &PRIMARY_LABELS), Some(1));
        assert_eq!(match_label("  'Other'  ", &PRIMARY_LABELS), Some(2));
    }

    #[test]
    fn test_match_label_contained() {
        assert_eq!(
            match_label("Category: Reminders and scheduling", &ASSISTANT_LABELS),
            Some(0)
        );
    }

    #[test]
    fn test_match_label_prefers_longest_contained() {
        assert_eq!(match_label("Do not read the message aloud", &REPLY_LABELS), Some(1));
        assert_eq!(match_label("I'd say: read the message aloud", &REPLY_LABELS), Some(0));
    }

    #[test]
    fn test_match_label_unknown() {
        assert_eq!(match_label("weather", &PRIMARY_LABELS), None);
        assert_eq!(match_label("", &PRIMARY_LABELS), None);
    }

    #[test]
    fn test_assistant_intent() {
        assert_eq!(assistant_intent("Reminders and scheduling"), Intent::Reminder);
        assert_eq!(assistant_intent("Telegram messenger manager"), Intent::Relay);
        assert_eq!(
            assistant_intent("Translation manager"),
            Intent::Unsupported("Translation manager".to_string())
        );
        assert_eq!(assistant_intent("something else"), Intent::Conversation);
    }

    #[test]
    fn test_read_aloud_reply() {
        assert_eq!(read_aloud_reply("Read the message aloud"), ReadAloudReply::ReadAloud);
        assert_eq!(read_aloud_reply("Do not read the message"), ReadAloudReply::Skip);
        assert_eq!(read_aloud_reply("Other"), ReadAloudReply::Unclear);
        assert_eq!(read_aloud_reply("maybe"), ReadAloudReply::Unclear);
    }

    #[test]
    fn test_read_aloud_reply_refusal_is_never_consent() {
        assert_ne!(read_aloud_reply("Do not read the message aloud"), ReadAloudReply::ReadAloud);
        assert_ne!(read_aloud_reply("Don't read the message aloud"), ReadAloudReply::ReadAloud);
        assert_eq!(read_aloud_reply("\"Do not read the message.\""), ReadAloudReply::Skip);
    }
}
