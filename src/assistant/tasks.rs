//! Scheduled tasks: data types and extraction from free text.
//!
//! The model does the reading; this module owns what counts as a usable
//! answer. A due time equal to the reference "now" means the model did not
//! find one, and `false`/`null`/empty fields are treated as absent.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Timelike, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::openai::{Client, FunctionTool, Message, Model};

/// Storage and display format for task timestamps.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How often a task repeats after it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
}

impl Recurrence {
    /// Time added to `due_at` after firing, or `None` if the task is removed.
    pub fn period(&self) -> Option<Duration> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => Some(Duration::days(1)),
            Recurrence::Weekly => Some(Duration::weeks(1)),
        }
    }

    /// Value of the nullable `repeat_interval` column.
    pub fn as_db(&self) -> Option<&'static str> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => Some("daily"),
            Recurrence::Weekly => Some("weekly"),
        }
    }

    /// Lenient parse: anything that is not daily/weekly means no repetition.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("daily") => Recurrence::Daily,
            Some("weekly") => Recurrence::Weekly,
            _ => Recurrence::None,
        }
    }
}

/// A persisted task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    /// Messaging identity of the owning user.
    pub owner: String,
    pub text: String,
    pub due_at: NaiveDateTime,
    pub recurrence: Recurrence,
    /// Insert time in UTC, set by the store. Not in the deployment offset.
    pub created_at: NaiveDateTime,
}

impl Task {
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.due_at <= now
    }
}

/// A validated task that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub text: String,
    pub due_at: NaiveDateTime,
    pub recurrence: Recurrence,
}

/// Why a message could not be turned into a task.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionError {
    MissingText,
    MissingDueAt,
    MissingBoth,
    Classifier(String),
}

impl ExtractionError {
    /// What to tell the user so they know what to clarify.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingText => {
                "I couldn't tell what the task is from your message. Please say what I should remind you about."
            }
            Self::MissingDueAt => {
                "I couldn't tell when the task should happen. Please give me a date and time."
            }
            Self::MissingBoth => {
                "I couldn't find either the task or its time in your message. Please tell me what to remind you about and when."
            }
            Self::Classifier(_) => "Sorry, I couldn't process that task right now. Please try again.",
        }
    }
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingText => write!(f, "task text missing"),
            Self::MissingDueAt => write!(f, "due time missing"),
            Self::MissingBoth => write!(f, "task text and due time missing"),
            Self::Classifier(e) => write!(f, "classifier error: {e}"),
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Arguments returned by the `classify_text` extraction tool.
#[derive(Debug, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default, deserialize_with = "optional_text")]
    pub task_text: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub repeat_interval: Option<String>,
}

/// `false`, `null`, `""` and the strings "false"/"null"/"none" all mean absent.
pub(crate) fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => {
            let s = s.trim();
            match s.to_lowercase().as_str() {
                "" | "false" | "null" | "none" => None,
                _ => Some(s.to_string()),
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// The fixed offset every task time is normalized to.
pub fn deployment_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// Current wall-clock time in the deployment offset, to whole seconds.
pub fn deployment_now(offset: FixedOffset) -> NaiveDateTime {
    to_deployment(Utc::now(), offset)
}

fn to_deployment(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    let local = instant.with_timezone(&offset).naive_local();
    local.with_nanosecond(0).unwrap_or(local)
}

/// Parse a model-supplied timestamp into the deployment frame.
///
/// Accepts `T` or space separators, optional seconds and fractions, and
/// RFC 3339 offsets (converted, then dropped).
pub fn parse_due_at(value: &str, offset: FixedOffset) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(to_deployment(dt.with_timezone(&Utc), offset));
    }

    let normalized = value.replacen(' ', "T", 1);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(dt.with_nanosecond(0).unwrap_or(dt));
        }
    }
    None
}

/// Apply the validation and defaulting policy to raw extractor output.
pub fn finalize(
    raw: RawExtraction,
    reference: NaiveDateTime,
    offset: FixedOffset,
) -> Result<TaskDraft, ExtractionError> {
    let reference = reference.with_nanosecond(0).unwrap_or(reference);

    let text = raw.task_text.filter(|t| !t.trim().is_empty());
    let due_at = raw.start_time.as_deref().and_then(|s| {
        let parsed = parse_due_at(s, offset);
        if parsed.is_none() {
            warn!("Unparseable due time from extractor: {s:?}");
        }
        parsed
    });
    // The extractor echoes the reference time when the message has none.
    let due_at = due_at.filter(|d| *d != reference);

    match (text, due_at) {
        (None, None) => Err(ExtractionError::MissingBoth),
        (None, Some(_)) => Err(ExtractionError::MissingText),
        (Some(_), None) => Err(ExtractionError::MissingDueAt),
        (Some(text), Some(due_at)) => Ok(TaskDraft {
            text,
            due_at,
            recurrence: Recurrence::parse(raw.repeat_interval.as_deref()),
        }),
    }
}

fn extraction_tool(message_text: &str) -> FunctionTool {
    FunctionTool {
        name: "classify_text",
        description: "Classify and extract task details for scheduling.",
        parameters: json!({
            "type": "object",
            "properties": {
                "task_text": {
                    "type": "string",
                    "description": format!(
                        "Paraphrase the task into a short neutral description that does NOT mention \
                         the execution date, time or repeat interval. \
                         Example: \"Make an appointment with Oleg for tomorrow\" -> \"Meeting with Oleg\". \
                         If no task is defined in \"{message_text}\", return false."
                    )
                },
                "start_time": {
                    "type": "string",
                    "description": format!(
                        "Start time of the task in ISO 8601 (e.g. 2024-12-01T14:00:00). \
                         If no time is defined in \"{message_text}\", return false."
                    )
                },
                "repeat_interval": {
                    "type": "string",
                    "description": "Repeat interval: 'daily', 'weekly', or 'NULL' for no repetition."
                }
            },
            "required": ["task_text", "start_time", "repeat_interval"],
            "additionalProperties": false
        }),
    }
}

/// Ask the model for task details and validate the answer.
pub async fn extract_task(
    client: &Client,
    message_text: &str,
    reference: NaiveDateTime,
    offset: FixedOffset,
) -> Result<TaskDraft, ExtractionError> {
    let reference = reference.with_nanosecond(0).unwrap_or(reference);
    let prompt = format!(
        "Current datetime is: {}.\n\
         Process the following scheduling request: '{message_text}'.\n\
         Return task_text, start_time (ISO 8601) and repeat_interval ('daily', 'weekly', or 'NULL').\n\
         If task_text or start_time is not defined in the request, return false for it.",
        reference.format("%Y-%m-%dT%H:%M:%S")
    );

    let args = client
        .call_function(
            Model::Mini,
            &[Message::system("You are a scheduling assistant."), Message::user(prompt)],
            &extraction_tool(message_text),
        )
        .await
        .map_err(|e| ExtractionError::Classifier(e.to_string()))?;

    let raw: RawExtraction = serde_json::from_value(args)
        .map_err(|e| ExtractionError::Classifier(format!("bad extractor output: {e}")))?;
    info!(
        "Extracted task: text={:?} start={:?} repeat={:?}",
        raw.task_text, raw.start_time, raw.repeat_interval
    );

    finalize(raw, reference, offset)
}
