//! Task validation at the store boundary.
//!
//! Raw submissions arrive as a [`TaskDraft`] (JSON body or `key=value` text)
//! and are checked once into a [`ParseResult`]. Downstream code only ever
//! sees validated tasks.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::fetch::extract::validate_selector;
use crate::task::cron_expr;
use crate::task::model::{AlertMode, SelectorSet};

static DAILY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^daily\s+(\d{1,2}):(\d{1,2})$").expect("daily schedule regex is valid")
});

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Unvalidated task input.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskDraft {
    pub name: Option<String>,
    pub url: Option<String>,
    pub tag_selectors: Option<String>,
    pub schedule: Option<String>,
    pub raw_schedule: Option<String>,
    pub alert_if_true: Option<String>,
    pub prompt: Option<String>,
    pub destination: Option<String>,
}

/// A validated task that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub url: Option<String>,
    pub tag_selectors: Option<String>,
    pub schedule: Option<String>,
    pub raw_schedule: Option<String>,
    pub alert_if_true: AlertMode,
    pub prompt: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    Valid(NewTask),
    Invalid(Vec<FieldError>),
}

impl ParseResult {
    pub fn into_result(self) -> Result<NewTask, TaskError> {
        match self {
            ParseResult::Valid(task) => Ok(task),
            ParseResult::Invalid(errors) => Err(TaskError::Invalid(errors)),
        }
    }
}

impl TaskDraft {
    /// Parse `key=value` lines. The first `=` splits; malformed lines are skipped.
    ///
    /// The destination is never taken from text; callers attach it from the
    /// conversation the text arrived on.
    pub fn from_key_value(text: &str) -> Self {
        let mut draft = TaskDraft::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line, "Invalid key-value format");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                tracing::warn!(line, "Empty key or value");
                continue;
            }
            let value = Some(value.to_string());
            match key {
                "name" => draft.name = value,
                "url" => draft.url = value,
                "tags" | "tag_selectors" => draft.tag_selectors = value,
                "schedule" => draft.schedule = value,
                "raw_schedule" => draft.raw_schedule = value,
                "alert_if_true" => draft.alert_if_true = value,
                "prompt" => draft.prompt = value,
                other => tracing::warn!(key = other, "Ignoring unknown task field"),
            }
        }
        draft
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn parse(self) -> ParseResult {
        let mut errors = Vec::new();

        let name = non_empty(self.name);
        if name.is_none() {
            errors.push(FieldError::new("name", "must not be empty"));
        }

        let prompt = non_empty(self.prompt);
        if prompt.is_none() {
            errors.push(FieldError::new("prompt", "must not be empty"));
        }

        let destination = non_empty(self.destination);
        if destination.is_none() {
            errors.push(FieldError::new("destination", "must not be empty"));
        }

        let url = non_empty(self.url);
        if let Some(ref url) = url
            && let Err(message) = check_url(url)
        {
            errors.push(FieldError::new("url", message));
        }

        let tag_selectors = non_empty(self.tag_selectors);
        if let Some(ref tags) = tag_selectors {
            let selectors = SelectorSet::parse(tags);
            if selectors.is_empty() {
                errors.push(FieldError::new(
                    "tag_selectors",
                    "needs at least one include selector",
                ));
            }
            for selector in selectors.all() {
                if let Err(e) = validate_selector(selector) {
                    errors.push(FieldError::new("tag_selectors", e.to_string()));
                }
            }
        }

        let raw_schedule = non_empty(self.raw_schedule);
        let schedule = match (non_empty(self.schedule), raw_schedule.as_deref()) {
            (Some(schedule), _) => Some(schedule),
            (None, Some(raw)) => match convert_raw_schedule(raw) {
                Ok(cron) => Some(cron),
                Err(message) => {
                    errors.push(FieldError::new("raw_schedule", message));
                    None
                }
            },
            (None, None) => None,
        };
        if let Some(ref schedule) = schedule
            && let Err(message) = cron_expr::parse(schedule)
        {
            errors.push(FieldError::new("schedule", message));
        }

        let alert_if_true = match self.alert_if_true.as_deref().unwrap_or_default().parse() {
            Ok(mode) => mode,
            Err(message) => {
                errors.push(FieldError::new("alert_if_true", message));
                AlertMode::No
            }
        };

        if url.is_some()
            && tag_selectors.is_some()
            && prompt.as_deref().is_some_and(|p| !p.contains("{content}"))
        {
            errors.push(FieldError::new(
                "prompt",
                "must contain a {content} placeholder when url and tags are set",
            ));
        }

        match (name, prompt, destination) {
            (Some(name), Some(prompt), Some(destination)) if errors.is_empty() => {
                ParseResult::Valid(NewTask {
                    name,
                    url,
                    tag_selectors,
                    schedule,
                    raw_schedule,
                    alert_if_true,
                    prompt,
                    destination,
                })
            }
            _ => ParseResult::Invalid(errors),
        }
    }
}

/// Convert a human schedule (`daily HH:MM`) to cron. Anything else is
/// assumed to already be a cron expression.
pub fn convert_raw_schedule(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if let Some(caps) = DAILY_RE.captures(raw) {
        let hours: u32 = caps[1].parse().map_err(|_| "invalid hour".to_string())?;
        let minutes: u32 = caps[2].parse().map_err(|_| "invalid minute".to_string())?;
        if hours > 23 || minutes > 59 {
            return Err("Invalid time format in schedule. Use \"daily HH:MM\".".to_string());
        }
        return Ok(format!("{minutes} {hours} * * *"));
    }
    if raw.starts_with("daily") {
        return Err("Invalid time format in schedule. Use \"daily HH:MM\".".to_string());
    }
    Ok(raw.to_string())
}

fn check_url(url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TaskDraft {
        TaskDraft {
            name: Some("News".to_string()),
            url: Some("https://example.com".to_string()),
            tag_selectors: Some("article, !.ads".to_string()),
            schedule: Some("0 9 * * *".to_string()),
            prompt: Some("Summarize: {content}".to_string()),
            destination: Some("42".to_string()),
            ..Default::default()
        }
    }

    fn fields(result: ParseResult) -> Vec<&'static str> {
        match result {
            ParseResult::Invalid(errors) => errors.into_iter().map(|e| e.field).collect(),
            ParseResult::Valid(task) => panic!("expected invalid, got {task:?}"),
        }
    }

    #[test]
    fn valid_draft() {
        let ParseResult::Valid(task) = draft().parse() else {
            panic!("expected valid");
        };
        assert_eq!(task.name, "News");
        assert_eq!(task.alert_if_true, AlertMode::No);
        assert_eq!(task.schedule.as_deref(), Some("0 9 * * *"));
    }

    #[test]
    fn missing_required_fields() {
        let result = TaskDraft::default().parse();
        assert_eq!(fields(result), vec!["name", "prompt", "destination"]);
    }

    #[test]
    fn bad_cron_rejected() {
        let result = TaskDraft {
            schedule: Some("every day".to_string()),
            ..draft()
        }
        .parse();
        assert_eq!(fields(result), vec!["schedule"]);
    }

    #[test]
    fn bad_url_and_selector_rejected() {
        let result = TaskDraft {
            url: Some("ftp://example.com".to_string()),
            tag_selectors: Some("div[".to_string()),
            ..draft()
        }
        .parse();
        assert_eq!(fields(result), vec!["url", "tag_selectors"]);
    }

    #[test]
    fn prompt_needs_placeholder_with_url() {
        let result = TaskDraft {
            prompt: Some("Summarize".to_string()),
            ..draft()
        }
        .parse();
        assert_eq!(fields(result), vec!["prompt"]);
    }

    #[test]
    fn notification_task_needs_no_placeholder() {
        let result = TaskDraft {
            url: None,
            tag_selectors: None,
            prompt: Some("Ping".to_string()),
            ..draft()
        }
        .parse();
        assert!(matches!(result, ParseResult::Valid(_)));
    }

    #[test]
    fn raw_schedule_converted() {
        let ParseResult::Valid(task) = TaskDraft {
            schedule: None,
            raw_schedule: Some("daily 09:30".to_string()),
            ..draft()
        }
        .parse() else {
            panic!("expected valid");
        };
        assert_eq!(task.schedule.as_deref(), Some("30 9 * * *"));
        assert_eq!(task.raw_schedule.as_deref(), Some("daily 09:30"));
    }

    #[test]
    fn convert_rejects_out_of_range_time() {
        assert!(convert_raw_schedule("daily 25:00").is_err());
        assert!(convert_raw_schedule("daily noon").is_err());
        assert_eq!(convert_raw_schedule("*/5 * * * *").unwrap(), "*/5 * * * *");
    }

    #[test]
    fn alert_flag_validated() {
        let result = TaskDraft {
            alert_if_true: Some("sometimes".to_string()),
            ..draft()
        }
        .parse();
        assert_eq!(fields(result), vec!["alert_if_true"]);
    }

    #[test]
    fn key_value_parsing() {
        let text = "name=Prices\nurl=https://shop.example/item\ntags=.price,!.old\n\
                    garbage line\nprompt=Is {content} below 10?\nalert_if_true=yes\nchatId=99";
        let draft = TaskDraft::from_key_value(text).with_destination("7");
        assert_eq!(draft.name.as_deref(), Some("Prices"));
        assert_eq!(draft.tag_selectors.as_deref(), Some(".price,!.old"));
        assert_eq!(draft.destination.as_deref(), Some("7"));

        let ParseResult::Valid(task) = draft.parse() else {
            panic!("expected valid");
        };
        assert_eq!(task.alert_if_true, AlertMode::Yes);
        assert_eq!(task.prompt, "Is {content} below 10?");
    }
}
