//! Task definitions as read from the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether the summarizer should judge the page instead of summarising it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    Yes,
    #[default]
    No,
}

impl AlertMode {
    pub fn is_yes(self) -> bool {
        self == AlertMode::Yes
    }
}

impl fmt::Display for AlertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertMode::Yes => write!(f, "yes"),
            AlertMode::No => write!(f, "no"),
        }
    }
}

impl FromStr for AlertMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "yes" => Ok(AlertMode::Yes),
            "no" | "" => Ok(AlertMode::No),
            other => Err(format!("expected 'yes' or 'no', got '{other}'")),
        }
    }
}

/// A persisted task. The core only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    /// Comma separated selectors; entries prefixed with `!` are exclusions.
    pub tag_selectors: Option<String>,
    /// Cron expression driving automatic runs.
    pub schedule: Option<String>,
    /// Human form of the schedule, informational only.
    pub raw_schedule: Option<String>,
    #[serde(default)]
    pub alert_if_true: AlertMode,
    pub prompt: String,
    /// Opaque delivery target (a chat id for Telegram).
    pub destination: String,
}

impl Task {
    /// Tasks without a URL or selectors just echo their prompt.
    pub fn is_notification_only(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.url) || blank(&self.tag_selectors)
    }

    pub fn selectors(&self) -> SelectorSet {
        SelectorSet::parse(self.tag_selectors.as_deref().unwrap_or_default())
    }
}

/// Include/exclude selectors split out of a task's tag list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorSet {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl SelectorSet {
    pub fn parse(tags: &str) -> Self {
        let mut set = SelectorSet::default();
        for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match tag.strip_prefix('!') {
                Some(excluded) => {
                    let excluded = excluded.trim();
                    if !excluded.is_empty() {
                        set.exclude.push(excluded.to_string());
                    }
                }
                None => set.include.push(tag.to_string()),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    /// Every selector, includes first.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.include
            .iter()
            .chain(self.exclude.iter())
            .map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) fn sample_task(id: i64) -> Task {
    Task {
        id,
        name: format!("task-{id}"),
        url: Some("https://x".to_string()),
        tag_selectors: Some("body".to_string()),
        schedule: Some("*/1 * * * *".to_string()),
        raw_schedule: None,
        alert_if_true: AlertMode::No,
        prompt: "Summarize: {content}".to_string(),
        destination: "chat-1".to_string(),
    }
}
