use chrono::{DateTime, Utc};

/// Number of prompts shown in the history panel.
pub const HISTORY_DISPLAY_LIMIT: usize = 5;
const LABEL_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub prompt: String,
    pub submitted_at: DateTime<Utc>,
}

/// Append-only log of accepted prompts, kept for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, prompt: impl Into<String>) {
        self.entries.push(HistoryEntry {
            prompt: prompt.into(),
            submitted_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entries, oldest first.
    pub fn recent(&self) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(HISTORY_DISPLAY_LIMIT);
        &self.entries[start..]
    }

    pub fn recent_prompts(&self) -> Vec<String> {
        self.recent()
            .iter()
            .map(|entry| entry.prompt.clone())
            .collect()
    }

    /// Short form of a prompt for a history button.
    pub fn label(prompt: &str) -> String {
        if prompt.chars().count() > LABEL_MAX_CHARS {
            let head: String = prompt.chars().take(LABEL_MAX_CHARS).collect();
            format!("{head}...")
        } else {
            prompt.to_string()
        }
    }
}
