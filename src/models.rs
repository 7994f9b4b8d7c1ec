use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Labels offered by the add-task picker. The storage layer accepts any
/// label string; these only seed the UI.
pub const SUGGESTED_LABELS: &[&str] = &["Personal", "Work", "Study", "Groceries", "Health"];

/// Sentinel filter value meaning "no label filtering applied".
pub const FILTER_ALL: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// 0 until the store assigns a real id on first insert.
    pub id: i64,
    pub title: String,
    pub label: String,
    /// 0 = Low, 1 = Medium, 2 = High
    pub priority: i64,
    /// Milliseconds since epoch, set once at creation.
    pub created_at: i64,
    pub is_done: bool,
}

impl Task {
    pub fn new(title: &str, label: &str, priority: i64) -> Self {
        Task {
            id: 0,
            title: title.to_string(),
            label: label.to_string(),
            priority,
            created_at: Utc::now().timestamp_millis(),
            is_done: false,
        }
    }

    pub fn priority_text(&self) -> &'static str {
        match self.priority {
            2 => "High",
            1 => "Medium",
            _ => "Low",
        }
    }

    pub fn created_at_text(&self) -> String {
        match DateTime::from_timestamp_millis(self.created_at) {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    NewestFirst,
    OldestFirst,
    PriorityHigh,
    PriorityLow,
}

impl SortMode {
    pub fn parse(s: &str) -> Option<SortMode> {
        match s {
            "newest" => Some(SortMode::NewestFirst),
            "oldest" => Some(SortMode::OldestFirst),
            "priority-high" => Some(SortMode::PriorityHigh),
            "priority-low" => Some(SortMode::PriorityLow),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortMode::NewestFirst => "Newest first",
            SortMode::OldestFirst => "Oldest first",
            SortMode::PriorityHigh => "Priority high",
            SortMode::PriorityLow => "Priority low",
        }
    }

    /// Next mode in the cycle used by the TUI's sort key.
    pub fn next(self) -> SortMode {
        match self {
            SortMode::NewestFirst => SortMode::OldestFirst,
            SortMode::OldestFirst => SortMode::PriorityHigh,
            SortMode::PriorityHigh => SortMode::PriorityLow,
            SortMode::PriorityLow => SortMode::NewestFirst,
        }
    }
}
