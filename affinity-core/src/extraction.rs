//! Parsing of structured generator output.
//!
//! Generators wrap JSON in code fences or chatter around it often enough
//! that every parser here first isolates the JSON payload. Anything that
//! still fails to parse is reported as `None`, which callers treat as a
//! no-op.

use serde::Deserialize;

/// Strip a surrounding Markdown code fence (with or without a language tag).
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = rest.find('\n').map_or(rest, |i| &rest[i + 1..]);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Slice from the first `open` to the last `close`, inclusive.
fn isolate(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

/// A reminder requested by the extraction prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReminderRequest {
    /// What to remind the user about.
    pub text: String,
    /// Seconds from now until the reminder is due.
    #[serde(default)]
    pub delay_seconds: i64,
}

/// Facts to add and remove, plus reminders, from one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FactDelta {
    /// New facts.
    #[serde(default)]
    pub add: Vec<String>,
    /// Facts to drop, matched by exact text.
    #[serde(default)]
    pub remove: Vec<String>,
    /// Reminders to queue.
    #[serde(default)]
    pub reminders: Vec<ReminderRequest>,
}

impl FactDelta {
    /// Parse generator output. `None` if no JSON object can be read.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let body = strip_code_fence(raw);
        let json = isolate(body, '{', '}')?;
        let mut delta: Self = serde_json::from_str(json).ok()?;
        delta.add.retain(|f| !f.trim().is_empty());
        delta.remove.retain(|f| !f.trim().is_empty());
        Some(delta)
    }

    /// No facts to add or remove.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Parse a consolidation result: a JSON array of non-empty strings.
///
/// Returns `None` on malformed output or an empty list, so a bad response
/// can never wipe a fact list.
#[must_use]
pub fn parse_consolidation(raw: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(raw);
    let json = isolate(body, '[', ']')?;
    let facts: Vec<String> = serde_json::from_str(json).ok()?;
    let facts: Vec<String> = facts
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    (!facts.is_empty()).then_some(facts)
}

/// Clean a one-line summary: first line, surrounding quotes removed.
#[must_use]
pub fn clean_summary(raw: &str) -> String {
    raw.trim()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Truncate to `max` characters, ending with `...` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_delta_parses() {
        let raw = "```json\n{\"add\": [\"Lives in Osaka\"], \"remove\": [\"Lives in Tokyo\"], \"reminders\": [{\"text\": \"exam\", \"delay_seconds\": 7200}]}\n```";
        let delta = FactDelta::parse(raw).expect("parses");
        assert_eq!(delta.add, vec!["Lives in Osaka"]);
        assert_eq!(delta.remove, vec!["Lives in Tokyo"]);
        assert_eq!(delta.reminders[0].delay_seconds, 7200);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let delta = FactDelta::parse("sure! {\"add\": [\"Has a cat\"]} hope that helps").expect("parses");
        assert_eq!(delta.add, vec!["Has a cat"]);
        assert!(delta.remove.is_empty());
        assert!(delta.reminders.is_empty());
    }

    #[test]
    fn garbage_is_none() {
        assert!(FactDelta::parse("no json here").is_none());
        assert!(FactDelta::parse("{\"add\": \"not a list\"}").is_none());
        assert!(FactDelta::parse("").is_none());
    }

    #[test]
    fn blank_facts_are_dropped() {
        let delta = FactDelta::parse("{\"add\": [\"  \", \"Plays bass\"], \"remove\": [\"\"]}").expect("parses");
        assert_eq!(delta.add, vec!["Plays bass"]);
        assert!(delta.remove.is_empty());
        assert!(!delta.is_empty());
    }

    #[test]
    fn consolidation_array() {
        let facts = parse_consolidation("```\n[\"Likes cats and dogs\", \" Works nights \"]\n```").expect("parses");
        assert_eq!(facts, vec!["Likes cats and dogs", "Works nights"]);
        assert!(parse_consolidation("[]").is_none());
        assert!(parse_consolidation("{\"facts\": 1}").is_none());
        assert!(parse_consolidation("[\"unterminated").is_none());
    }

    #[test]
    fn summary_and_truncation() {
        assert_eq!(clean_summary("\"weekend hiking plans\"\nextra"), "weekend hiking plans");
        assert_eq!(clean_summary(""), "");
        assert_eq!(truncate_chars("short", 10), "short");
        let cut = truncate_chars(&"x".repeat(60), 50);
        assert_eq!(cut.chars().count(), 50);
        assert!(cut.ends_with("..."));
    }
}
