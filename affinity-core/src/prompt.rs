//! Prompt templates for every generation request.
//!
//! Templates use `{key}` placeholders filled by [`render_template`]. The
//! built-in set can be overridden per prompt by TOML files on disk:
//!
//! ```toml
//! [prompt]
//! version = "2"
//! max_tokens = 120
//! temperature = 0.9
//! system = "..."
//! user = "..."
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{AffinityError, Result};

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

/// Behavior classification.
pub const CLASSIFY_SYSTEM: &str = "You analyze message sentiment toward a chatbot. Be accurate: most messages are neutral. Only flag strong signals. Output ONLY valid JSON.";

/// Behavior classification, user turn.
pub const CLASSIFY_USER: &str = r#"Analyze this message sent to {persona} and determine its emotional tone.

Message: "{text}"

Output a JSON object with a single field "sentiment" that is one of:

POSITIVE: "compliment", "flirty", "enthusiastic", "supportive", "curious", "playful", "grateful", "affectionate", "vulnerable"
NEGATIVE: "dismissive", "dry_response", "impatient", "passive_aggressive", "disinterested", "rude", "creepy"
NEUTRAL: "neutral" for normal casual conversation, questions, chitchat

Output ONLY valid JSON. Example: {"sentiment": "neutral"}"#;

/// Fact extraction.
pub const EXTRACT_SYSTEM: &str = r#"You extract durable personal facts about the user from a conversation.
Save information that would be useful to remember in future conversations.
Output ONLY valid JSON with "add", "remove" and "reminders" arrays."#;

/// Fact extraction, user turn.
pub const EXTRACT_USER: &str = r#"Current profile:
{profile}

Current time: {now}

New interaction:
{user_name}: "{user_text}"
{persona}: "{reply_text}"

Save to "add": where they live, work or study, hobbies, relationships and pets, strong preferences, life events.
Do not save temporary states, one-off reactions, questions or greetings.
If something contradicts an existing fact, put the new fact in "add" and the old one in "remove".
If they mention a future event with a timeframe, add a reminder with "text" and "delay_seconds" until the event.

Respond with ONLY a JSON object. Example: {"add": ["Lives in Tokyo"], "remove": [], "reminders": []}"#;

/// Fact consolidation.
pub const CONSOLIDATE_SYSTEM: &str = "You are a fact consolidation assistant. Output ONLY JSON.";

/// Fact consolidation, user turn.
pub const CONSOLIDATE_USER: &str = r#"Merge related facts and remove redundancy while preserving all unique information.

Current facts ({count} total):
{facts}

Consolidate these into approximately {target} facts.
- Combine similar facts into one
- Keep distinct facts separate
- Use concise language

Return ONLY a JSON array of strings. Example: ["fact 1", "fact 2"]"#;

/// Conversation summary.
pub const SUMMARIZE_SYSTEM: &str = "You summarize conversations in 5-10 words. Output only the summary.";

/// Conversation summary, user turn.
pub const SUMMARIZE_USER: &str = r#"Summarize this exchange in 5-10 words. Focus on the topic, not the emotions.

User: "{user_text}"
{persona}: "{reply_text}"

Output ONLY the brief topic summary."#;

const OUTREACH_RULES: &str = "Rules:
- 1-2 sentences at most.
- Mostly lowercase, casual texting.
- No emojis and no roleplay actions.
- Sound like a real text message.";

/// Loneliness check-in.
pub const LONELINESS_SYSTEM: &str = "You are {persona}. You haven't talked to anyone in a while and decide to text {user_name}.";

/// Loneliness check-in, user turn.
pub const LONELINESS_USER: &str = "Relationship: {tier}
{instruction}

Attempt: {tone}

Things you remember about them:
{facts}

Write a spontaneous message to start a conversation. Match both the relationship and the attempt.

{rules}";

/// Spontaneous proactive message.
pub const PROACTIVE_SYSTEM: &str = "You are {persona}. {user_name} just popped into your head and you want to text them.";

/// Spontaneous proactive message, user turn.
pub const PROACTIVE_USER: &str = "Relationship: {tier}
{instruction}

Things you remember about them:
{facts}

Write a short spontaneous message, as if you just thought of them.

{rules}";

/// Conversation continuation.
pub const CONTINUATION_SYSTEM: &str = "You are {persona}. You talked to {user_name} {time_context} and kept thinking about it.";

/// Conversation continuation, user turn.
pub const CONTINUATION_USER: &str = r#"Relationship: {tier}
{instruction}

Topic: {summary}
What they said: "{user_text}"
What you replied: "{reply_text}"

Write a short message that comes back to the conversation naturally: a new thought, something you forgot to say, or just that you kept thinking about them.

{rules}"#;

/// Reminder delivery.
pub const REMINDER_SYSTEM: &str = "You are {persona}.";

/// Reminder delivery, user turn.
pub const REMINDER_USER: &str = r#"You are reminding {user_name} about: "{text}".

Act like a friend checking in. Don't say "I just remembered" or "You have an event".

{rules}"#;

/// Replace `{key}` with its value for every pair in `vars`.
///
/// Unknown placeholders are left untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptEngine
// ---------------------------------------------------------------------------

/// Identifies a prompt by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Behavior classification of an inbound message.
    Classify,
    /// Fact and reminder extraction from one exchange.
    ExtractFacts,
    /// Fact list consolidation.
    ConsolidateFacts,
    /// Short topic summary of one exchange.
    Summarize,
    /// Check-in after a long silence.
    Loneliness,
    /// Spontaneous message to a close user.
    Proactive,
    /// Follow-up after a conversation went idle.
    Continuation,
    /// Reminder delivery.
    Reminder,
}

impl PromptId {
    /// All prompt ids.
    pub const ALL: [PromptId; 8] = [
        Self::Classify,
        Self::ExtractFacts,
        Self::ConsolidateFacts,
        Self::Summarize,
        Self::Loneliness,
        Self::Proactive,
        Self::Continuation,
        Self::Reminder,
    ];

    /// Stable snake-case name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::ExtractFacts => "extract_facts",
            Self::ConsolidateFacts => "consolidate_facts",
            Self::Summarize => "summarize",
            Self::Loneliness => "loneliness",
            Self::Proactive => "proactive",
            Self::Continuation => "continuation",
            Self::Reminder => "reminder",
        }
    }

    /// TOML filename for an override.
    #[must_use]
    pub fn filename(self) -> String {
        format!("{}.toml", self.name())
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PromptId {
    type Err = AffinityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| AffinityError::Config(format!("unknown prompt id: '{s}'")))
    }
}

#[derive(Debug, Deserialize)]
struct TomlPromptFile {
    prompt: PromptTemplate,
}

/// A ready-to-render prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    /// Version tag.
    pub version: String,
    /// Output token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature override, if any.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// System message template.
    pub system: String,
    /// User message template.
    pub user: String,
}

fn default_max_tokens() -> u32 {
    256
}

impl PromptTemplate {
    fn builtin(system: &str, user: &str, max_tokens: u32, temperature: Option<f32>) -> Self {
        Self {
            version: "builtin".into(),
            max_tokens,
            temperature,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// The loaded prompt set.
///
/// ```
/// use affinity_core::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::builtin();
/// let (system, user) = engine
///     .render(PromptId::Summarize, &[("persona", "Marin"), ("user_text", "hi"), ("reply_text", "hey")])
///     .expect("builtin prompt");
/// assert!(system.contains("5-10 words"));
/// assert!(user.contains("Marin: \"hey\""));
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl PromptEngine {
    /// The compiled-in prompt set.
    #[must_use]
    pub fn builtin() -> Self {
        let templates = HashMap::from([
            (PromptId::Classify, PromptTemplate::builtin(CLASSIFY_SYSTEM, CLASSIFY_USER, 32, Some(0.0))),
            (PromptId::ExtractFacts, PromptTemplate::builtin(EXTRACT_SYSTEM, EXTRACT_USER, 512, Some(0.2))),
            (
                PromptId::ConsolidateFacts,
                PromptTemplate::builtin(CONSOLIDATE_SYSTEM, CONSOLIDATE_USER, 1024, Some(0.2)),
            ),
            (PromptId::Summarize, PromptTemplate::builtin(SUMMARIZE_SYSTEM, SUMMARIZE_USER, 32, Some(0.3))),
            (PromptId::Loneliness, PromptTemplate::builtin(LONELINESS_SYSTEM, LONELINESS_USER, 120, None)),
            (PromptId::Proactive, PromptTemplate::builtin(PROACTIVE_SYSTEM, PROACTIVE_USER, 120, None)),
            (
                PromptId::Continuation,
                PromptTemplate::builtin(CONTINUATION_SYSTEM, CONTINUATION_USER, 120, None),
            ),
            (PromptId::Reminder, PromptTemplate::builtin(REMINDER_SYSTEM, REMINDER_USER, 120, None)),
        ]);
        Self { templates }
    }

    /// Built-in set with any `<name>.toml` files in `dir` layered on top.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Config`] if a present file cannot be parsed,
    /// or [`AffinityError::Io`] if it cannot be read.
    pub fn with_overrides(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut engine = Self::builtin();
        for id in PromptId::ALL {
            let path = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| AffinityError::Config(format!("{}: {e}", path.display())))?;
            tracing::info!(prompt = %id, version = %parsed.prompt.version, "Loaded prompt override");
            engine.templates.insert(id, parsed.prompt);
        }
        Ok(engine)
    }

    /// Template for `id`.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render `(system, user)` for `id`. The shared outreach rules are
    /// available as `{rules}`.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Config`] if the template is not loaded.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String)> {
        let tpl = self
            .get(id)
            .ok_or_else(|| AffinityError::Config(format!("prompt template '{id}' not loaded")))?;
        let mut all: Vec<(&str, &str)> = vars.to_vec();
        all.push(("rules", OUTREACH_RULES));
        Ok((render_template(&tpl.system, &all), render_template(&tpl.user, &all)))
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}
