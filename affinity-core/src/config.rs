//! Configuration for the affinity system.
//!
//! Maps directly to `affinity.toml`. Every field has a default, so an empty
//! document yields the production settings.

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffinityConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Affection scoring and streak tuning.
    #[serde(default)]
    pub affection: AffectionConfig,
    /// Fact lifecycle settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Loneliness / backoff DM loop.
    #[serde(default)]
    pub loneliness: LonelinessConfig,
    /// Proactive thought loop.
    #[serde(default)]
    pub proactive: ProactiveConfig,
    /// Conversation continuation.
    #[serde(default)]
    pub continuation: ContinuationConfig,
    /// Reminder queue.
    #[serde(default)]
    pub reminders: ReminderConfig,
    /// Persistence and vector memory.
    #[serde(default)]
    pub storage: StorageConfig,
    /// LLM integration settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Scheduler runtime settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AffinityConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `AffinityError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::AffinityError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Display name of the persona, used in prompts.
    #[serde(default = "default_persona")]
    pub persona_name: String,
    /// Persona timezone as a UTC offset in hours. Late-night bonuses, streak
    /// days and mood all use this clock.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

impl GeneralConfig {
    /// The persona's clock as a fixed offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.clamp(-23, 23) * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            persona_name: "Marin".to_string(),
            utc_offset_hours: 0,
        }
    }
}

/// Affection scoring, streaks and jealousy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectionConfig {
    /// Days without direct interaction before jealousy triggers.
    #[serde(default = "default_3_f64")]
    pub jealousy_threshold_days: f64,
    /// Signed affection change applied on jealousy.
    #[serde(default = "default_jealousy_penalty")]
    pub jealousy_penalty: i64,
    /// Probability of a bonus event per interaction.
    #[serde(default = "default_event_chance")]
    pub random_event_chance: f64,
    /// First persona-local hour counted as late night.
    #[serde(default = "default_23")]
    pub late_night_start_hour: u32,
    /// Persona-local hour at which late night ends (exclusive).
    #[serde(default = "default_4")]
    pub late_night_end_hour: u32,
    /// Streak length at which the streak multiplier saturates.
    #[serde(default = "default_30")]
    pub max_streak_days: u32,
    /// Penalty per lost streak day.
    #[serde(default = "default_50_i64")]
    pub streak_break_penalty_per_day: i64,
    /// Cap on the streak-break penalty.
    #[serde(default = "default_2500")]
    pub max_streak_break_penalty: i64,
    /// Drop below which the recovery arc speaks up.
    #[serde(default = "default_recovery")]
    pub recovery_drop_threshold: i64,
}

impl Default for AffectionConfig {
    fn default() -> Self {
        Self {
            jealousy_threshold_days: 3.0,
            jealousy_penalty: -100,
            random_event_chance: 0.05,
            late_night_start_hour: 23,
            late_night_end_hour: 4,
            max_streak_days: 30,
            streak_break_penalty_per_day: 50,
            max_streak_break_penalty: 2500,
            recovery_drop_threshold: -500,
        }
    }
}

/// Fact lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Facts older than this many days are archived to vector memory.
    #[serde(default = "default_7")]
    pub fact_aging_days: u32,
    /// Live fact count above which consolidation runs.
    #[serde(default = "default_20")]
    pub fact_summarization_threshold: usize,
    /// Hours between maintenance passes.
    #[serde(default = "default_24_f64")]
    pub maintenance_interval_hours: f64,
    /// Messages shorter than this are not mined for facts.
    #[serde(default = "default_10")]
    pub min_extraction_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            fact_aging_days: 7,
            fact_summarization_threshold: 20,
            maintenance_interval_hours: 24.0,
            min_extraction_chars: 10,
        }
    }
}

/// Loneliness / backoff DM loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LonelinessConfig {
    /// Hours a user must be inactive before a first DM.
    #[serde(default = "default_24_f64")]
    pub inactivity_threshold_hours: f64,
    /// Hours without any inbound message before the agent feels lonely.
    #[serde(default = "default_4_f64")]
    pub loneliness_threshold_hours: f64,
    /// Unanswered DMs after which a user is never picked again until reply.
    #[serde(default = "default_4")]
    pub max_dm_attempts: u32,
    /// Minutes between loop ticks.
    #[serde(default = "default_60")]
    pub check_interval_minutes: u64,
}

impl Default for LonelinessConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_hours: 24.0,
            loneliness_threshold_hours: 4.0,
            max_dm_attempts: 4,
            check_interval_minutes: 60,
        }
    }
}

/// Proactive thought loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    /// Minutes between loop ticks.
    #[serde(default = "default_120")]
    pub check_interval_minutes: u64,
    /// Minimum affection for a user to be a candidate.
    #[serde(default = "default_35000")]
    pub min_affection: u32,
    /// Users active within this many hours are skipped.
    #[serde(default = "default_4_f64")]
    pub recent_activity_hours: f64,
    /// Share of messages drawn from templates instead of the generator.
    #[serde(default = "default_template_share")]
    pub template_share: f64,
    /// Share of high-affection template messages at the top tiers.
    #[serde(default = "default_0_5")]
    pub high_affection_template_share: f64,
    /// Affection at which high-affection templates become available.
    #[serde(default = "default_90000")]
    pub high_affection_threshold: u32,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 120,
            min_affection: 35_000,
            recent_activity_hours: 4.0,
            template_share: 0.4,
            high_affection_template_share: 0.5,
            high_affection_threshold: 90_000,
        }
    }
}

/// Conversation continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationConfig {
    /// Minutes between due-thought checks.
    #[serde(default = "default_5")]
    pub check_interval_minutes: u64,
    /// Minutes of silence after which a conversation counts as ended.
    #[serde(default = "default_30")]
    pub idle_threshold_minutes: u32,
    /// Seconds between idle sweeps.
    #[serde(default = "default_60")]
    pub idle_sweep_seconds: u64,
    /// Max chars kept of the last user text and reply.
    #[serde(default = "default_200")]
    pub snippet_chars: usize,
    /// Max chars kept of the conversation summary.
    #[serde(default = "default_50")]
    pub summary_chars: usize,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 5,
            idle_threshold_minutes: 30,
            idle_sweep_seconds: 60,
            snippet_chars: 200,
            summary_chars: 50,
        }
    }
}

/// Reminder queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Seconds between due-reminder polls.
    #[serde(default = "default_60")]
    pub poll_interval_seconds: u64,
    /// Seconds a failed reminder is pushed back.
    #[serde(default = "default_3600")]
    pub retry_delay_seconds: i64,
    /// Hours after which reminders are dropped regardless of delivery.
    #[serde(default = "default_24_u32")]
    pub retention_hours: u32,
    /// Minutes between cleanup passes.
    #[serde(default = "default_60")]
    pub cleanup_interval_minutes: u64,
}

impl ReminderConfig {
    /// Retry backoff as a duration.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::seconds(self.retry_delay_seconds)
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            retry_delay_seconds: 3600,
            retention_hours: 24,
            cleanup_interval_minutes: 60,
        }
    }
}

/// Persistence and vector memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database.
    #[serde(default = "default_db_path")]
    pub sqlite_path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Cosine similarity at or above which an insert is a duplicate.
    #[serde(default = "default_0_8")]
    pub duplicate_threshold: f32,
    /// Minimum cosine similarity for search results.
    #[serde(default = "default_0_6")]
    pub similarity_threshold: f32,
    /// Conversation window length before trimming.
    #[serde(default = "default_20")]
    pub recent_messages_limit: usize,
    /// Entries kept after trimming the conversation window.
    #[serde(default = "default_15")]
    pub recent_messages_keep: usize,
    /// Entries held by the embedding cache.
    #[serde(default = "default_500")]
    pub embedding_cache_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "affinity.db".to_string(),
            wal_mode: true,
            duplicate_threshold: 0.8,
            similarity_threshold: 0.6,
            recent_messages_limit: 20,
            recent_messages_keep: 15,
            embedding_cache_size: 500,
        }
    }
}

/// LLM backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", or "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL of the provider API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Chat model.
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default = "default_1_0")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            request_timeout_ms: 15_000,
            max_retries: 2,
            temperature: 1.0,
        }
    }
}

/// Scheduler runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hours between affection decay sweeps.
    #[serde(default = "default_6_f64")]
    pub decay_interval_hours: f64,
    /// Minutes between mood re-evaluations.
    #[serde(default = "default_5")]
    pub mood_interval_minutes: u64,
    /// Max per-user jobs running at once within a tick.
    #[serde(default = "default_4_usize")]
    pub worker_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_interval_hours: 6.0,
            mood_interval_minutes: 5,
            worker_pool_size: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_persona() -> String { "Marin".to_string() }
fn default_db_path() -> String { "affinity.db".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_chat_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text".to_string() }
fn default_0_5() -> f64 { 0.5 }
fn default_0_6() -> f32 { 0.6 }
fn default_0_8() -> f32 { 0.8 }
fn default_1_0() -> f32 { 1.0 }
fn default_3_f64() -> f64 { 3.0 }
fn default_4_f64() -> f64 { 4.0 }
fn default_6_f64() -> f64 { 6.0 }
fn default_24_f64() -> f64 { 24.0 }
fn default_event_chance() -> f64 { 0.05 }
fn default_template_share() -> f64 { 0.4 }
fn default_jealousy_penalty() -> i64 { -100 }
fn default_recovery() -> i64 { -500 }
fn default_50_i64() -> i64 { 50 }
fn default_2500() -> i64 { 2500 }
fn default_3600() -> i64 { 3600 }
fn default_2() -> u32 { 2 }
fn default_4() -> u32 { 4 }
fn default_4_usize() -> usize { 4 }
fn default_5() -> u64 { 5 }
fn default_7() -> u32 { 7 }
fn default_10() -> usize { 10 }
fn default_15() -> usize { 15 }
fn default_20() -> usize { 20 }
fn default_23() -> u32 { 23 }
fn default_24_u32() -> u32 { 24 }
fn default_30() -> u32 { 30 }
fn default_50() -> usize { 50 }
fn default_60() -> u64 { 60 }
fn default_120() -> u64 { 120 }
fn default_200() -> usize { 200 }
fn default_500() -> usize { 500 }
fn default_timeout_ms() -> u64 { 15_000 }
fn default_35000() -> u32 { 35_000 }
fn default_90000() -> u32 { 90_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = AffinityConfig::from_toml("").expect("empty config parses");
        assert_eq!(cfg.memory.fact_aging_days, 7);
        assert_eq!(cfg.memory.fact_summarization_threshold, 20);
        assert_eq!(cfg.loneliness.max_dm_attempts, 4);
        assert_eq!(cfg.affection.jealousy_penalty, -100);
        assert!((cfg.storage.duplicate_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(cfg.reminders.retry_delay(), Duration::hours(1));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg = AffinityConfig::from_toml(
            r#"
            [general]
            persona_name = "Aoi"
            utc_offset_hours = 9

            [memory]
            fact_aging_days = 14
            "#,
        )
        .expect("partial config parses");
        assert_eq!(cfg.general.persona_name, "Aoi");
        assert_eq!(cfg.general.offset().local_minus_utc(), 9 * 3600);
        assert_eq!(cfg.memory.fact_aging_days, 14);
        assert_eq!(cfg.memory.fact_summarization_threshold, 20);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = AffinityConfig::from_toml("[memory\nfact_aging_days = ").expect_err("must fail");
        assert!(matches!(err, crate::AffinityError::Config(_)));
    }
}
