//! Workspace configuration loaded from `.evidex/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Values are checked by [`EvidexConfig::validate`] after parsing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidexConfig {
    /// Page-text cache settings.
    #[serde(default)]
    pub cache: CacheSection,
    /// Table detection thresholds.
    #[serde(default)]
    pub tables: TableSection,
    /// Figure extraction thresholds.
    #[serde(default)]
    pub figures: FigureSection,
    /// Content classifier settings.
    #[serde(default)]
    pub classifier: ClassifierSection,
    /// Circuit breaker, retry and rate limit settings.
    #[serde(default)]
    pub resilience: ResilienceSection,
    /// Agent request and scoring settings.
    #[serde(default)]
    pub agents: AgentSection,
    /// Backend selection.
    #[serde(default)]
    pub backend: BackendSection,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Maximum number of pages whose text is kept (default: 50).
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
}

fn default_max_cache_size() -> usize {
    50
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { max_cache_size: default_max_cache_size() }
    }
}

/// `[tables]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSection {
    /// Max vertical distance from a row's anchor for a glyph to join it.
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f64,
    /// Horizontal gap below which neighbouring glyphs merge into one segment.
    #[serde(default = "default_segment_gap")]
    pub segment_gap: f64,
    /// Max vertical gap between table rows, as a multiple of the median glyph height.
    #[serde(default = "default_row_gap_factor")]
    pub row_gap_factor: f64,
    /// Max distance between segment x-starts in the same column.
    #[serde(default = "default_column_tolerance")]
    pub column_tolerance: f64,
    /// Minimum rows for a candidate region.
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

fn default_row_tolerance() -> f64 {
    7.0
}

fn default_segment_gap() -> f64 {
    8.0
}

fn default_row_gap_factor() -> f64 {
    3.0
}

fn default_column_tolerance() -> f64 {
    15.0
}

fn default_min_rows() -> usize {
    4
}

impl Default for TableSection {
    fn default() -> Self {
        Self {
            row_tolerance: default_row_tolerance(),
            segment_gap: default_segment_gap(),
            row_gap_factor: default_row_gap_factor(),
            column_tolerance: default_column_tolerance(),
            min_rows: default_min_rows(),
        }
    }
}

/// `[figures]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureSection {
    /// Figures with a smaller on-page area are discarded (default: 50×50).
    #[serde(default = "default_min_figure_area")]
    pub min_figure_area: f64,
}

fn default_min_figure_area() -> f64 {
    2500.0
}

impl Default for FigureSection {
    fn default() -> Self {
        Self { min_figure_area: default_min_figure_area() }
    }
}

/// `[classifier]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// Keyword hits required before a category is assigned.
    #[serde(default = "default_min_keyword_matches")]
    pub min_keyword_matches: usize,
}

fn default_min_keyword_matches() -> usize {
    2
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self { min_keyword_matches: default_min_keyword_matches() }
    }
}

/// `[resilience]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceSection {
    /// Consecutive failed invocations that open a circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls, in milliseconds.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    /// Successful trials needed to close a half-open circuit.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Attempts per invocation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound on any single retry delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Deadline for one attempt, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Token bucket size per agent. `0` disables local rate limiting.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout_ms() -> u64 {
    60_000
}

fn default_success_threshold() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_rate_limit_per_minute() -> u32 {
    60
}

impl Default for ResilienceSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_ms: default_open_timeout_ms(),
            success_threshold: default_success_threshold(),
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
        }
    }
}

impl ResilienceSection {
    /// Open-circuit duration.
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// First retry delay.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Retry delay cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Per-attempt deadline.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// `[agents]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    /// Confidence at or above which a parsed response counts as validated.
    #[serde(default = "default_validation_threshold")]
    pub validation_threshold: f64,
    /// Page context longer than this many characters is truncated.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Sampling temperature sent with every agent request.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_validation_threshold() -> f64 {
    0.5
}

fn default_max_context_chars() -> usize {
    15_000
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            validation_threshold: default_validation_threshold(),
            max_context_chars: default_max_context_chars(),
            temperature: default_temperature(),
        }
    }
}

/// `[backend]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSection {
    /// Primary backend type ("gemini", "anthropic" or "mock").
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Primary model id.
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    /// Optional fallback backend type, used when the primary fails retryably.
    #[serde(default = "default_fallback")]
    pub fallback: Option<String>,
    /// Fallback model id.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Gemini API key. Falls back to `GEMINI_API_KEY`.
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Anthropic API key. Falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
}

fn default_primary() -> String {
    "gemini".to_string()
}

fn default_primary_model() -> String {
    "gemini-2.5-flash".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_fallback() -> Option<String> {
    Some("anthropic".to_string())
}

fn default_fallback_model() -> String {
    "claude-sonnet-4-5".to_string()
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            primary_model: default_primary_model(),
            fallback: default_fallback(),
            fallback_model: default_fallback_model(),
            gemini_api_key: None,
            anthropic_api_key: None,
        }
    }
}

impl BackendSection {
    /// Gemini key from the file, else from `GEMINI_API_KEY`.
    #[must_use]
    pub fn resolve_gemini_key(&self) -> Option<String> {
        self.gemini_api_key.clone().or_else(|| non_empty_env("GEMINI_API_KEY"))
    }

    /// Anthropic key from the file, else from `ANTHROPIC_API_KEY`.
    #[must_use]
    pub fn resolve_anthropic_key(&self) -> Option<String> {
        self.anthropic_api_key.clone().or_else(|| non_empty_env("ANTHROPIC_API_KEY"))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl EvidexConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_cache_size == 0 {
            return Err(ConfigError::invalid("cache.max_cache_size", "must be at least 1"));
        }

        let t = &self.tables;
        for (field, value) in [
            ("tables.row_tolerance", t.row_tolerance),
            ("tables.segment_gap", t.segment_gap),
            ("tables.row_gap_factor", t.row_gap_factor),
            ("tables.column_tolerance", t.column_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, "must be a positive number"));
            }
        }
        if t.min_rows < 4 {
            return Err(ConfigError::invalid("tables.min_rows", "must be at least 4"));
        }

        if !(self.figures.min_figure_area.is_finite() && self.figures.min_figure_area >= 0.0) {
            return Err(ConfigError::invalid("figures.min_figure_area", "must not be negative"));
        }

        if self.classifier.min_keyword_matches == 0 {
            return Err(ConfigError::invalid("classifier.min_keyword_matches", "must be at least 1"));
        }

        let r = &self.resilience;
        if r.failure_threshold == 0 {
            return Err(ConfigError::invalid("resilience.failure_threshold", "must be at least 1"));
        }
        if r.success_threshold == 0 {
            return Err(ConfigError::invalid("resilience.success_threshold", "must be at least 1"));
        }
        if r.max_attempts == 0 {
            return Err(ConfigError::invalid("resilience.max_attempts", "must be at least 1"));
        }
        if r.call_timeout_ms == 0 {
            return Err(ConfigError::invalid("resilience.call_timeout_ms", "must be greater than 0"));
        }
        if !(r.backoff_multiplier.is_finite() && r.backoff_multiplier >= 1.0) {
            return Err(ConfigError::invalid("resilience.backoff_multiplier", "must be at least 1.0"));
        }
        if r.max_delay_ms < r.initial_delay_ms {
            return Err(ConfigError::invalid(
                "resilience.max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }

        let a = &self.agents;
        if !(0.0..=1.0).contains(&a.validation_threshold) {
            return Err(ConfigError::invalid("agents.validation_threshold", "must be within 0.0..=1.0"));
        }
        if a.max_context_chars == 0 {
            return Err(ConfigError::invalid("agents.max_context_chars", "must be at least 1"));
        }

        Ok(())
    }
}

/// Path of the config file for a workspace.
#[must_use]
pub fn config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".evidex").join("config.toml")
}

/// Load configuration from `.evidex/config.toml` under `workspace_root`.
///
/// A missing file yields the defaults; missing sections or fields take their
/// defaults too.
///
/// # Errors
/// Returns an error if the file exists but cannot be read, parsed, or fails
/// validation.
pub fn load_config(workspace_root: &Path) -> Result<EvidexConfig, ConfigError> {
    let path = config_path(workspace_root);

    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(EvidexConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: EvidexConfig = toml::from_str(&content)?;
    config.validate()?;

    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}
