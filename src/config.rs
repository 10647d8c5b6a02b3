//! Configuration types for a harvest run.
//!
//! Run behaviour is controlled through [`HarvestConfig`], built via its
//! [`HarvestConfigBuilder`]. Which AI provider answers, and how many pages it
//! can take per request, lives in [`ProviderSettings`]; [`select_provider`]
//! picks the one to use from a configured list.

use crate::error::HarvestError;
use crate::model::MealType;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for one harvest run.
///
/// Built via [`HarvestConfig::builder()`] or using [`HarvestConfig::default()`].
///
/// # Example
/// ```rust
/// use recipe_harvest::{HarvestConfig, MealType};
///
/// let config = HarvestConfig::builder()
///     .max_retries(5)
///     .call_delay_ms(250)
///     .default_meal_type(MealType::Dinner)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Clone)]
pub struct HarvestConfig {
    /// Maximum retry attempts on a transient provider failure. Default: 3.
    ///
    /// Rejected requests (400) and refused credentials are never retried.
    pub max_retries: u32,

    /// Fixed wait between retry attempts of the same chunk, in milliseconds. Default: 1000.
    pub retry_delay_ms: u64,

    /// Wait inserted between successive provider calls, in milliseconds. Default: 1000.
    ///
    /// Not applied before the first call of a run.
    pub call_delay_ms: u64,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per chunk. Default: 8192.
    ///
    /// A chunk of a dense diet plan easily holds a dozen recipes; truncated JSON
    /// is only partly recoverable by salvage.
    pub max_tokens: usize,

    /// Custom extraction instruction. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub system_prompt: Option<String>,

    /// Category for recipes whose meal-type label is missing or unrecognised. Default: Lunch.
    pub default_meal_type: MealType,

    /// Longest edge, in pixels, of page renders sent to image-only providers. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Receives push events as the run advances. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            call_delay_ms: 1000,
            api_timeout_secs: 60,
            temperature: 0.1,
            max_tokens: 8192,
            system_prompt: None,
            default_meal_type: MealType::Lunch,
            max_rendered_pixels: 2000,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("call_delay_ms", &self.call_delay_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("default_meal_type", &self.default_meal_type)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn HarvestProgressCallback>"),
            )
            .finish()
    }
}

impl HarvestConfig {
    /// Create a new builder for `HarvestConfig`.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn call_delay_ms(mut self, ms: u64) -> Self {
        self.config.call_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn default_meal_type(mut self, meal_type: MealType) -> Self {
        self.config.default_meal_type = meal_type;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarvestConfig, HarvestError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(HarvestError::InvalidConfiguration(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(HarvestError::InvalidConfiguration(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Provider settings ────────────────────────────────────────────────────

fn default_priority() -> u32 {
    100
}

fn default_max_pages() -> usize {
    10
}

/// One configured AI provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name understood by `edgequake-llm` ("openai", "anthropic", "gemini", ...).
    pub name: String,
    /// API key. Exported to the provider's key variable by the CLI.
    #[serde(default)]
    pub credential: Option<String>,
    /// Model identifier; provider default when absent.
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides priority when set. At most one provider may be active.
    #[serde(default)]
    pub active: bool,
    /// Lower is preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_chunk: usize,
    /// Send page ranges as PDF documents instead of rendered page images.
    #[serde(default)]
    pub supports_direct_pdf: bool,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("active", &self.active)
            .field("priority", &self.priority)
            .field("max_pages_per_chunk", &self.max_pages_per_chunk)
            .field("supports_direct_pdf", &self.supports_direct_pdf)
            .finish()
    }
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: None,
            model: None,
            active: false,
            priority: default_priority(),
            max_pages_per_chunk: default_max_pages(),
            supports_direct_pdf: false,
        }
    }

    /// Environment variable the provider reads its API key from.
    pub fn api_key_var(&self) -> String {
        match self.name.to_ascii_lowercase().as_str() {
            "openai" => "OPENAI_API_KEY".to_string(),
            "anthropic" => "ANTHROPIC_API_KEY".to_string(),
            "gemini" | "google" => "GEMINI_API_KEY".to_string(),
            "mistral" => "MISTRAL_API_KEY".to_string(),
            other => format!(
                "{}_API_KEY",
                other.to_ascii_uppercase().replace(['-', ' '], "_")
            ),
        }
    }
}

/// Pick the provider for a run.
///
/// The active provider wins; without one, the lowest `priority` wins and ties
/// go to the first declared entry.
pub fn select_provider(providers: &[ProviderSettings]) -> Result<&ProviderSettings, HarvestError> {
    if providers.is_empty() {
        return Err(HarvestError::InvalidConfiguration(
            "no AI provider configured".into(),
        ));
    }

    let active: Vec<&ProviderSettings> = providers.iter().filter(|p| p.active).collect();
    let chosen = match active.as_slice() {
        [one] => *one,
        [] => providers
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| (p.priority, *i))
            .map(|(_, p)| p)
            .ok_or_else(|| HarvestError::Internal("empty provider list".into()))?,
        many => {
            let names: Vec<&str> = many.iter().map(|p| p.name.as_str()).collect();
            return Err(HarvestError::InvalidConfiguration(format!(
                "only one provider may be active, found {}: {}",
                many.len(),
                names.join(", ")
            )));
        }
    };

    if chosen.max_pages_per_chunk == 0 {
        return Err(HarvestError::InvalidConfiguration(format!(
            "provider '{}': max_pages_per_chunk must be ≥ 1",
            chosen.name
        )));
    }
    Ok(chosen)
}
