//! Settings file.
//!
//! ```toml
//! [database]
//! path = "data/recipes.db"
//!
//! [input]
//! dir = "diet-plans"
//!
//! [extraction]
//! max_retries = 3
//! call_delay_ms = 1000
//! default_meal_type = "lunch"
//!
//! [[providers]]
//! name = "openai"
//! model = "gpt-4.1-nano"
//! max_pages_per_chunk = 8
//! ```
//!
//! Every section is optional; missing values take the [`HarvestConfig`]
//! defaults. CLI flags override what the file says.

use crate::config::{select_provider, HarvestConfig, ProviderSettings};
use crate::error::HarvestError;
use crate::model::MealType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("recipes.db")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// The file-level mirror of [`HarvestConfig`]. Unset fields keep its defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionSettings {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub call_delay_ms: Option<u64>,
    pub api_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub system_prompt: Option<String>,
    pub default_meal_type: Option<MealType>,
    pub max_rendered_pixels: Option<u32>,
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HarvestError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => HarvestError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => HarvestError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let settings = Self::parse(&content).map_err(|e| match e {
            HarvestError::InvalidConfiguration(msg) => {
                HarvestError::InvalidConfiguration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        debug!(
            "Loaded settings from {} ({} provider(s))",
            path.display(),
            settings.providers.len()
        );
        Ok(settings)
    }

    /// Parse and validate settings text.
    pub fn parse(content: &str) -> Result<Self, HarvestError> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| HarvestError::InvalidConfiguration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(HarvestError::InvalidConfiguration(
                "database.path must not be empty".into(),
            ));
        }

        if let Some(t) = self.extraction.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(HarvestError::InvalidConfiguration(format!(
                    "extraction.temperature must be in [0.0, 2.0], got {t}"
                )));
            }
        }

        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(HarvestError::InvalidConfiguration(
                    "every [[providers]] entry needs a name".into(),
                ));
            }
        }

        // An empty list is fine here: `run` may get the provider from flags.
        if !self.providers.is_empty() {
            select_provider(&self.providers)?;
        }

        self.to_harvest_config().map(|_| ())
    }

    /// Build the run configuration from the `[extraction]` section.
    pub fn to_harvest_config(&self) -> Result<HarvestConfig, HarvestError> {
        let e = &self.extraction;
        let mut builder = HarvestConfig::builder();
        if let Some(v) = e.max_retries {
            builder = builder.max_retries(v);
        }
        if let Some(v) = e.retry_delay_ms {
            builder = builder.retry_delay_ms(v);
        }
        if let Some(v) = e.call_delay_ms {
            builder = builder.call_delay_ms(v);
        }
        if let Some(v) = e.api_timeout_secs {
            builder = builder.api_timeout_secs(v);
        }
        if let Some(v) = e.temperature {
            builder = builder.temperature(v);
        }
        if let Some(v) = e.max_tokens {
            builder = builder.max_tokens(v);
        }
        if let Some(v) = &e.system_prompt {
            builder = builder.system_prompt(v.clone());
        }
        if let Some(v) = e.default_meal_type {
            builder = builder.default_meal_type(v);
        }
        if let Some(v) = e.max_rendered_pixels {
            builder = builder.max_rendered_pixels(v);
        }
        builder.build()
    }

    /// Starter file written by `recipe-harvest init`.
    pub fn template() -> String {
        let mut provider = ProviderSettings::new("openai");
        provider.model = Some(crate::pipeline::llm::default_model("openai").to_string());
        let settings = Settings {
            providers: vec![provider],
            ..Settings::default()
        };
        toml::to_string_pretty(&settings).unwrap_or_default()
    }
}

/// Export each provider's `credential` as its API key variable.
///
/// Variables that are already set are left alone. Returns the names of the
/// variables that were set. Call before any other thread is started.
pub fn export_credentials(providers: &[ProviderSettings]) -> Vec<String> {
    let mut exported = Vec::new();
    for provider in providers {
        let Some(credential) = provider.credential.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let var = provider.api_key_var();
        if std::env::var_os(&var).is_some() {
            debug!("{var} already set; ignoring credential from settings");
            continue;
        }
        std::env::set_var(&var, credential);
        exported.push(var);
    }
    exported
}
