//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Assistant, EngineSettings};
use crate::gateway::{Gateway, OfflineGateway, OpenAiGateway, OpenAiGatewayConfig};
use crate::store::{MemorySessionStore, SessionStore, SqliteSessionStore, StoreError};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:1234/v1";
pub const DEFAULT_API_KEY: &str = "lm-studio";
pub const DEFAULT_MODEL: &str = "devstral-small-2505";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: OpenAiGatewayConfig,
    /// Skip the backend entirely; every step uses its fallback.
    pub offline: bool,
    pub engine: EngineSettings,
    /// Durable session store location. `None` keeps sessions in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable numbers fall back to
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Lookup(lookup);

        let defaults = EngineSettings::default();
        let engine = EngineSettings {
            max_rounds: env.parsed("CLARITA_MAX_ROUNDS").unwrap_or(defaults.max_rounds),
            max_questions: env
                .parsed("CLARITA_MAX_QUESTIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_questions),
        };

        Self {
            gateway: OpenAiGatewayConfig {
                api_base: env
                    .text("CLARITA_LLM_API_BASE")
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                api_key: Some(
                    env.text("CLARITA_LLM_API_KEY")
                        .unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
                ),
                model: env
                    .text("CLARITA_LLM_MODEL")
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout: Duration::from_secs(
                    env.parsed("CLARITA_LLM_TIMEOUT_SECS")
                        .unwrap_or(DEFAULT_TIMEOUT_SECS),
                ),
                temperature: env
                    .parsed("CLARITA_LLM_TEMPERATURE")
                    .unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: env
                    .parsed("CLARITA_LLM_MAX_TOKENS")
                    .unwrap_or(DEFAULT_MAX_TOKENS),
            },
            offline: env.text("CLARITA_OFFLINE").is_some_and(|v| is_truthy(&v)),
            engine,
            db_path: env.text("CLARITA_DB_PATH").map(PathBuf::from),
        }
    }

    /// The configured gateway. A backend that cannot be set up degrades to
    /// [`OfflineGateway`] instead of failing startup.
    pub fn build_gateway(&self) -> Arc<dyn Gateway> {
        if self.offline {
            tracing::info!("Offline mode: using deterministic fallbacks only");
            return Arc::new(OfflineGateway);
        }

        match OpenAiGateway::new(self.gateway.clone()) {
            Ok(gateway) => {
                tracing::info!(
                    api_base = %self.gateway.api_base,
                    model = gateway.model(),
                    "Using OpenAI-compatible gateway"
                );
                Arc::new(gateway)
            }
            Err(e) => {
                tracing::warn!(reason = %e, "Gateway setup failed, running offline");
                Arc::new(OfflineGateway)
            }
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn SessionStore>, StoreError> {
        match &self.db_path {
            Some(path) => {
                let store = SqliteSessionStore::open(path.clone())?;
                store.migrate()?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemorySessionStore::new())),
        }
    }

    pub fn build_assistant(&self) -> Result<Assistant, StoreError> {
        Ok(Assistant::new(self.build_gateway(), self.open_store()?, self.engine))
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn text(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.text(key)?;
        let value = raw.trim().parse().ok();
        if value.is_none() {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
        }
        value
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
