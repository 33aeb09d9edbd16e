/*!
 * Delay Configuration
 *
 * Per-event upper bounds for fault-injection sleeps, loadable from JSON,
 * from a file or from the environment.
 */

use super::types::EventType;
use crate::core::limits::{
    DEFAULT_MAX_DELAY_US, ENV_CONFIG_FILE, ENV_DELAY_PREFIX, ENV_DELAY_SUFFIX, ENV_MAX_DELAY,
    MAX_DELAY_BOUND_US,
};
use crate::core::{Micros, SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Maximum sleeping time per event type
///
/// Events without an entry fall back to the `standard` bound.
///
/// ```
/// use synchro::{DelayConfig, EventType};
///
/// let config: DelayConfig = r#"{ "standard": 50, "mutex_lock": 200 }"#.parse().unwrap();
/// assert_eq!(config.bound(EventType::MutexLock), 200);
/// assert_eq!(config.bound(EventType::SemaphoreAcquire), 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelayConfig {
    bounds: BTreeMap<EventType, Micros>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        let mut bounds = BTreeMap::new();
        bounds.insert(EventType::Standard, DEFAULT_MAX_DELAY_US);
        Self { bounds }
    }
}

impl DelayConfig {
    /// Configuration with every event disabled
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Configuration with a single `standard` bound
    pub fn uniform(micros: Micros) -> Self {
        Self::default().with_delay(EventType::Standard, micros)
    }

    /// Set the bound of one event type, clamped to `MAX_DELAY_BOUND_US`
    pub fn with_delay(mut self, event: EventType, micros: Micros) -> Self {
        self.set(event, micros);
        self
    }

    /// In-place variant of [`with_delay`](Self::with_delay)
    pub fn set(&mut self, event: EventType, micros: Micros) {
        if micros > MAX_DELAY_BOUND_US {
            warn!(
                event = %event,
                requested = micros,
                clamped = MAX_DELAY_BOUND_US,
                "delay bound clamped"
            );
        }
        self.bounds.insert(event, micros.min(MAX_DELAY_BOUND_US));
    }

    /// Effective bound for an event, falling back to `standard`
    pub fn bound(&self, event: EventType) -> Micros {
        self.bounds
            .get(&event)
            .or_else(|| self.bounds.get(&EventType::Standard))
            .copied()
            .unwrap_or(DEFAULT_MAX_DELAY_US)
    }

    /// Whether an event has its own bound
    pub fn is_explicit(&self, event: EventType) -> bool {
        self.bounds.contains_key(&event)
    }

    /// Explicitly configured entries
    pub fn entries(&self) -> impl Iterator<Item = (EventType, Micros)> + '_ {
        self.bounds.iter().map(|(event, micros)| (*event, *micros))
    }

    /// Parse a JSON object mapping event names to microseconds
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let parsed: BTreeMap<EventType, Micros> = serde_json::from_str(json)?;
        let mut config = Self::default();
        for (event, micros) in parsed {
            config.set(event, micros);
        }
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading delay configuration");
        Self::from_json(&contents)
    }

    /// Build a configuration from the process environment
    ///
    /// Reads `SYNCHRO_CONFIG` (a JSON file) first, then lets
    /// `SYNCHRO_MAX_DELAY_US` and `SYNCHRO_DELAY_<EVENT>_US` override it.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Self::from_file(&path).unwrap_or_else(|e| {
                warn!(path = %path, error = %e, "ignoring unreadable delay configuration");
                Self::default()
            }),
            None => Self::default(),
        };

        if let Some(raw) = lookup(ENV_MAX_DELAY) {
            match raw.trim().parse::<Micros>() {
                Ok(micros) => config.set(EventType::Standard, micros),
                Err(e) => warn!(var = ENV_MAX_DELAY, value = %raw, error = %e, "invalid delay"),
            }
        }

        for event in EventType::ALL {
            let key = format!(
                "{}{}{}",
                ENV_DELAY_PREFIX,
                event.as_str().to_ascii_uppercase(),
                ENV_DELAY_SUFFIX
            );
            if let Some(raw) = lookup(&key) {
                match raw.trim().parse::<Micros>() {
                    Ok(micros) => config.set(event, micros),
                    Err(e) => warn!(var = %key, value = %raw, error = %e, "invalid delay"),
                }
            }
        }

        config
    }
}

impl std::str::FromStr for DelayConfig {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json(s)
    }
}
