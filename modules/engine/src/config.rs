use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::params::OptionValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub path: String,
    pub args: Vec<String>,
    /// Depth used by depth-bounded searches.
    pub depth: u32,
    /// Overrides applied on top of the default option table at start.
    pub parameters: BTreeMap<String, OptionValue>,
    /// `true` reports scores from the side to move, `false` from White.
    pub turn_perspective: bool,
    pub read_timeout_ms: Option<u64>,
    pub handshake_timeout_ms: u64,
    pub handshake_line_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "stockfish".to_string(),
            args: Vec::new(),
            depth: 15,
            parameters: BTreeMap::new(),
            turn_perspective: true,
            read_timeout_ms: None,
            handshake_timeout_ms: 5000,
            handshake_line_limit: 1000,
        }
    }
}

impl EngineConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `STOCKFISH_PATH`, `STOCKFISH_DEPTH` and
    /// `STOCKFISH_READ_TIMEOUT_MS`. Unparseable numbers are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("STOCKFISH_PATH") {
            config.path = path;
        }
        if let Some(depth) = lookup("STOCKFISH_DEPTH").and_then(|v| v.parse().ok()) {
            config.depth = depth;
        }
        if let Some(ms) = lookup("STOCKFISH_READ_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.read_timeout_ms = Some(ms);
        }
        config
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
