use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Delivery effort requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagingQosEffort {
    Normal,
    BestEffort,
}

impl fmt::Display for MessagingQosEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagingQosEffort::Normal => write!(f, "NORMAL"),
            MessagingQosEffort::BestEffort => write!(f, "BEST_EFFORT"),
        }
    }
}

impl FromStr for MessagingQosEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(MessagingQosEffort::Normal),
            "BEST_EFFORT" => Ok(MessagingQosEffort::BestEffort),
            other => Err(format!("unknown effort {other}")),
        }
    }
}

/// Per-call messaging quality of service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingQos {
    /// Relative time to live in milliseconds.
    pub ttl_ms: u64,
    pub effort: Option<MessagingQosEffort>,
    pub encrypt: bool,
    pub compress: bool,
    pub custom_headers: HashMap<String, String>,
}

impl MessagingQos {
    pub const DEFAULT_TTL_MS: u64 = 60_000;

    pub fn with_ttl(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            ..Self::default()
        }
    }

    pub fn put_custom_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_headers.insert(key.into(), value.into());
    }
}

impl Default for MessagingQos {
    fn default() -> Self {
        Self {
            ttl_ms: Self::DEFAULT_TTL_MS,
            effort: None,
            encrypt: false,
            compress: false,
            custom_headers: HashMap::new(),
        }
    }
}
