//! Profile identity references and key normalization

use serde::{Deserialize, Serialize};
use std::fmt;

/// A profile on the external platform, referenced either by its mutable
/// handle or by its immutable numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    ScreenName(String),
    PlatformId(i64),
}

impl Identity {
    /// Screen-name reference, case-folded
    pub fn screen_name(name: &str) -> Self {
        Identity::ScreenName(name.to_lowercase())
    }

    pub fn platform_id(id: i64) -> Self {
        Identity::PlatformId(id)
    }

    /// Cache key; names and ids live in separate namespaces
    pub fn cache_key(&self) -> String {
        match self {
            Identity::ScreenName(name) => format!("screen_name:{}", name.to_lowercase()),
            Identity::PlatformId(id) => format!("platform_id:{}", id),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::ScreenName(name) => write!(f, "{}", name),
            Identity::PlatformId(id) => write!(f, "#{}", id),
        }
    }
}

/// Store key for a handle.
///
/// Keys are the lowercased handle. Handles beginning with a double
/// underscore are prefixed with `.` because that namespace is reserved by
/// the store for its own entities.
pub fn canonical_key(screen_name: &str) -> String {
    let lower = screen_name.to_lowercase();
    if screen_name.starts_with("__") {
        format!(".{}", lower)
    } else {
        lower
    }
}
