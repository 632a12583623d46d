//! Records the runtime leaves in its outbox for the host to act on.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMethod {
    Push,
    Replace,
}

impl NavigationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Replace => "replace",
        }
    }
}

/// Which primitive the runtime called to navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationSource {
    /// `next.router.push`/`replace`, once patched.
    Router,
    /// `history.pushState`/`replaceState`.
    History,
    /// `location.assign`/`replace`.
    Location,
}

/// One outbound call made by script code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuntimeCall {
    Fetch {
        id: u64,
        url: String,
        method: String,
        #[serde(default)]
        credentials: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    Navigate {
        source: NavigationSource,
        method: NavigationMethod,
        url: String,
    },
}
