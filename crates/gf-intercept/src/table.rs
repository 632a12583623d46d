//! Mapping from outbound call paths to interception actions.

use gf_core::EmbedError;
use gf_core::EmbedResult;
use regex::Regex;

/// How a rule recognizes a call target's path (plus query).
#[derive(Debug, Clone)]
pub enum CallPattern {
    Prefix(String),
    Regex(Regex),
}

impl CallPattern {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn regex(pattern: &str) -> EmbedResult<Self> {
        Regex::new(pattern).map(Self::Regex).map_err(|error| {
            EmbedError::new(
                "intercept.pattern.invalid",
                format!("failed to compile call pattern `{pattern}`: {error}"),
            )
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Regex(regex) => regex.is_match(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptAction {
    /// Send the call to the same path on the remote origin.
    RedirectToRemote,
    /// Send the call through the remote asset proxy endpoint.
    RedirectToAssetProxy,
    /// Forward cookies with the call.
    AddCredentials,
    /// Fail the call without sending it.
    Block,
}

#[derive(Debug, Clone)]
pub struct InterceptRule {
    pub pattern: CallPattern,
    pub action: InterceptAction,
}

/// Ordered interception rules, consulted on every outbound call.
#[derive(Debug, Clone, Default)]
pub struct InterceptedCallTable {
    rules: Vec<InterceptRule>,
}

impl InterceptedCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the remote-only endpoints the embedded runtime calls.
    pub fn standard(asset_prefix: &str) -> EmbedResult<Self> {
        let prefix = asset_prefix.trim_end_matches('/');
        Ok(Self::new()
            .with_rule(CallPattern::prefix("/api/search/suggest"), InterceptAction::RedirectToRemote)
            .with_rule(CallPattern::prefix("/api/session"), InterceptAction::RedirectToRemote)
            .with_rule(CallPattern::prefix(format!("{prefix}/data/")), InterceptAction::RedirectToRemote)
            .with_rule(
                CallPattern::prefix(format!("{prefix}/image")),
                InterceptAction::RedirectToAssetProxy,
            )
            .with_rule(CallPattern::prefix("/api/auth/"), InterceptAction::RedirectToRemote)
            .with_rule(CallPattern::prefix("/api/auth/"), InterceptAction::AddCredentials)
            .with_rule(
                CallPattern::regex(&format!(
                    "^{}/webpack-hmr(?:[/?#]|$)",
                    regex::escape(prefix)
                ))?,
                InterceptAction::Block,
            ))
    }

    pub fn with_rule(mut self, pattern: CallPattern, action: InterceptAction) -> Self {
        self.push(pattern, action);
        self
    }

    pub fn push(&mut self, pattern: CallPattern, action: InterceptAction) {
        self.rules.push(InterceptRule { pattern, action });
    }

    pub fn rules(&self) -> &[InterceptRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Actions of every matching rule, in rule order, without repeats.
    pub fn actions_for(&self, path: &str) -> Vec<InterceptAction> {
        let mut actions = Vec::new();
        for rule in &self.rules {
            if rule.pattern.matches(path) && !actions.contains(&rule.action) {
                actions.push(rule.action);
            }
        }
        actions
    }
}
