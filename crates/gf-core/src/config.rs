//! Compile-time embedding defaults and their validated runtime form.

use crate::EmbedError;
use crate::EmbedResult;
use crate::RemoteOrigin;
use std::time::Duration;

pub const DEFAULT_REMOTE_ORIGIN: &str = "https://www.remote.example.org";
/// Host part of [`DEFAULT_REMOTE_ORIGIN`].
pub const DEFAULT_REMOTE_HOST: &str = "www.remote.example.org";
pub const DEFAULT_LOCALE: &str = "en";
pub const HEADER_MOUNT_ID: &str = "external-header";
pub const FOOTER_MOUNT_ID: &str = "external-footer";
/// Path prefix of bundler-internal assets that must go through the asset proxy.
pub const ASSET_PREFIX: &str = "/_next";
pub const ASSET_PROXY_PATH: &str = "api/asset-proxy";
pub const DATA_SCRIPT_ID: &str = "__NEXT_DATA__";
pub const SUPPORT_SCRIPT_MARKER: &str = "_next";
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);
pub const MAX_FRAGMENT_REDIRECTS: usize = 5;

/// How a fragment is attached below its mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationMode {
    /// Fragment nodes become ordinary children of the mount point.
    Inline,
    /// Fragment nodes live in a shadow root attached to the mount point.
    Shadow,
}

/// Runtime configuration for one embedding session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfig {
    pub origin: RemoteOrigin,
    pub locale: String,
    /// Every locale the remote site routes under; used to spot locale-rooted paths.
    pub locales: Vec<String>,
    pub header_mount_id: String,
    pub footer_mount_id: String,
    pub isolation: IsolationMode,
    pub asset_prefix: String,
    pub asset_proxy_path: String,
    pub data_script_id: String,
    pub support_script_marker: String,
    pub settle_delay: Duration,
    pub max_redirects: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::for_origin(RemoteOrigin::builtin())
    }
}

impl EmbedConfig {
    pub fn for_origin(origin: RemoteOrigin) -> Self {
        Self {
            origin,
            locale: DEFAULT_LOCALE.to_owned(),
            locales: vec![DEFAULT_LOCALE.to_owned()],
            header_mount_id: HEADER_MOUNT_ID.to_owned(),
            footer_mount_id: FOOTER_MOUNT_ID.to_owned(),
            isolation: IsolationMode::Inline,
            asset_prefix: ASSET_PREFIX.to_owned(),
            asset_proxy_path: ASSET_PROXY_PATH.to_owned(),
            data_script_id: DATA_SCRIPT_ID.to_owned(),
            support_script_marker: SUPPORT_SCRIPT_MARKER.to_owned(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_redirects: MAX_FRAGMENT_REDIRECTS,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        if !self.locales.contains(&locale) {
            self.locales.push(locale.clone());
        }
        self.locale = locale;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn header_url(&self) -> String {
        self.origin.join(&format!("{}/header", self.locale))
    }

    pub fn footer_url(&self) -> String {
        self.origin.join(&format!("{}/footer", self.locale))
    }

    pub fn validate(&self) -> EmbedResult<()> {
        if self.locale.is_empty() || self.locale.contains('/') {
            return Err(EmbedError::new(
                "core.config.locale_invalid",
                format!("locale `{}` must be a single non-empty path segment", self.locale),
            ));
        }

        if !self.locales.contains(&self.locale) {
            return Err(EmbedError::new(
                "core.config.locale_unlisted",
                format!("active locale `{}` is missing from the locale list", self.locale),
            ));
        }

        if self.header_mount_id.is_empty() || self.footer_mount_id.is_empty() {
            return Err(EmbedError::new(
                "core.config.mount_id_empty",
                "mount point identifiers must not be empty",
            ));
        }

        if !self.asset_prefix.starts_with('/') {
            return Err(EmbedError::new(
                "core.config.asset_prefix_relative",
                format!("asset prefix `{}` must start with `/`", self.asset_prefix),
            ));
        }

        if self.asset_proxy_path.is_empty() || self.asset_proxy_path.starts_with('/') {
            return Err(EmbedError::new(
                "core.config.asset_proxy_invalid",
                format!(
                    "asset proxy path `{}` must be a non-empty relative path",
                    self.asset_proxy_path
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_REMOTE_ORIGIN;
    use super::EmbedConfig;

    #[test]
    fn default_config_is_valid() {
        let config = EmbedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.origin.as_str(), DEFAULT_REMOTE_ORIGIN);
        assert_eq!(config.header_url(), "https://www.remote.example.org/en/header");
        assert_eq!(config.footer_url(), "https://www.remote.example.org/en/footer");
    }

    #[test]
    fn switching_locale_registers_it() {
        let config = EmbedConfig::default().with_locale("fr");
        assert!(config.validate().is_ok());
        assert!(config.locales.iter().any(|locale| locale == "fr"));
        assert_eq!(config.header_url(), "https://www.remote.example.org/fr/header");
    }

    #[test]
    fn rejects_absolute_asset_proxy_path() {
        let mut config = EmbedConfig::default();
        config.asset_proxy_path = "/api/asset-proxy".to_owned();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "core.config.asset_proxy_invalid");
        }
    }
}
