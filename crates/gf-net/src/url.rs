//! Absolute request targets.

use gf_core::EmbedError;
use gf_core::EmbedResult;
use url::Url;

/// Parsed `http`/`https` URL ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    parsed: Url,
    secure: bool,
    host: String,
    port: u16,
}

impl TargetUrl {
    pub fn parse(input: &str) -> EmbedResult<Self> {
        let parsed = Url::parse(input).map_err(|error| {
            EmbedError::new(
                "net.url.invalid",
                format!("failed to parse URL `{input}`: {error}"),
            )
        })?;
        Self::from_url(parsed)
    }

    fn from_url(mut parsed: Url) -> EmbedResult<Self> {
        let secure = match parsed.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(EmbedError::new(
                    "net.url.scheme_unsupported",
                    format!("unsupported scheme `{other}`"),
                ));
            }
        };

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(EmbedError::new(
                "net.url.credentials_disallowed",
                "URL userinfo is not allowed in request targets",
            ));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| EmbedError::new("net.url.host_missing", "URL must include a host"))?
            .to_ascii_lowercase();
        let port = parsed.port_or_known_default().unwrap_or(if secure { 443 } else { 80 });

        parsed.set_fragment(None);

        Ok(Self {
            parsed,
            secure,
            host,
            port,
        })
    }

    /// Resolves a `Location` value (absolute or relative) against this URL.
    pub fn join(&self, location: &str) -> EmbedResult<Self> {
        let joined = self.parsed.join(location.trim()).map_err(|error| {
            EmbedError::new(
                "net.url.invalid",
                format!("failed to resolve `{location}` against `{}`: {error}", self.parsed),
            )
        })?;
        Self::from_url(joined)
    }

    pub fn as_str(&self) -> &str {
        self.parsed.as_str()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn path(&self) -> &str {
        self.parsed.path()
    }

    pub fn authority(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.authority())
    }

    pub fn path_and_query(&self) -> String {
        let path = match self.parsed.path() {
            "" => "/",
            path => path,
        };

        match self.parsed.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        }
    }
}
