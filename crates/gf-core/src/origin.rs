//! The remote origin every rewritten reference resolves against.

use crate::EmbedError;
use crate::EmbedResult;
use crate::config::DEFAULT_REMOTE_HOST;
use core::fmt;
use url::Url;

/// Absolute `scheme://host[:port]` base of the remote site, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteOrigin {
    base: String,
    host: String,
}

impl RemoteOrigin {
    pub fn parse(input: &str) -> EmbedResult<Self> {
        let trimmed = input.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|error| {
            EmbedError::new(
                "core.origin.invalid",
                format!("failed to parse remote origin `{input}`: {error}"),
            )
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EmbedError::new(
                "core.origin.scheme_unsupported",
                format!("remote origin must be http or https, got `{}`", parsed.scheme()),
            ));
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(EmbedError::new(
                "core.origin.credentials_disallowed",
                "remote origin must not carry `username:password@`",
            ));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| EmbedError::new("core.origin.host_missing", "remote origin needs a host"))?
            .to_ascii_lowercase();

        if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(EmbedError::new(
                "core.origin.not_bare",
                format!("remote origin `{input}` must not include a path, query, or fragment"),
            ));
        }

        let base = match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        };

        Ok(Self { base, host })
    }

    /// The origin built into [`EmbedConfig::default`](crate::EmbedConfig).
    pub(crate) fn builtin() -> Self {
        Self {
            base: format!("https://{DEFAULT_REMOTE_HOST}"),
            host: DEFAULT_REMOTE_HOST.to_owned(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Joins a path onto the origin with exactly one separating slash.
    pub fn join(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            format!("{}/{path}", self.base)
        }
    }

    /// True when `url` is this origin or a location under it.
    pub fn owns(&self, url: &str) -> bool {
        url.strip_prefix(self.base.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
    }
}

impl fmt::Display for RemoteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::RemoteOrigin;
    use crate::config::DEFAULT_REMOTE_ORIGIN;

    fn origin(input: &str) -> RemoteOrigin {
        match RemoteOrigin::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(origin("https://Remote.Example.com/").as_str(), "https://remote.example.com");
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(origin("http://localhost:3000").as_str(), "http://localhost:3000");
    }

    #[test]
    fn join_never_doubles_or_drops_slash() {
        let base = origin("https://x.test");
        assert_eq!(base.join("/a/b"), "https://x.test/a/b");
        assert_eq!(base.join("a/b"), "https://x.test/a/b");
    }

    #[test]
    fn ownership_stops_at_the_host_boundary() {
        let base = origin("https://x.test");
        assert!(base.owns("https://x.test"));
        assert!(base.owns("https://x.test/en/contact"));
        assert!(base.owns("https://x.test?q=1"));
        assert!(!base.owns("https://x.test.evil.example/en"));
        assert!(!base.owns("https://x.testing/en"));
        assert!(!base.owns("/en/contact"));
    }

    #[test]
    fn builtin_origin_matches_the_parsed_default() {
        assert_eq!(RemoteOrigin::builtin(), origin(DEFAULT_REMOTE_ORIGIN));
    }

    #[test]
    fn rejects_paths_and_foreign_schemes() {
        assert!(RemoteOrigin::parse("https://x.test/en").is_err());
        assert!(RemoteOrigin::parse("ftp://x.test").is_err());
        assert!(RemoteOrigin::parse("https://user:pw@x.test").is_err());
    }
}
