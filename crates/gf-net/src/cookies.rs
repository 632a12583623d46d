//! In-memory cookie jar keyed by domain.

use crate::url::TargetUrl;
use std::collections::BTreeMap;

const MAX_COOKIE_DOMAINS: usize = 64;
const MAX_COOKIES_PER_DOMAIN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    value: String,
    path: String,
    secure: bool,
    host_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SetCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    host_only: bool,
    delete: bool,
}

/// Cookies received through `Set-Cookie`, replayed on credentialed requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    domains: BTreeMap<String, BTreeMap<String, StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.domains.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Applies one `Set-Cookie` header value received from `url`.
    pub fn store(&mut self, url: &TargetUrl, set_cookie: &str) {
        let Some(cookie) = parse_set_cookie(set_cookie, url) else {
            return;
        };

        if cookie.delete {
            if let Some(entries) = self.domains.get_mut(&cookie.domain) {
                entries.remove(&cookie.name);
                if entries.is_empty() {
                    self.domains.remove(&cookie.domain);
                }
            }
            return;
        }

        if !self.domains.contains_key(&cookie.domain)
            && self.domains.len() >= MAX_COOKIE_DOMAINS
            && let Some(evicted) = self.domains.keys().next().cloned()
        {
            self.domains.remove(&evicted);
        }

        let entries = self.domains.entry(cookie.domain).or_default();
        if !entries.contains_key(&cookie.name)
            && entries.len() >= MAX_COOKIES_PER_DOMAIN
            && let Some(evicted) = entries.keys().next().cloned()
        {
            entries.remove(&evicted);
        }
        entries.insert(
            cookie.name,
            StoredCookie {
                value: cookie.value,
                path: cookie.path,
                secure: cookie.secure,
                host_only: cookie.host_only,
            },
        );
    }

    /// `Cookie` header value for a request to `url`, most specific domain first.
    pub fn header_for(&self, url: &TargetUrl) -> Option<String> {
        let host = url.host();
        let mut matching: Vec<_> = self
            .domains
            .iter()
            .filter(|(domain, _)| domain_matches(host, domain))
            .collect();
        matching.sort_by(|(left, _), (right, _)| right.len().cmp(&left.len()));

        let mut selected: BTreeMap<&str, &str> = BTreeMap::new();
        for (domain, entries) in matching {
            for (name, cookie) in entries {
                let applies = (!cookie.host_only || host == domain.as_str())
                    && (!cookie.secure || url.is_secure())
                    && path_matches(url.path(), &cookie.path);
                if applies {
                    selected.entry(name.as_str()).or_insert(cookie.value.as_str());
                }
            }
        }

        if selected.is_empty() {
            return None;
        }
        Some(
            selected
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

fn parse_set_cookie(input: &str, url: &TargetUrl) -> Option<SetCookie> {
    let mut segments = input.split(';');
    let (name, value) = segments.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = SetCookie {
        name: name.to_owned(),
        value: value.trim().to_owned(),
        domain: url.host().to_owned(),
        path: default_path(url.path()),
        secure: false,
        host_only: true,
        delete: false,
    };

    for attribute in segments {
        let (key, attr_value) = attribute
            .split_once('=')
            .map(|(key, value)| (key.trim(), value.trim()))
            .unwrap_or((attribute.trim(), ""));

        if key.eq_ignore_ascii_case("domain") {
            let domain = attr_value.trim_start_matches('.').to_ascii_lowercase();
            // A response may only set cookies for its own host or a parent domain.
            if domain.is_empty() || !domain_matches(url.host(), &domain) {
                return None;
            }
            cookie.domain = domain;
            cookie.host_only = false;
        } else if key.eq_ignore_ascii_case("path") && attr_value.starts_with('/') {
            cookie.path = attr_value.to_owned();
        } else if key.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        } else if key.eq_ignore_ascii_case("max-age")
            && attr_value.parse::<i64>().is_ok_and(|seconds| seconds <= 0)
        {
            cookie.delete = true;
        }
    }

    Some(cookie)
}

fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => request_path[..idx].to_owned(),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')))
}
