//! The page's single interception point for outbound fetch and navigation calls.

use crate::table::InterceptAction;
use crate::table::InterceptedCallTable;
use core::fmt;
use gf_core::EmbedConfig;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use gf_core::RemoteOrigin;
use gf_net::CredentialsMode;
use gf_net::Fetch;
use gf_net::FetchRequest;
use gf_net::FetchResponse;
use gf_rewrite::Rewriter;
use regex::Regex;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    Installed,
    AlreadyInstalled,
}

/// What the host does with a router, history, or location call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Resolve the call without navigating.
    Swallowed,
    /// Full navigation to an absolute remote URL.
    Navigate(String),
    /// Same-page history entry; no network navigation.
    HistoryUpdate(String),
    /// Hand the call back to the original primitive.
    Delegate(String),
}

pub struct InterceptorRegistry {
    rewriter: Rewriter,
    locales: Vec<String>,
    host: Url,
    table: InterceptedCallTable,
    pseudo_routes: Regex,
    fetch: Option<Box<dyn Fetch>>,
    router_patched: bool,
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("origin", self.rewriter.origin())
            .field("host", &self.host.as_str())
            .field("rules", &self.table.rules().len())
            .field("fetch_installed", &self.fetch.is_some())
            .field("router_patched", &self.router_patched)
            .finish()
    }
}

impl InterceptorRegistry {
    /// Registry for a host page served from `host_origin`, using the standard call table.
    pub fn new(config: &EmbedConfig, host_origin: &str) -> EmbedResult<Self> {
        let host = Url::parse(host_origin).map_err(|error| {
            EmbedError::new(
                "intercept.host.invalid",
                format!("failed to parse host origin `{host_origin}`: {error}"),
            )
        })?;
        let pseudo_routes = Regex::new(&pseudo_route_pattern(&config.locales)).map_err(|error| {
            EmbedError::new("intercept.pattern.invalid", error.to_string())
        })?;

        Ok(Self {
            rewriter: Rewriter::from_config(config),
            locales: config.locales.clone(),
            host,
            table: InterceptedCallTable::standard(&config.asset_prefix)?,
            pseudo_routes,
            fetch: None,
            router_patched: false,
        })
    }

    pub fn with_table(mut self, table: InterceptedCallTable) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &InterceptedCallTable {
        &self.table
    }

    pub fn remote_origin(&self) -> &RemoteOrigin {
        self.rewriter.origin()
    }

    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Wraps the page's fetch primitive. A second call keeps the first primitive.
    pub fn install_fetch(&mut self, fetch: Box<dyn Fetch>) -> Installation {
        if self.fetch.is_some() {
            debug!("fetch interceptor already installed; skipping");
            return Installation::AlreadyInstalled;
        }

        self.fetch = Some(fetch);
        Installation::Installed
    }

    pub fn is_fetch_installed(&self) -> bool {
        self.fetch.is_some()
    }

    /// Records that the runtime's router now reports through the interceptor.
    pub fn mark_router_patched(&mut self) -> Installation {
        if self.router_patched {
            debug!("router already patched; skipping");
            return Installation::AlreadyInstalled;
        }

        self.router_patched = true;
        Installation::Installed
    }

    pub fn is_router_patched(&self) -> bool {
        self.router_patched
    }

    /// Applies the call table to one request without sending it.
    pub fn route_fetch(&self, request: &FetchRequest) -> EmbedResult<FetchRequest> {
        let Some(target) = self.host_target(&request.url) else {
            return Ok(request.clone());
        };

        let path = path_and_query(&target);
        let actions = self.table.actions_for(&path);
        if actions.contains(&InterceptAction::Block) {
            return Err(EmbedError::new(
                "intercept.fetch.blocked",
                format!("outbound call to `{path}` is blocked"),
            ));
        }

        let mut routed = request.clone();
        if actions.contains(&InterceptAction::RedirectToAssetProxy) {
            routed.url = self.rewriter.asset_proxy_url(&path);
        } else if actions.contains(&InterceptAction::RedirectToRemote) {
            routed.url = self.remote_origin().join(&path);
        }
        if actions.contains(&InterceptAction::AddCredentials) {
            routed.credentials = CredentialsMode::Include;
        }

        if routed.url != request.url {
            debug!(from = %request.url, to = %routed.url, "redirected outbound call");
        }
        Ok(routed)
    }

    /// Routes a request through the call table and sends it with the installed primitive.
    pub fn fetch(&mut self, request: &FetchRequest) -> EmbedResult<FetchResponse> {
        let routed = self.route_fetch(request)?;
        let Some(primitive) = self.fetch.as_mut() else {
            return Err(EmbedError::new(
                "intercept.fetch.not_installed",
                "no fetch primitive has been installed",
            ));
        };
        primitive.fetch(&routed)
    }

    /// Decides how a navigation to `target`, requested while at `current`, is carried out.
    pub fn route_navigation(&self, target: &str, current: &str) -> NavigationOutcome {
        let trimmed = target.trim();
        let Ok(base) = Url::parse(current) else {
            return NavigationOutcome::Delegate(trimmed.to_owned());
        };
        let Ok(resolved) = base.join(trimmed) else {
            return NavigationOutcome::Delegate(trimmed.to_owned());
        };

        if self.remote_origin().owns(resolved.as_str()) {
            return NavigationOutcome::Navigate(resolved.into());
        }
        if resolved.origin() != base.origin() {
            return NavigationOutcome::Delegate(resolved.into());
        }

        if self.pseudo_routes.is_match(resolved.path()) {
            debug!(target = trimmed, "swallowed fragment pseudo-route");
            return NavigationOutcome::Swallowed;
        }

        let same_document = resolved.path() == base.path() && resolved.query() == base.query();
        let query_only = trimmed.starts_with('?')
            || (resolved.path() == base.path() && resolved.query() != base.query());
        if same_document || query_only {
            return NavigationOutcome::HistoryUpdate(resolved.into());
        }

        if is_root_relative(trimmed) && self.is_locale_rooted(resolved.path()) {
            let mut remote_path = path_and_query(&resolved);
            if let Some(fragment) = resolved.fragment() {
                remote_path.push('#');
                remote_path.push_str(fragment);
            }
            return NavigationOutcome::Navigate(self.remote_origin().join(&remote_path));
        }

        NavigationOutcome::Delegate(resolved.into())
    }

    /// The parsed target when `url` is relative or on the host origin.
    fn host_target(&self, url: &str) -> Option<Url> {
        let target = self.host.join(url.trim()).ok()?;
        (target.origin() == self.host.origin()).then_some(target)
    }

    fn is_locale_rooted(&self, path: &str) -> bool {
        self.locales.iter().any(|locale| {
            path.strip_prefix('/')
                .and_then(|rest| rest.strip_prefix(locale.as_str()))
                .is_some_and(|tail| tail.is_empty() || tail.starts_with('/'))
        })
    }
}

/// Matches `/header` and `/footer`, optionally under one of `locales`.
fn pseudo_route_pattern(locales: &[String]) -> String {
    let prefixes: Vec<String> = locales
        .iter()
        .filter(|locale| !locale.is_empty())
        .map(|locale| regex::escape(locale))
        .collect();
    if prefixes.is_empty() {
        return r"^/(?:header|footer)/?$".to_owned();
    }
    format!(r"^/(?:(?:{})/)?(?:header|footer)/?$", prefixes.join("|"))
}

fn is_root_relative(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//")
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    }
}
