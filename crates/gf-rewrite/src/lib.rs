//! URL rewriting for embedded remote fragments.
//!
//! Every relative URL found in a fragment is re-addressed to the remote origin.
//! Rewriting is idempotent: output always starts with the origin, which is
//! itself an excluded (`http`) prefix, so a second pass leaves it alone.

mod decode;
pub mod markup;

use gf_core::EmbedConfig;
use gf_core::RemoteOrigin;
use gf_core::config::ASSET_PREFIX;
use gf_core::config::ASSET_PROXY_PATH;
use tracing::warn;

pub use decode::DecodeError;
pub use decode::percent_decode;
pub use markup::rewrite_markup;

/// Where a rewritten anchor keeps its `href` from before rewriting.
pub const ORIGINAL_HREF_ATTRIBUTE: &str = "data-original-href";

/// Prefixes that are never rewritten, compared case-insensitively.
pub const EXCLUDED_PREFIXES: [&str; 7] = [
    "http",
    "//",
    "mailto:",
    "#",
    "javascript:",
    "tel:",
    "data:",
];

/// Which attribute a URL value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Href,
    Src,
    Srcset,
}

impl AttributeKind {
    pub const ALL: [Self; 3] = [Self::Href, Self::Src, Self::Srcset];

    pub fn from_attribute(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("href") {
            Some(Self::Href)
        } else if name.eq_ignore_ascii_case("src") {
            Some(Self::Src)
        } else if name.eq_ignore_ascii_case("srcset") {
            Some(Self::Srcset)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Href => "href",
            Self::Src => "src",
            Self::Srcset => "srcset",
        }
    }

    /// Subresource kinds may be routed through the asset proxy; navigation targets never are.
    pub fn loads_subresource(self) -> bool {
        matches!(self, Self::Src | Self::Srcset)
    }
}

/// Returns true when `url` begins with an excluded scheme or marker.
pub fn is_excluded(url: &str) -> bool {
    let trimmed = url.trim_start();
    EXCLUDED_PREFIXES.iter().any(|prefix| {
        trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// Rewrites a single attribute value against `origin` using the default asset proxy settings.
pub fn rewrite(url: &str, kind: AttributeKind, origin: &RemoteOrigin) -> String {
    Rewriter::new(origin.clone()).rewrite(url, kind)
}

/// Origin-bound rewriter carrying the asset proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewriter {
    origin: RemoteOrigin,
    asset_prefix: String,
    asset_proxy_path: String,
}

impl Rewriter {
    pub fn new(origin: RemoteOrigin) -> Self {
        Self {
            origin,
            asset_prefix: ASSET_PREFIX.to_owned(),
            asset_proxy_path: ASSET_PROXY_PATH.to_owned(),
        }
    }

    pub fn from_config(config: &EmbedConfig) -> Self {
        Self {
            origin: config.origin.clone(),
            asset_prefix: config.asset_prefix.clone(),
            asset_proxy_path: config.asset_proxy_path.clone(),
        }
    }

    pub fn origin(&self) -> &RemoteOrigin {
        &self.origin
    }

    /// Rewrites an attribute value of the given kind.
    pub fn rewrite(&self, value: &str, kind: AttributeKind) -> String {
        match kind {
            AttributeKind::Srcset => self.rewrite_srcset(value),
            AttributeKind::Href | AttributeKind::Src => self.rewrite_url(value, kind),
        }
    }

    /// True when rewriting would change `value`.
    pub fn needs_rewrite(&self, value: &str, kind: AttributeKind) -> bool {
        self.rewrite(value, kind) != value
    }

    fn rewrite_url(&self, url: &str, kind: AttributeKind) -> String {
        let token = url.trim();
        if token.is_empty() {
            return url.to_owned();
        }

        let comparison = match percent_decode(token) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(url = token, offset = error.offset, "percent-decoding failed; comparing raw URL");
                token.into()
            }
        };

        if is_excluded(token) || is_excluded(&comparison) {
            return url.to_owned();
        }
        if self.origin.owns(token) || self.origin.owns(&comparison) {
            return url.to_owned();
        }

        if kind.loads_subresource() && self.is_asset_path(&comparison) {
            return self.asset_proxy_url(&absolute_path(token));
        }

        self.origin.join(token)
    }

    /// Rewrites each candidate URL of a `srcset` list.
    ///
    /// Separators, whitespace, and descriptors are copied through unchanged.
    /// Commas inside a URL token (as in `data:` URLs) do not split candidates.
    pub fn rewrite_srcset(&self, srcset: &str) -> String {
        let mut out = String::with_capacity(srcset.len() + 32);
        let mut rest = srcset;

        loop {
            let separator = rest
                .find(|ch: char| !(ch.is_ascii_whitespace() || ch == ','))
                .unwrap_or(rest.len());
            out.push_str(&rest[..separator]);
            rest = &rest[separator..];
            if rest.is_empty() {
                break;
            }

            let token_len = rest
                .find(|ch: char| ch.is_ascii_whitespace())
                .unwrap_or(rest.len());
            let token = &rest[..token_len];
            let url = token.trim_end_matches(',');
            out.push_str(&self.rewrite_url(url, AttributeKind::Srcset));
            rest = &rest[url.len()..];
            if url.len() != token.len() {
                continue;
            }

            let descriptors = descriptor_len(rest);
            out.push_str(&rest[..descriptors]);
            rest = &rest[descriptors..];
        }

        out
    }

    /// True for paths below the bundler asset prefix.
    pub fn is_asset_path(&self, url: &str) -> bool {
        let path = absolute_path(url);
        path.strip_prefix(self.asset_prefix.as_str())
            .is_some_and(|tail| tail.is_empty() || tail.starts_with(['/', '?', '#']))
    }

    /// Wraps an origin-relative asset path through the remote asset proxy endpoint.
    pub fn asset_proxy_url(&self, path: &str) -> String {
        format!(
            "{origin}/{proxy}?file={origin}{path}",
            origin = self.origin.as_str(),
            proxy = self.asset_proxy_path,
        )
    }
}

fn absolute_path(url: &str) -> String {
    if url.starts_with('/') {
        url.to_owned()
    } else {
        format!("/{url}")
    }
}

/// Length of the descriptor run up to the next top-level comma.
fn descriptor_len(input: &str) -> usize {
    let mut depth = 0_usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return idx,
            _ => {}
        }
    }
    input.len()
}
