//! Fetch primitive contract and the HTTP stack behind it.
//!
//! Everything that loads remote content goes through [`Fetch`]. The default
//! implementation, [`HttpFetcher`], speaks HTTP/1.1 over TCP or rustls and
//! keeps a per-host cookie jar; [`MemoryFetch`] serves canned responses.

pub mod charset;
pub mod connect;
pub mod cookies;
pub mod fetcher;
pub mod http;
pub mod memory;
pub mod tls;
pub mod url;

use gf_core::EmbedResult;

pub use connect::Connector;
pub use connect::TcpConnector;
pub use cookies::CookieJar;
pub use fetcher::HttpFetcher;
pub use http::Header;
pub use memory::FetchLog;
pub use memory::MemoryFetch;
pub use tls::TlsSettings;
pub use tls::TrustStore;
pub use crate::url::TargetUrl;

/// Request methods the fetch primitive accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let method = match input.trim().to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            _ => return None,
        };
        Some(method)
    }
}

/// Whether cookies travel with a request, mirroring the fetch `credentials` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

impl CredentialsMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Omit => "omit",
            Self::SameOrigin => "same-origin",
            Self::Include => "include",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "omit" => Some(Self::Omit),
            "same-origin" => Some(Self::SameOrigin),
            "include" => Some(Self::Include),
            _ => None,
        }
    }
}

/// One outgoing call of the fetch primitive. `url` may be relative until an
/// interceptor or the host resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub credentials: CredentialsMode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Completed response after redirects and content decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub redirected: bool,
}

impl FetchResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
            redirected: false,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body decoded with the charset from `Content-Type`, `<meta>`, or a BOM.
    pub fn text(&self) -> String {
        charset::decode_text(&self.body, self.header("content-type"))
    }
}

/// The process-wide fetch primitive.
pub trait Fetch {
    fn fetch(&mut self, request: &FetchRequest) -> EmbedResult<FetchResponse>;
}

impl<F: Fetch + ?Sized> Fetch for Box<F> {
    fn fetch(&mut self, request: &FetchRequest) -> EmbedResult<FetchResponse> {
        (**self).fetch(request)
    }
}
