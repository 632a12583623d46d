//! Network-backed fetch primitive.

use crate::CredentialsMode;
use crate::Fetch;
use crate::FetchRequest;
use crate::FetchResponse;
use crate::Method;
use crate::connect::Connector;
use crate::connect::TcpConnector;
use crate::cookies::CookieJar;
use crate::http::WireRequest;
use crate::http::WireResponse;
use crate::http::read_response;
use crate::url::TargetUrl;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use gf_core::config::MAX_FRAGMENT_REDIRECTS;
use std::io::BufReader;
use std::io::Write;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = concat!("graft/", env!("CARGO_PKG_VERSION"));
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8";

/// HTTP/1.1 fetcher that follows redirects and keeps a cookie jar.
#[derive(Debug, Clone)]
pub struct HttpFetcher<C = TcpConnector>
where
    C: Connector,
{
    connector: C,
    cookies: CookieJar,
    document_origin: Option<String>,
    max_redirects: usize,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_connector(TcpConnector::default())
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HttpFetcher<C>
where
    C: Connector,
{
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            cookies: CookieJar::new(),
            document_origin: None,
            max_redirects: MAX_FRAGMENT_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Origin that `same-origin` credentials are judged against.
    pub fn with_document_origin(mut self, origin: impl Into<String>) -> Self {
        self.document_origin = Some(origin.into());
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn sends_credentials(&self, mode: CredentialsMode, url: &TargetUrl) -> bool {
        match mode {
            CredentialsMode::Omit => false,
            CredentialsMode::Include => true,
            CredentialsMode::SameOrigin => self
                .document_origin
                .as_deref()
                .is_some_and(|origin| origin == url.origin()),
        }
    }

    fn exchange(&mut self, wire: &WireRequest) -> EmbedResult<WireResponse> {
        let bytes = wire.encode()?;
        let mut stream = self.connector.open(&wire.url)?;
        stream.write_all(&bytes).map_err(|error| {
            EmbedError::new(
                "net.http.write_failed",
                format!("failed to send request to `{}`: {error}", wire.url.as_str()),
            )
        })?;
        stream.flush().map_err(|error| {
            EmbedError::new(
                "net.http.write_failed",
                format!("failed to flush request to `{}`: {error}", wire.url.as_str()),
            )
        })?;

        read_response(&mut BufReader::new(stream), wire.method)
    }

    fn prepare(
        &self,
        request: &FetchRequest,
        url: TargetUrl,
        method: Method,
        body: &[u8],
        credentials: bool,
    ) -> EmbedResult<WireRequest> {
        let mut wire = WireRequest::new(method, url);
        wire.set_header("User-Agent", &self.user_agent)?;
        wire.set_header("Accept", DEFAULT_ACCEPT)?;
        wire.set_header("Accept-Encoding", "gzip, deflate, br")?;
        for (name, value) in &request.headers {
            wire.set_header(name, value)?;
        }
        if credentials && let Some(cookie) = self.cookies.header_for(&wire.url) {
            wire.set_header("Cookie", &cookie)?;
        }
        wire.body = body.to_vec();
        Ok(wire)
    }
}

impl<C> Fetch for HttpFetcher<C>
where
    C: Connector,
{
    fn fetch(&mut self, request: &FetchRequest) -> EmbedResult<FetchResponse> {
        let mut url = TargetUrl::parse(&request.url)?;
        let mut method = request.method;
        let mut body = request.body.clone();
        let mut redirected = false;

        for _ in 0..=self.max_redirects {
            let credentials = self.sends_credentials(request.credentials, &url);
            let wire = self.prepare(request, url.clone(), method, &body, credentials)?;
            let response = self.exchange(&wire)?;

            if credentials {
                for value in response.headers_named("set-cookie") {
                    self.cookies.store(&url, value);
                }
            }

            if is_redirect(response.status)
                && let Some(location) = response.header("location")
            {
                let next = url.join(location)?;
                debug!(
                    from = url.as_str(),
                    to = next.as_str(),
                    status = response.status,
                    "following redirect"
                );
                if response.status == 303
                    || (matches!(response.status, 301 | 302) && method == Method::Post)
                {
                    method = Method::Get;
                    body.clear();
                }
                url = next;
                redirected = true;
                continue;
            }

            return Ok(FetchResponse {
                url: url.as_str().to_owned(),
                status: response.status,
                headers: response
                    .headers
                    .into_iter()
                    .map(|header| (header.name, header.value))
                    .collect(),
                body: response.body,
                redirected,
            });
        }

        Err(EmbedError::new(
            "net.redirect.limit",
            format!(
                "more than {} redirects while fetching `{}`",
                self.max_redirects, request.url
            ),
        ))
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

#[cfg(test)]
mod tests {
    use super::HttpFetcher;
    use crate::CredentialsMode;
    use crate::Fetch;
    use crate::FetchRequest;
    use crate::Method;
    use crate::connect::BoxedStream;
    use crate::connect::Connector;
    use crate::url::TargetUrl;
    use gf_core::EmbedResult;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::io::Read;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::Mutex;

    struct Recorded {
        input: Cursor<Vec<u8>>,
        sent: Arc<Mutex<Vec<String>>>,
        buffer: Vec<u8>,
    }

    impl Read for Recorded {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Recorded {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(String::from_utf8_lossy(&self.buffer).into_owned());
            }
            Ok(())
        }
    }

    struct Scripted {
        responses: VecDeque<&'static [u8]>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(responses: &[&'static [u8]]) -> Self {
            Self {
                responses: responses.iter().copied().collect(),
                sent: Arc::default(),
            }
        }

        fn sent(&self) -> Vec<String> {
            match self.sent.lock() {
                Ok(sent) => sent.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }
    }

    impl Connector for Scripted {
        fn open(&mut self, _url: &TargetUrl) -> EmbedResult<BoxedStream> {
            let response = self.responses.pop_front().unwrap_or(&b"HTTP/1.1 500 Empty\r\n\r\n"[..]);
            Ok(Box::new(Recorded {
                input: Cursor::new(response.to_vec()),
                sent: Arc::clone(&self.sent),
                buffer: Vec::new(),
            }))
        }
    }

    #[test]
    fn follows_redirects_and_replays_cookies() {
        let connector = Scripted::new(&[
            b"HTTP/1.1 302 Found\r\nLocation: /en/header/\r\nSet-Cookie: sid=abc; Path=/\r\nContent-Length: 0\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 11\r\n\r\n<nav></nav>",
        ]);
        let mut fetcher = HttpFetcher::with_connector(connector);
        let request = FetchRequest::get("https://x.example/en/header")
            .with_credentials(CredentialsMode::Include);

        let response = match fetcher.fetch(&request) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(response.status, 200);
        assert_eq!(response.url, "https://x.example/en/header/");
        assert!(response.redirected);
        assert_eq!(response.text(), "<nav></nav>");

        let sent = fetcher.connector().sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("GET /en/header HTTP/1.1\r\nHost: x.example\r\n"));
        assert!(!sent[0].contains("Cookie:"));
        assert!(sent[1].contains("Cookie: sid=abc\r\n"));
    }

    #[test]
    fn same_origin_credentials_need_a_matching_document_origin() {
        let response: &'static [u8] =
            b"HTTP/1.1 200 OK\r\nSet-Cookie: sid=abc\r\nContent-Length: 0\r\n\r\n";
        let mut fetcher = HttpFetcher::with_connector(Scripted::new(&[response]))
            .with_document_origin("https://host.example");
        let request = FetchRequest::get("https://x.example/api/session");
        assert!(fetcher.fetch(&request).is_ok());
        assert!(fetcher.cookies().is_empty());
    }

    #[test]
    fn see_other_switches_post_to_get() {
        let connector = Scripted::new(&[
            b"HTTP/1.1 303 See Other\r\nLocation: https://x.example/done\r\nContent-Length: 0\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        ]);
        let mut fetcher = HttpFetcher::with_connector(connector);
        let request = FetchRequest::get("https://x.example/api/auth/login")
            .with_method(Method::Post)
            .with_body("user=a");

        assert!(fetcher.fetch(&request).is_ok());
        let sent = fetcher.connector().sent();
        assert!(sent[0].starts_with("POST /api/auth/login "));
        assert!(sent[0].ends_with("user=a"));
        assert!(sent[1].starts_with("GET /done "));
        assert!(!sent[1].contains("Content-Length"));
    }

    #[test]
    fn stops_after_redirect_limit() {
        let hop: &'static [u8] = b"HTTP/1.1 307 Temporary Redirect\r\nLocation: /loop\r\nContent-Length: 0\r\n\r\n";
        let mut fetcher =
            HttpFetcher::with_connector(Scripted::new(&[hop, hop, hop])).with_max_redirects(2);
        let result = fetcher.fetch(&FetchRequest::get("https://x.example/loop"));
        assert!(matches!(result, Err(error) if error.code == "net.redirect.limit"));
    }
}
