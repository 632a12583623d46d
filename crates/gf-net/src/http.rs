//! HTTP/1.1 message encoding and response parsing.

use crate::Method;
use crate::url::TargetUrl;
use brotli::Decompressor;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use std::io::BufRead;
use std::io::Read;

const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Header with a wire-safe name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> EmbedResult<Self> {
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(EmbedError::new(
                "net.http.header_name_invalid",
                format!("invalid HTTP header name `{name}`"),
            ));
        }

        if value.bytes().any(|byte| matches!(byte, b'\r' | b'\n' | 0)) {
            return Err(EmbedError::new(
                "net.http.header_value_invalid",
                format!("invalid characters in HTTP header `{name}`"),
            ));
        }

        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Request as it will be written to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    pub url: TargetUrl,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl WireRequest {
    pub fn new(method: Method, url: TargetUrl) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Sets a header, replacing any existing header with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> EmbedResult<()> {
        let header = Header::new(name, value)?;
        self.headers
            .retain(|existing| !existing.name.eq_ignore_ascii_case(name));
        self.headers.push(header);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Serializes the request; `Host`, `Content-Length`, and `Connection: close` are implied.
    pub fn encode(&self) -> EmbedResult<Vec<u8>> {
        if matches!(self.method, Method::Get | Method::Head) && !self.body.is_empty() {
            return Err(EmbedError::new(
                "net.http.body_disallowed",
                format!("{} requests must not include a body", self.method.as_str()),
            ));
        }

        let mut out = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\n",
            self.method.as_str(),
            self.url.path_and_query(),
            self.url.authority()
        );
        for header in &self.headers {
            if is_managed_header(&header.name) {
                continue;
            }
            out.push_str(&header.name);
            out.push_str(": ");
            out.push_str(&header.value);
            out.push_str("\r\n");
        }
        if !self.body.is_empty() {
            out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        out.push_str("Connection: close\r\n\r\n");

        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }
}

/// Parsed response before redirect handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }
}

/// Reads one response from a connection the request asked to close.
pub fn read_response<R: BufRead>(reader: &mut R, method: Method) -> EmbedResult<WireResponse> {
    let status_line = read_line(reader, "net.http.unexpected_eof")?;
    let status = parse_status_line(&status_line)?;

    let mut headers = Vec::new();
    let mut head_bytes = status_line.len();
    loop {
        let line = read_line(reader, "net.http.unexpected_eof")?;
        if line.is_empty() {
            break;
        }
        head_bytes += line.len();
        if head_bytes > MAX_HEAD_BYTES {
            return Err(EmbedError::new(
                "net.http.head_too_large",
                format!("response head exceeds {MAX_HEAD_BYTES} bytes"),
            ));
        }

        let (name, value) = line.split_once(':').ok_or_else(|| {
            EmbedError::new(
                "net.http.header_invalid",
                format!("invalid HTTP header line `{line}`"),
            )
        })?;
        headers.push(Header::new(name.trim(), value.trim())?);
    }

    let body = if method == Method::Head || status_disallows_body(status) {
        Vec::new()
    } else {
        let raw = read_body(reader, &headers)?;
        decode_content(&headers, raw)?
    };

    Ok(WireResponse {
        status,
        headers,
        body,
    })
}

fn read_body<R: BufRead>(reader: &mut R, headers: &[Header]) -> EmbedResult<Vec<u8>> {
    if let Some(transfer) = find_header(headers, "transfer-encoding") {
        if !has_token(transfer, "chunked") {
            return Err(EmbedError::new(
                "net.http.transfer_encoding_unsupported",
                format!("unsupported transfer encoding `{transfer}`"),
            ));
        }
        return read_chunked(reader);
    }

    let mut body = Vec::new();
    match content_length(headers)? {
        Some(length) => {
            body.resize(length, 0);
            reader.read_exact(&mut body).map_err(|error| {
                EmbedError::new(
                    "net.http.read_body_failed",
                    format!("body ended before {length} bytes: {error}"),
                )
            })?;
        }
        None => {
            reader.read_to_end(&mut body).map_err(|error| {
                EmbedError::new(
                    "net.http.read_body_failed",
                    format!("failed reading close-delimited body: {error}"),
                )
            })?;
        }
    }
    Ok(body)
}

fn read_chunked<R: BufRead>(reader: &mut R) -> EmbedResult<Vec<u8>> {
    let mut body = Vec::new();

    loop {
        let line = read_line(reader, "net.http.read_body_failed")?;
        let size_text = line.split(';').next().unwrap_or_default().trim();
        if size_text.is_empty() {
            continue;
        }
        let size = usize::from_str_radix(size_text, 16).map_err(|error| {
            EmbedError::new(
                "net.http.chunk_size_invalid",
                format!("invalid chunk size `{size_text}`: {error}"),
            )
        })?;

        if size == 0 {
            // Trailer section ends at the first empty line.
            while !read_line(reader, "net.http.read_body_failed")?.is_empty() {}
            return Ok(body);
        }

        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).map_err(|error| {
            EmbedError::new(
                "net.http.read_body_failed",
                format!("chunk ended early: {error}"),
            )
        })?;

        if !read_line(reader, "net.http.read_body_failed")?.is_empty() {
            return Err(EmbedError::new(
                "net.http.chunk_terminator_invalid",
                "chunk data is missing its trailing CRLF",
            ));
        }
    }
}

/// Reads a CRLF (or bare LF) terminated line without the terminator.
fn read_line<R: BufRead>(reader: &mut R, eof_code: &'static str) -> EmbedResult<String> {
    let mut raw = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut raw)
        .map_err(|error| {
            EmbedError::new("net.http.read_failed", format!("connection read failed: {error}"))
        })?;

    if read == 0 {
        return Err(EmbedError::new(eof_code, "connection closed mid-message"));
    }
    if raw.last() != Some(&b'\n') {
        return Err(EmbedError::new(
            "net.http.line_too_large",
            format!("protocol line exceeds {MAX_LINE_BYTES} bytes"),
        ));
    }

    raw.pop();
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|error| {
        EmbedError::new(
            "net.http.line_invalid_utf8",
            format!("protocol line is not UTF-8: {error}"),
        )
    })
}

fn parse_status_line(line: &str) -> EmbedResult<u16> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !matches!(version, "HTTP/1.0" | "HTTP/1.1") {
        return Err(EmbedError::new(
            "net.http.version_unsupported",
            format!("unsupported response version in `{line}`"),
        ));
    }

    let code = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
        .ok_or_else(|| {
            EmbedError::new(
                "net.http.status_invalid",
                format!("invalid status code in `{line}`"),
            )
        })?;
    Ok(code)
}

fn content_length(headers: &[Header]) -> EmbedResult<Option<usize>> {
    let mut length: Option<usize> = None;
    for header in headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-length"))
    {
        let parsed = header.value.trim().parse::<usize>().map_err(|error| {
            EmbedError::new(
                "net.http.content_length_invalid",
                format!("invalid Content-Length `{}`: {error}", header.value),
            )
        })?;
        if length.is_some_and(|existing| existing != parsed) {
            return Err(EmbedError::new(
                "net.http.content_length_conflict",
                "conflicting Content-Length headers",
            ));
        }
        length = Some(parsed);
    }
    Ok(length)
}

fn decode_content(headers: &[Header], body: Vec<u8>) -> EmbedResult<Vec<u8>> {
    let Some(encodings) = find_header(headers, "content-encoding") else {
        return Ok(body);
    };

    let mut decoded = body;
    for encoding in encodings.rsplit(',').map(|token| token.trim().to_ascii_lowercase()) {
        decoded = match encoding.as_str() {
            "" | "identity" => decoded,
            "gzip" | "x-gzip" => inflate(GzDecoder::new(decoded.as_slice()), "gzip")?,
            "deflate" => match inflate(ZlibDecoder::new(decoded.as_slice()), "deflate") {
                Ok(inflated) => inflated,
                Err(_) => inflate(DeflateDecoder::new(decoded.as_slice()), "deflate")?,
            },
            "br" => inflate(Decompressor::new(decoded.as_slice(), 4096), "brotli")?,
            other => {
                return Err(EmbedError::new(
                    "net.http.content_encoding_unsupported",
                    format!("unsupported content encoding `{other}`"),
                ));
            }
        };
    }
    Ok(decoded)
}

fn inflate<R: Read>(mut decoder: R, label: &str) -> EmbedResult<Vec<u8>> {
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|error| {
        EmbedError::new("net.http.decode_failed", format!("{label} decode failed: {error}"))
    })?;
    Ok(out)
}

fn status_disallows_body(status: u16) -> bool {
    (100..200).contains(&status) || status == 204 || status == 304
}

fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.as_str())
}

fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

fn is_managed_header(name: &str) -> bool {
    ["host", "content-length", "connection"]
        .iter()
        .any(|managed| name.eq_ignore_ascii_case(managed))
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

#[cfg(test)]
mod tests {
    use super::Header;
    use super::WireRequest;
    use super::read_response;
    use crate::Method;
    use crate::url::TargetUrl;
    use brotli::CompressorWriter;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Cursor;
    use std::io::Write;

    fn target(input: &str) -> TargetUrl {
        match TargetUrl::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn parse(raw: &[u8]) -> super::WireResponse {
        match read_response(&mut Cursor::new(raw.to_vec()), Method::Get) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn encodes_request_with_implied_headers() {
        let mut request = WireRequest::new(Method::Post, target("https://x.example:8443/api/session?a=1"));
        request.body = b"{}".to_vec();
        assert!(request.set_header("Content-Type", "application/json").is_ok());
        assert!(request.set_header("Host", "ignored.example").is_ok());

        let encoded = match request.encode() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(
            String::from_utf8_lossy(&encoded),
            "POST /api/session?a=1 HTTP/1.1\r\nHost: x.example:8443\r\n\
             Content-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}"
        );
    }

    #[test]
    fn get_requests_cannot_carry_a_body() {
        let mut request = WireRequest::new(Method::Get, target("https://x.example/"));
        request.body = vec![1];
        assert!(matches!(request.encode(), Err(error) if error.code == "net.http.body_disallowed"));
    }

    #[test]
    fn rejects_header_injection() {
        assert!(Header::new("X-Test", "a\r\nInjected: 1").is_err());
        assert!(Header::new("Bad Name", "x").is_err());
    }

    #[test]
    fn reads_content_length_body() {
        let response = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-A: b\r\n\r\nhello trailing");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hello");
        assert_eq!(response.header("x-a"), Some("b"));
    }

    #[test]
    fn reads_chunked_body_with_trailers() {
        let response = parse(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: 1\r\n\r\n",
        );
        assert_eq!(response.body, b"Wikipedia");
    }

    #[test]
    fn reads_close_delimited_body() {
        let response = parse(b"HTTP/1.0 200 OK\r\n\r\n<nav></nav>");
        assert_eq!(response.body, b"<nav></nav>");
    }

    #[test]
    fn bodyless_statuses_skip_body() {
        let response = parse(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n");
        assert!(response.body.is_empty());
    }

    #[test]
    fn rejects_malformed_responses() {
        let bad_chunk = read_response(
            &mut Cursor::new(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nZ\r\nx\r\n0\r\n\r\n".to_vec()),
            Method::Get,
        );
        assert!(matches!(bad_chunk, Err(error) if error.code == "net.http.chunk_size_invalid"));

        let bad_te = read_response(
            &mut Cursor::new(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\nbody".to_vec()),
            Method::Get,
        );
        assert!(matches!(bad_te, Err(error) if error.code == "net.http.transfer_encoding_unsupported"));

        let bad_version = read_response(&mut Cursor::new(b"SPDY/3 200 OK\r\n\r\n".to_vec()), Method::Get);
        assert!(matches!(bad_version, Err(error) if error.code == "net.http.version_unsupported"));
    }

    #[test]
    fn decodes_gzip_and_brotli_bodies() {
        let mut gzipped = Vec::new();
        {
            let mut encoder = GzEncoder::new(&mut gzipped, Compression::default());
            assert!(encoder.write_all(b"<header>gz</header>").is_ok());
            assert!(encoder.finish().is_ok());
        }
        let mut raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
            gzipped.len()
        )
        .into_bytes();
        raw.extend_from_slice(&gzipped);
        assert_eq!(parse(&raw).body, b"<header>gz</header>");

        let mut compressed = Vec::new();
        {
            let mut writer = CompressorWriter::new(&mut compressed, 4096, 5, 22);
            assert!(writer.write_all(b"<footer>br</footer>").is_ok());
            assert!(writer.flush().is_ok());
        }
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: br\r\n\r\n".to_vec();
        raw.extend_from_slice(&compressed);
        assert_eq!(parse(&raw).body, b"<footer>br</footer>");
    }
}
