use crate::error::Error;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::random;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::time::{timeout, Duration};
use url::Url;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const REQUEST_DELIMITER: &str = "\r\n\r\n";
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// The parsed HTTP request line and lower-cased header map of an inbound
/// upgrade request, produced by [`parse_http_request`].
#[derive(Debug)]
pub struct HttpHeaders {
    pub method: String,
    pub uri: String,
    pub headers: HashMap<String, String>,
}

impl HttpHeaders {
    fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

pub fn generate_websocket_key() -> String {
    let random_bytes: [u8; 16] = random();
    BASE64_STANDARD.encode(random_bytes)
}

fn accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Builds the literal client GET request text for `url`, along with the
/// `host:port` to dial and whether the scheme calls for TLS. Dialing the
/// socket and wrapping it in TLS both stay the caller's responsibility.
pub fn build_client_request(url: &str, key: &str) -> Result<(String, String, bool), Error> {
    let parsed = Url::parse(url)?;
    let use_tls = match parsed.scheme() {
        "ws" => false,
        "wss" => true,
        _ => return Err(Error::InvalidSchemeURL),
    };
    let default_port = if use_tls { 443 } else { 80 };

    let host = parsed.host_str().ok_or(Error::URLNoHost)?;
    let port = parsed.port().unwrap_or(default_port);
    let host_and_port = format!("{host}:{port}");

    let host_header = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );

    Ok((request, host_and_port, use_tls))
}

/// Checks a server's 101 response against the key this client sent.
pub fn verify_accept_response(response: &str, key: &str) -> Result<(), Error> {
    if !response.starts_with("HTTP/1.1 101") {
        return Err(Error::NoUpgrade);
    }
    let headers = parse_header_block(response);
    let got = headers
        .get("sec-websocket-accept")
        .ok_or(Error::InvalidAcceptKey)?;
    if got != accept_value(key) {
        return Err(Error::InvalidAcceptKey);
    }
    Ok(())
}

/// Renders the literal 101 Switching Protocols response for `accept_b64`.
pub fn render_accept_response(accept_b64: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_b64}\r\n\
         \r\n"
    )
}

/// Reads a bare HTTP request (request line + headers, no body) off `reader`,
/// bounded by a read timeout so a connection that never completes the
/// handshake can't hold a task open indefinitely.
pub async fn parse_http_request<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<HttpHeaders, Error> {
    let buffer = read_header_block(reader).await?;
    parse_header_block(&buffer)
        .into_request()
        .ok_or(Error::IncompleteHTTPRequest)
}

/// Reads a server's status line and headers (no body) off `reader`, for the
/// client side of the handshake.
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String, Error> {
    read_header_block(reader).await
}

async fn read_header_block<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String, Error> {
    let mut buffer = String::new();
    timeout(HEADER_READ_TIMEOUT, async {
        loop {
            let bytes_read = reader.read_line(&mut buffer).await?;
            if bytes_read == 0 || buffer.ends_with(REQUEST_DELIMITER) {
                break;
            }
        }
        Ok::<(), Error>(())
    })
    .await??;
    Ok(buffer)
}

/// Parsed form used both for the server-side request and for scanning the
/// client-side 101 response for `Sec-WebSocket-Accept`.
struct HeaderBlock {
    request_line: Option<String>,
    headers: HashMap<String, String>,
}

impl HeaderBlock {
    fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn into_request(self) -> Option<HttpHeaders> {
        let request_line = self.request_line?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let uri = parts.next()?.to_string();
        Some(HttpHeaders {
            method,
            uri,
            headers: self.headers,
        })
    }
}

fn parse_header_block(text: &str) -> HeaderBlock {
    let header_part = text.split("\r\n\r\n").next().unwrap_or(text);
    let mut lines = header_part.lines();
    let request_line = lines.next().map(str::to_string);
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    HeaderBlock {
        request_line,
        headers,
    }
}

/// Validates the upgrade headers of an inbound client request in the order
/// a non-conforming client is most likely to get wrong: Host, Upgrade,
/// Connection, Sec-WebSocket-Version, Sec-WebSocket-Key. Returns the key on
/// success so the caller can derive the accept value.
pub fn validate_client_headers(headers: &HttpHeaders) -> Result<String, Error> {
    if headers.get("host").is_none() {
        return Err(Error::NoHostHeaderPresent);
    }
    if !headers
        .get("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    {
        return Err(Error::NoUpgradeHeaderPresent);
    }
    if !headers
        .get("connection")
        .is_some_and(|v| v.eq_ignore_ascii_case("upgrade"))
    {
        return Err(Error::NoConnectionHeaderPresent);
    }
    if headers.get("sec-websocket-version") != Some("13") {
        return Err(Error::InvalidWebsocketVersion);
    }
    let key = headers
        .get("sec-websocket-key")
        .ok_or(Error::InvalidSecWebsocketKey)?;
    let decoded = BASE64_STANDARD
        .decode(key)
        .map_err(|_| Error::InvalidSecWebsocketKey)?;
    if decoded.len() != 16 {
        return Err(Error::InvalidSecWebsocketKey);
    }
    Ok(key.to_string())
}

/// Derives the `Sec-WebSocket-Accept` value for a validated client key.
pub fn generate_websocket_accept_value(key: &str) -> String {
    accept_value(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        HttpHeaders {
            method: "GET".to_string(),
            uri: "/".to_string(),
            headers: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn accept_value_matches_rfc_6455_example() {
        // Example straight from RFC 6455 section 1.3.
        assert_eq!(
            accept_value("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn valid_client_headers_pass() {
        let h = headers(&[
            ("host", "example.com"),
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
            ("sec-websocket-version", "13"),
            ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
        ]);
        assert_eq!(
            validate_client_headers(&h).unwrap(),
            "dGhlIHNhbXBsZSBub25jZQ=="
        );
    }

    #[test]
    fn missing_host_is_rejected_first() {
        let h = headers(&[("upgrade", "websocket"), ("connection", "upgrade")]);
        assert!(matches!(
            validate_client_headers(&h),
            Err(Error::NoHostHeaderPresent)
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let h = headers(&[
            ("host", "example.com"),
            ("upgrade", "websocket"),
            ("connection", "upgrade"),
            ("sec-websocket-version", "8"),
        ]);
        assert!(matches!(
            validate_client_headers(&h),
            Err(Error::InvalidWebsocketVersion)
        ));
    }

    #[test]
    fn short_key_is_rejected() {
        let h = headers(&[
            ("host", "example.com"),
            ("upgrade", "websocket"),
            ("connection", "upgrade"),
            ("sec-websocket-version", "13"),
            ("sec-websocket-key", "dG9vc2hvcnQ="),
        ]);
        assert!(matches!(
            validate_client_headers(&h),
            Err(Error::InvalidSecWebsocketKey)
        ));
    }

    #[test]
    fn client_request_renders_expected_headers() {
        let (request, host_and_port, use_tls) =
            build_client_request("ws://example.com/chat", "abc123").unwrap();
        assert!(request.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: abc123\r\n"));
        assert_eq!(host_and_port, "example.com:80");
        assert!(!use_tls);
    }

    #[test]
    fn non_ws_scheme_is_rejected() {
        assert!(matches!(
            build_client_request("http://example.com", "k"),
            Err(Error::InvalidSchemeURL)
        ));
    }

    #[test]
    fn verify_accept_response_checks_digest() {
        let response = render_accept_response(&accept_value("dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(verify_accept_response(&response, "dGhlIHNhbXBsZSBub25jZQ==").is_ok());
        assert!(verify_accept_response(&response, "d2hvb3BzLW5vbmNl").is_err());
    }
}
