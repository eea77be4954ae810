use embassy_net::{
    dns::DnsQueryType,
    tcp::TcpSocket,
    IpAddress, IpEndpoint, Ipv4Address, Stack,
};
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Write;
use esp_println::println;

use super::super::config::{INTERNET_PROBE_HOSTS, PROBE_TIMEOUT_SECS};

const HTTP_FETCH_TIMEOUT_SECS: u64 = 10;
const PROBE_SOCK_BUF: usize = 512;
const HTTP_RW_BUF: usize = 2048;

/// Reachability of the internet at large: one bounded TCP dial per
/// well-known host, first answer short-circuits. No retries here; the
/// health monitor owns retry policy.
pub(crate) async fn probe_internet(stack: Stack<'static>) -> bool {
    for (host, port) in INTERNET_PROBE_HOSTS {
        if dial(stack, host, port).await {
            return true;
        }
    }
    false
}

async fn dial(stack: Stack<'static>, host: Ipv4Address, port: u16) -> bool {
    let mut rx_buffer = [0u8; PROBE_SOCK_BUF];
    let mut tx_buffer = [0u8; PROBE_SOCK_BUF];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(PROBE_TIMEOUT_SECS)));

    let endpoint = IpEndpoint::new(IpAddress::Ipv4(host), port);
    let reachable = matches!(
        with_timeout(
            Duration::from_secs(PROBE_TIMEOUT_SECS),
            socket.connect(endpoint),
        )
        .await,
        Ok(Ok(()))
    );
    socket.close();
    if !reachable {
        println!("probe: {}:{} unreachable", host, port);
    }
    reachable
}

/// Endpoint reachability: a single GET, success being any status line at all.
/// A 500 from the API still means the path to it works; only transport
/// failures count as unreachable.
pub(crate) async fn probe_endpoint(stack: Stack<'static>, url: &str) -> bool {
    let mut response = [0u8; HTTP_RW_BUF];
    match fetch(stack, url, &mut response).await {
        Ok((status, _)) => status > 0,
        Err(err) => {
            println!("probe: endpoint {} failed: {}", url, err);
            false
        }
    }
}

/// Plain-HTTP GET. Fills `response` with as much of the raw reply as fits
/// and returns the status code plus the number of bytes captured.
pub(crate) async fn fetch(
    stack: Stack<'static>,
    url: &str,
    response: &mut [u8],
) -> Result<(u16, usize), &'static str> {
    let parts = parse_url(url).ok_or("bad url")?;

    let address = resolve(stack, parts.host).await?;

    let mut rx_buffer = [0u8; HTTP_RW_BUF];
    let mut tx_buffer = [0u8; HTTP_RW_BUF];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(HTTP_FETCH_TIMEOUT_SECS)));

    let endpoint = IpEndpoint::new(IpAddress::Ipv4(address), parts.port);
    with_timeout(
        Duration::from_secs(PROBE_TIMEOUT_SECS),
        socket.connect(endpoint),
    )
    .await
    .map_err(|_| "connect timeout")?
    .map_err(|_| "connect")?;

    let mut request: heapless::String<256> = heapless::String::new();
    core::fmt::Write::write_fmt(
        &mut request,
        format_args!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nUser-Agent: netsentry\r\n\r\n",
            parts.path, parts.host
        ),
    )
    .map_err(|_| "request too long")?;
    socket
        .write_all(request.as_bytes())
        .await
        .map_err(|_| "write")?;

    let mut filled = 0usize;
    loop {
        if filled == response.len() {
            break;
        }
        match socket.read(&mut response[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => {
                if filled == 0 {
                    socket.close();
                    return Err("read");
                }
                break;
            }
        }
    }
    socket.close();

    let status = parse_status_line(&response[..filled]).ok_or("no status line")?;
    Ok((status, filled))
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<Ipv4Address, &'static str> {
    if let Ok(literal) = host.parse::<Ipv4Address>() {
        return Ok(literal);
    }
    let addresses = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|_| "dns")?;
    match addresses.first() {
        Some(IpAddress::Ipv4(address)) => Ok(*address),
        _ => Err("dns empty"),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UrlParts<'a> {
    pub(crate) host: &'a str,
    pub(crate) port: u16,
    pub(crate) path: &'a str,
}

/// Splits `http://host[:port]/path?query`. Only plain HTTP; anything else is
/// rejected rather than silently probed on the wrong port.
pub(crate) fn parse_url(url: &str) -> Option<UrlParts<'_>> {
    let rest = url.strip_prefix("http://")?;
    let (authority, path) = match rest.find('/') {
        Some(index) => (&rest[..index], &rest[index..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok()?),
        None => (authority, 80),
    };
    if host.is_empty() {
        return None;
    }
    Some(UrlParts { host, port, path })
}

/// Pulls the status code out of `HTTP/1.x NNN ...`. Any parsable code counts,
/// whatever its class.
pub(crate) fn parse_status_line(response: &[u8]) -> Option<u16> {
    let line_end = response
        .iter()
        .position(|&byte| byte == b'\r' || byte == b'\n')
        .unwrap_or(response.len());
    let line = core::str::from_utf8(&response[..line_end]).ok()?;
    let mut parts = line.split_ascii_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_with_port_and_path() {
        let parts = parse_url("http://192.168.1.10:8080/api/health").unwrap();
        assert_eq!(parts.host, "192.168.1.10");
        assert_eq!(parts.port, 8080);
        assert_eq!(parts.path, "/api/health");
    }

    #[test]
    fn url_defaults_to_port_80_and_root_path() {
        let parts = parse_url("http://example.net").unwrap();
        assert_eq!(parts.port, 80);
        assert_eq!(parts.path, "/");
    }

    #[test]
    fn url_keeps_the_query_in_the_path() {
        let parts = parse_url("http://example.net/ping?x=1&y=2").unwrap();
        assert_eq!(parts.path, "/ping?x=1&y=2");
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert!(parse_url("https://example.net/").is_none());
        assert!(parse_url("example.net/").is_none());
        assert!(parse_url("http://").is_none());
        assert!(parse_url("http://host:notaport/").is_none());
    }

    #[test]
    fn status_line_parses_any_code() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK\r\n"), Some(200));
        assert_eq!(parse_status_line(b"HTTP/1.1 503 Unavailable\r\n"), Some(503));
        assert_eq!(parse_status_line(b"HTTP/1.0 404 Not Found\r\nbody"), Some(404));
    }

    #[test]
    fn garbage_has_no_status() {
        assert_eq!(parse_status_line(b"SSH-2.0-OpenSSH\r\n"), None);
        assert_eq!(parse_status_line(b""), None);
        assert_eq!(parse_status_line(b"HTTP/1.1"), None);
    }
}
