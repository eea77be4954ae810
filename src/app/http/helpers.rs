use core::cmp::min;

use embassy_net::tcp::TcpSocket;
use embedded_io_async::Write;

pub(super) fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

pub(super) fn parse_request_line(header: &str) -> Option<(&str, &str)> {
    let first_line = header.lines().next()?;
    let mut parts = first_line.split_ascii_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let _version = parts.next()?;
    Some((method, target))
}

pub(super) fn parse_content_length(header: &str) -> Result<Option<usize>, &'static str> {
    let mut content_length = None;
    for line in header.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let parsed = value
            .trim()
            .parse::<usize>()
            .map_err(|_| "invalid content-length")?;
        if content_length.is_some() {
            return Err("duplicate content-length");
        }
        content_length = Some(parsed);
    }
    Ok(content_length)
}

pub(super) fn target_path(target: &str) -> &str {
    target.split('?').next().unwrap_or(target)
}

pub(super) fn target_query(target: &str) -> &str {
    target.split_once('?').map(|(_, query)| query).unwrap_or("")
}

/// Looks `key` up in an `application/x-www-form-urlencoded` buffer (either a
/// POST body or a query string) and percent-decodes the value into `out`.
/// Returns the decoded length; `None` when the key is absent or malformed.
pub(crate) fn form_field(encoded: &str, key: &str, out: &mut [u8]) -> Option<usize> {
    for pair in encoded.split('&') {
        let (name, value) = match pair.split_once('=') {
            Some(split) => split,
            None => (pair, ""),
        };
        if name == key {
            return percent_decode(value, out);
        }
    }
    None
}

/// In-place `%XX` and `+` decoding; bails on truncated escapes or overflow.
pub(crate) fn percent_decode(value: &str, out: &mut [u8]) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut read = 0usize;
    let mut written = 0usize;
    while read < bytes.len() {
        if written == out.len() {
            return None;
        }
        out[written] = match bytes[read] {
            b'+' => {
                read += 1;
                b' '
            }
            b'%' => {
                let high = hex_value(*bytes.get(read + 1)?)?;
                let low = hex_value(*bytes.get(read + 2)?)?;
                read += 3;
                (high << 4) | low
            }
            byte => {
                read += 1;
                byte
            }
        };
        written += 1;
    }
    Some(written)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub(super) async fn drain_remaining_body(
    socket: &mut TcpSocket<'_>,
    content_length: usize,
    already_in_buffer: usize,
) -> Result<(), &'static str> {
    if already_in_buffer >= content_length {
        return Ok(());
    }
    let mut remaining = content_length - already_in_buffer;
    let mut sink = [0u8; 256];
    while remaining > 0 {
        let want = min(remaining, sink.len());
        let n = socket.read(&mut sink[..want]).await.map_err(|_| "drain")?;
        if n == 0 {
            return Err("drain eof");
        }
        remaining -= n;
    }
    Ok(())
}

pub(super) async fn write_response(
    socket: &mut TcpSocket<'_>,
    status: &str,
    content_type: &str,
    body: &[u8],
) {
    let mut header: heapless::String<160> = heapless::String::new();
    let _ = core::fmt::Write::write_fmt(
        &mut header,
        format_args!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        ),
    );
    let _ = socket.write_all(header.as_bytes()).await;
    let _ = socket.write_all(body).await;
}

pub(super) async fn write_html(socket: &mut TcpSocket<'_>, status: &str, body: &[u8]) {
    write_response(socket, status, "text/html", body).await;
}

pub(super) async fn write_text(socket: &mut TcpSocket<'_>, status: &str, body: &[u8]) {
    write_response(socket, status, "text/plain", body).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_splits_method_and_target() {
        let header = "GET /save?x=1 HTTP/1.1\r\nHost: a\r\n";
        assert_eq!(parse_request_line(header), Some(("GET", "/save?x=1")));
        assert_eq!(target_path("/save?x=1"), "/save");
        assert_eq!(target_query("/save?x=1"), "x=1");
        assert_eq!(target_query("/save"), "");
    }

    #[test]
    fn content_length_is_parsed_case_insensitively() {
        let header = "POST /save HTTP/1.1\r\ncontent-LENGTH: 42\r\n";
        assert_eq!(parse_content_length(header), Ok(Some(42)));
        assert_eq!(parse_content_length("GET / HTTP/1.1\r\n"), Ok(None));
        assert!(parse_content_length("P / H\r\nContent-Length: x\r\n").is_err());
    }

    #[test]
    fn form_fields_decode_plus_and_percent_escapes() {
        let mut out = [0u8; 64];
        let len = form_field("name=My+Net%21&secret=p%40ss", "name", &mut out).unwrap();
        assert_eq!(&out[..len], b"My Net!");
        let len = form_field("name=My+Net%21&secret=p%40ss", "secret", &mut out).unwrap();
        assert_eq!(&out[..len], b"p@ss");
    }

    #[test]
    fn missing_keys_and_bad_escapes_yield_none() {
        let mut out = [0u8; 8];
        assert!(form_field("a=1", "b", &mut out).is_none());
        assert!(form_field("a=%zz", "a", &mut out).is_none());
        assert!(form_field("a=%4", "a", &mut out).is_none());
    }

    #[test]
    fn empty_value_decodes_to_zero_bytes() {
        let mut out = [0u8; 8];
        assert_eq!(form_field("name=&x=1", "name", &mut out), Some(0));
    }

    #[test]
    fn header_end_is_the_blank_line() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_header_end(b"partial"), None);
    }
}
