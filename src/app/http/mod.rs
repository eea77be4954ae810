mod helpers;
mod pages;

use embassy_net::{tcp::TcpSocket, IpListenEndpoint, Stack};
use embassy_time::{with_timeout, Duration, Timer};
use esp_println::println;

use helpers::{
    drain_remaining_body, find_header_end, form_field, parse_content_length, parse_request_line,
    target_path, target_query, write_html, write_text,
};

use super::config::channels::MODE_COMMANDS;
use super::config::{HTTP_PORT, MODE_GATE_POLL_MS, NETWORK_NAME_MAX, NETWORK_SECRET_MAX, API_URL_MAX};
use super::health::{counters, snapshot};
use super::net::probe;
use super::store;
use super::types::{DeviceConfig, ModeCommand, OperatingMode};

const HTTP_HEADER_MAX: usize = 1024;
const HTTP_RW_BUF: usize = 2048;
const FORM_BODY_MAX: usize = 512;
const PROXY_RESPONSE_MAX: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RouteSet {
    Station,
    Portal,
}

/// Dashboard and control routes, served while the device is a station.
#[embassy_executor::task]
pub(crate) async fn station_http_task(stack: Stack<'static>, config: DeviceConfig) {
    serve(stack, RouteSet::Station, config).await;
}

/// The captive configuration form, served on the portal address.
#[embassy_executor::task]
pub(crate) async fn portal_http_task(stack: Stack<'static>, config: DeviceConfig) {
    serve(stack, RouteSet::Portal, config).await;
}

fn route_mode(routes: RouteSet) -> OperatingMode {
    match routes {
        RouteSet::Station => OperatingMode::Station,
        RouteSet::Portal => OperatingMode::ConfigurationPortal,
    }
}

async fn serve(stack: Stack<'static>, routes: RouteSet, config: DeviceConfig) {
    let mut rx_buffer = [0u8; HTTP_RW_BUF];
    let mut tx_buffer = [0u8; HTTP_RW_BUF];
    let mut announced = false;

    loop {
        if snapshot::current_mode() != route_mode(routes) {
            announced = false;
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }
        if !announced {
            if let Some(net_config) = stack.config_v4() {
                announced = true;
                println!(
                    "http: listening on {}:{}",
                    net_config.address.address(),
                    HTTP_PORT
                );
            }
        }

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(20)));

        let accepted = socket
            .accept(IpListenEndpoint {
                addr: None,
                port: HTTP_PORT,
            })
            .await;
        if let Err(err) = accepted {
            println!("http: accept err={:?}", err);
            continue;
        }

        if let Err(err) = handle_connection(&mut socket, stack, routes, &config).await {
            println!("http: request err={}", err);
        }

        let _ = with_timeout(Duration::from_millis(250), socket.flush()).await;
        socket.close();
    }
}

async fn handle_connection(
    socket: &mut TcpSocket<'_>,
    stack: Stack<'static>,
    routes: RouteSet,
    config: &DeviceConfig,
) -> Result<(), &'static str> {
    let mut header_buf = [0u8; HTTP_HEADER_MAX];
    let mut filled = 0usize;
    let header_end = loop {
        if filled == header_buf.len() {
            write_text(socket, "413 Payload Too Large", b"header too large").await;
            return Err("header too large");
        }
        let n = socket
            .read(&mut header_buf[filled..])
            .await
            .map_err(|_| "read")?;
        if n == 0 {
            return Err("eof");
        }
        filled += n;
        if let Some(end) = find_header_end(&header_buf[..filled]) {
            break end;
        }
    };

    let header = core::str::from_utf8(&header_buf[..header_end]).map_err(|_| "header utf8")?;
    let (method, target) = parse_request_line(header).ok_or("bad request line")?;
    let content_length = match parse_content_length(header) {
        Ok(value) => value.unwrap_or(0),
        Err(err) => {
            write_text(socket, "400 Bad Request", b"invalid Content-Length").await;
            return Err(err);
        }
    };
    let body_start = header_end + 4;
    let body_in_buffer = filled.saturating_sub(body_start);
    let path = target_path(target);

    // Stash the target before the header buffer is reused for the body; a
    // fully percent-encoded proxy URL can stretch it well past 256 bytes.
    let mut target_copy: heapless::String<512> = heapless::String::new();
    target_copy.push_str(target).map_err(|_| "target too long")?;

    match (method, path, routes) {
        ("POST", "/save", _) => {
            let mut body = [0u8; FORM_BODY_MAX];
            let body_len = read_body(
                socket,
                &header_buf,
                body_start,
                body_in_buffer,
                content_length,
                &mut body,
            )
            .await?;
            handle_save(socket, &body[..body_len]).await
        }
        ("GET", "/reset", _) => handle_factory_reset(socket).await,
        ("GET", "/", RouteSet::Station) => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            let mut page: heapless::String<{ pages::PAGE_BUF }> = heapless::String::new();
            pages::render_dashboard(&mut page, &snapshot::read(), &counters::load(), config);
            write_html(socket, "200 OK", page.as_bytes()).await;
            Ok(())
        }
        ("GET", "/reboot", RouteSet::Station) => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            write_text(socket, "200 OK", b"rebooting").await;
            restart_after_reply(socket).await
        }
        ("GET", "/configmode", RouteSet::Station) => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            MODE_COMMANDS
                .send(ModeCommand::EnterConfigurationPortal)
                .await;
            write_text(socket, "200 OK", b"entering configuration mode").await;
            Ok(())
        }
        ("GET", "/sendApiRequest", RouteSet::Station) => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            handle_proxy_request(socket, stack, &target_copy).await
        }
        ("GET", "/", RouteSet::Portal) => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            let mut page: heapless::String<{ pages::PAGE_BUF }> = heapless::String::new();
            pages::render_config_form(&mut page, config);
            write_html(socket, "200 OK", page.as_bytes()).await;
            Ok(())
        }
        ("GET", "/debug", RouteSet::Portal) => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            let mut page: heapless::String<{ pages::PAGE_BUF }> = heapless::String::new();
            pages::render_debug(&mut page, &snapshot::read(), &counters::load(), config);
            write_text(socket, "200 OK", page.as_bytes()).await;
            Ok(())
        }
        (_, _, RouteSet::Portal) => {
            // Captive-portal detection hits arbitrary paths; all of them get
            // the form so the browser surfaces it.
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            let mut page: heapless::String<{ pages::PAGE_BUF }> = heapless::String::new();
            pages::render_config_form(&mut page, config);
            write_html(socket, "200 OK", page.as_bytes()).await;
            Ok(())
        }
        _ => {
            drain_remaining_body(socket, content_length, body_in_buffer).await?;
            write_text(socket, "404 Not Found", b"not found").await;
            Ok(())
        }
    }
}

async fn read_body(
    socket: &mut TcpSocket<'_>,
    header_buf: &[u8],
    body_start: usize,
    body_in_buffer: usize,
    content_length: usize,
    body: &mut [u8],
) -> Result<usize, &'static str> {
    if content_length > body.len() {
        write_text(socket, "413 Payload Too Large", b"body too large").await;
        return Err("body too large");
    }
    let copied = body_in_buffer.min(content_length);
    body[..copied].copy_from_slice(&header_buf[body_start..body_start + copied]);
    let mut filled = copied;
    while filled < content_length {
        let n = socket
            .read(&mut body[filled..content_length])
            .await
            .map_err(|_| "body read")?;
        if n == 0 {
            return Err("body eof");
        }
        filled += n;
    }
    Ok(filled)
}

/// POST /save from either mode: a missing or empty network name is rejected
/// outright; anything else is persisted and the device restarts into a fresh
/// station attempt.
async fn handle_save(
    socket: &mut TcpSocket<'_>,
    body: &[u8],
) -> Result<(), &'static str> {
    let body = core::str::from_utf8(body).map_err(|_| "body utf8")?;

    let mut name = [0u8; NETWORK_NAME_MAX];
    let mut secret = [0u8; NETWORK_SECRET_MAX];
    let mut api_url = [0u8; API_URL_MAX];

    let name_len = match form_field(body, "name", &mut name) {
        Some(len) if len > 0 => len,
        _ => {
            write_text(socket, "400 Bad Request", b"network name is required").await;
            return Err("save without network name");
        }
    };
    let secret_len = form_field(body, "secret", &mut secret).unwrap_or(0);
    let api_url_len = form_field(body, "api", &mut api_url).unwrap_or(0);

    let config = DeviceConfig::from_parts(
        &name[..name_len],
        &secret[..secret_len],
        &api_url[..api_url_len],
    );
    match store::with_store(|settings| settings.save(&config)) {
        Some(Ok(())) => {
            println!("store: settings saved, restarting");
            let mut page: heapless::String<{ pages::PAGE_BUF }> = heapless::String::new();
            pages::render_saved_page(&mut page);
            write_html(socket, "200 OK", page.as_bytes()).await;
            restart_after_reply(socket).await
        }
        Some(Err(err)) => {
            println!("store: settings save failed: {:?}", err);
            write_text(socket, "500 Internal Server Error", b"settings commit failed").await;
            Err("settings commit failed")
        }
        None => Err("settings store missing"),
    }
}

async fn handle_factory_reset(socket: &mut TcpSocket<'_>) -> Result<(), &'static str> {
    match store::with_store(|settings| settings.reset_to_defaults()) {
        Some(Ok(())) => {
            println!("store: factory reset, restarting");
            write_text(socket, "200 OK", b"factory defaults restored, restarting").await;
            restart_after_reply(socket).await
        }
        Some(Err(err)) => {
            println!("store: factory reset failed: {:?}", err);
            write_text(socket, "500 Internal Server Error", b"factory reset failed").await;
            Err("factory reset failed")
        }
        None => Err("settings store missing"),
    }
}

/// GET /sendApiRequest?url=... fetches an arbitrary caller-supplied URL and
/// relays status plus body. Deliberately unrestricted; every use is logged.
async fn handle_proxy_request(
    socket: &mut TcpSocket<'_>,
    stack: Stack<'static>,
    target: &str,
) -> Result<(), &'static str> {
    let mut url = [0u8; API_URL_MAX];
    let url_len = match form_field(target_query(target), "url", &mut url) {
        Some(len) if len > 0 => len,
        _ => {
            write_text(socket, "400 Bad Request", b"missing url parameter").await;
            return Err("proxy without url");
        }
    };
    let url = core::str::from_utf8(&url[..url_len]).map_err(|_| "url utf8")?;
    println!("http: proxying caller-supplied url {}", url);

    let mut response = [0u8; PROXY_RESPONSE_MAX];
    match probe::fetch(stack, url, &mut response).await {
        Ok((status, len)) => {
            let body = find_header_end(&response[..len])
                .map(|end| &response[end + 4..len])
                .unwrap_or(&[]);
            let mut status_line: heapless::String<16> = heapless::String::new();
            let _ = core::fmt::Write::write_fmt(&mut status_line, format_args!("{}\n\n", status));
            write_proxy_reply(socket, status_line.as_bytes(), body).await;
            Ok(())
        }
        Err(err) => {
            write_text(socket, "502 Bad Gateway", err.as_bytes()).await;
            Err("proxy fetch failed")
        }
    }
}

async fn write_proxy_reply(socket: &mut TcpSocket<'_>, status_line: &[u8], body: &[u8]) {
    use embedded_io_async::Write;
    let mut header: heapless::String<128> = heapless::String::new();
    let _ = core::fmt::Write::write_fmt(
        &mut header,
        format_args!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status_line.len() + body.len()
        ),
    );
    let _ = socket.write_all(header.as_bytes()).await;
    let _ = socket.write_all(status_line).await;
    let _ = socket.write_all(body).await;
}

/// Flushes the farewell reply, then pulls the plug.
async fn restart_after_reply(socket: &mut TcpSocket<'_>) -> Result<(), &'static str> {
    let _ = with_timeout(Duration::from_millis(500), socket.flush()).await;
    socket.close();
    Timer::after(Duration::from_millis(500)).await;
    super::restart();
}
