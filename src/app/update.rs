use embassy_net::{
    tcp::TcpSocket,
    udp::{self, UdpSocket},
    IpAddress, IpEndpoint, Stack,
};
use embassy_time::{with_timeout, Duration, Timer};
use embedded_io_async::Write;
use esp_println::println;

use super::config::channels::INDICATOR_COMMANDS;
use super::config::{MODE_GATE_POLL_MS, UPDATE_PORT};
use super::health::snapshot;
use super::types::{BlinkPattern, IndicatorCommand, OperatingMode, UpdateSessionEvents};

const INVITATION_MAX: usize = 128;
const IMAGE_CHUNK: usize = 1024;
const SESSION_TIMEOUT_SECS: u64 = 20;

// Diagnostic codes logged through the error hook.
pub(crate) const UPDATE_ERR_INVITATION: u8 = 1;
pub(crate) const UPDATE_ERR_CONNECT: u8 = 2;
pub(crate) const UPDATE_ERR_RECEIVE: u8 = 3;
pub(crate) const UPDATE_ERR_SHORT_IMAGE: u8 = 4;

/// Default session hooks: a distinctive blink on start, diagnostics on the
/// log for everything else. The health monitor is never involved.
pub(crate) struct IndicatorUpdateHooks;

impl UpdateSessionEvents for IndicatorUpdateHooks {
    fn on_start(&self) {
        let _ = INDICATOR_COMMANDS.try_send(IndicatorCommand::Blink(BlinkPattern::UpdateStart));
        println!("update: session started");
    }

    fn on_end(&self) {
        println!("update: session complete, restarting");
    }

    fn on_error(&self, code: u8) {
        println!("update: session error code={}", code);
    }
}

/// Remote firmware-update listener: a UDP invitation on the update port,
/// answered with OK, then the image is streamed back over TCP from the
/// sender. The session acknowledges what it received; flashing itself is the
/// update collaborator's concern.
#[embassy_executor::task]
pub(crate) async fn update_listener_task(
    stack: Stack<'static>,
    hooks: &'static dyn UpdateSessionEvents,
) {
    let mut rx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; 512];
    let mut tx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; 512];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if socket.bind(UPDATE_PORT).is_err() {
        println!("update: listener bind failed, remote update unavailable");
        return;
    }

    let mut frame = [0u8; INVITATION_MAX];
    loop {
        if !matches!(snapshot::current_mode(), OperatingMode::Station) {
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }

        let Ok((len, remote)) = socket.recv_from(&mut frame).await else {
            continue;
        };
        let Some(invitation) = parse_invitation(&frame[..len]) else {
            hooks.on_error(UPDATE_ERR_INVITATION);
            continue;
        };

        hooks.on_start();
        println!(
            "update: invitation from {:?} image_size={} port={}",
            remote.endpoint.addr, invitation.image_size, invitation.data_port
        );
        let _ = socket.send_to(b"OK", remote).await;

        let sender = match remote.endpoint.addr {
            IpAddress::Ipv4(address) => address,
            #[allow(unreachable_patterns)]
            _ => {
                hooks.on_error(UPDATE_ERR_CONNECT);
                continue;
            }
        };

        match receive_image(stack, sender, invitation).await {
            Ok(received) if received == invitation.image_size => {
                hooks.on_end();
                Timer::after(Duration::from_millis(500)).await;
                super::restart();
            }
            Ok(_) => hooks.on_error(UPDATE_ERR_SHORT_IMAGE),
            Err(code) => hooks.on_error(code),
        }
    }
}

async fn receive_image(
    stack: Stack<'static>,
    sender: embassy_net::Ipv4Address,
    invitation: Invitation,
) -> Result<usize, u8> {
    let mut rx_buffer = [0u8; IMAGE_CHUNK];
    let mut tx_buffer = [0u8; 256];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(SESSION_TIMEOUT_SECS)));

    let endpoint = IpEndpoint::new(IpAddress::Ipv4(sender), invitation.data_port);
    with_timeout(Duration::from_secs(SESSION_TIMEOUT_SECS), socket.connect(endpoint))
        .await
        .map_err(|_| UPDATE_ERR_CONNECT)?
        .map_err(|_| UPDATE_ERR_CONNECT)?;

    let mut chunk = [0u8; IMAGE_CHUNK];
    let mut received = 0usize;
    while received < invitation.image_size {
        let n = socket
            .read(&mut chunk)
            .await
            .map_err(|_| UPDATE_ERR_RECEIVE)?;
        if n == 0 {
            break;
        }
        received += n;
        // The sender expects each chunk acknowledged with its byte count.
        let mut ack: heapless::String<16> = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut ack, format_args!("{}", n));
        socket
            .write_all(ack.as_bytes())
            .await
            .map_err(|_| UPDATE_ERR_RECEIVE)?;
    }
    let _ = socket.flush().await;
    socket.close();
    Ok(received)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Invitation {
    pub(crate) command: u8,
    pub(crate) data_port: u16,
    pub(crate) image_size: usize,
}

/// Invitation datagram: `<command> <data-port> <image-size> <md5>`, all
/// ASCII. Only the flash command (0) is accepted.
pub(crate) fn parse_invitation(frame: &[u8]) -> Option<Invitation> {
    let text = core::str::from_utf8(frame).ok()?;
    let mut parts = text.trim_end().split_ascii_whitespace();
    let command = parts.next()?.parse::<u8>().ok()?;
    if command != 0 {
        return None;
    }
    let data_port = parts.next()?.parse::<u16>().ok()?;
    let image_size = parts.next()?.parse::<usize>().ok()?;
    let md5 = parts.next()?;
    if md5.len() != 32 || image_size == 0 {
        return None;
    }
    Some(Invitation {
        command,
        data_port,
        image_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_invitation_parses() {
        let frame = b"0 43280 524288 0123456789abcdef0123456789abcdef\n";
        let invitation = parse_invitation(frame).unwrap();
        assert_eq!(invitation.data_port, 43280);
        assert_eq!(invitation.image_size, 524288);
    }

    #[test]
    fn non_flash_commands_and_junk_are_rejected() {
        assert!(parse_invitation(b"100 1 2 0123456789abcdef0123456789abcdef").is_none());
        assert!(parse_invitation(b"0 43280 524288 tooshort").is_none());
        assert!(parse_invitation(b"0 43280 0 0123456789abcdef0123456789abcdef").is_none());
        assert!(parse_invitation(b"not an invitation").is_none());
        assert!(parse_invitation(&[0xFF, 0xFE]).is_none());
    }
}
