use embassy_net::{
    udp::{self, UdpSocket},
    Stack,
};
use embassy_time::{Duration, Timer};
use esp_println::println;

use super::super::config::{MODE_GATE_POLL_MS, PORTAL_ADDR};
use super::super::health::snapshot;
use super::super::indicators;
use super::super::types::{BlinkPattern, OperatingMode};

const DNS_PORT: u16 = 53;
const DNS_FRAME_MAX: usize = 512;

/// Captive-portal DNS: every query gets answered with the portal address so
/// any browser request lands on the configuration form.
#[embassy_executor::task]
pub(crate) async fn captive_dns_task(stack: Stack<'static>) {
    let mut rx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; DNS_FRAME_MAX];
    let mut tx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; DNS_FRAME_MAX];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if socket.bind(DNS_PORT).is_err() {
        // A portal without DNS redirection is a portal nobody finds.
        println!("portal: dns responder bind failed, restarting");
        indicators::try_blink(BlinkPattern::ServiceFault);
        Timer::after(Duration::from_secs(2)).await;
        super::super::restart();
    }

    let mut announced = false;
    let mut frame = [0u8; DNS_FRAME_MAX];
    let mut response = [0u8; DNS_FRAME_MAX];

    loop {
        if !matches!(
            snapshot::current_mode(),
            OperatingMode::ConfigurationPortal
        ) {
            announced = false;
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }
        if !announced {
            announced = true;
            println!("portal: dns responder answering everything with {}", PORTAL_ADDR);
        }

        let Ok((len, remote)) = socket.recv_from(&mut frame).await else {
            continue;
        };
        let Some(response_len) = build_redirect_response(&frame[..len], &mut response) else {
            continue;
        };
        if let Err(err) = socket.send_to(&response[..response_len], remote).await {
            println!("portal: dns send err={:?}", err);
        }
    }
}

/// Echoes the query back as an authoritative answer carrying a single A
/// record that points at the portal address.
pub(crate) fn build_redirect_response(query: &[u8], response: &mut [u8]) -> Option<usize> {
    // Shorter than a DNS header is noise.
    if query.len() < 12 || query.len() + 16 > response.len() {
        return None;
    }

    response[..query.len()].copy_from_slice(query);
    // QR=1 AA=1, no error.
    response[2] = 0x84;
    response[3] = 0x00;
    // One answer.
    response[6] = 0x00;
    response[7] = 0x01;

    let mut pos = query.len();
    // Name: compression pointer to the question.
    response[pos] = 0xC0;
    response[pos + 1] = 0x0C;
    pos += 2;
    // TYPE A, CLASS IN.
    response[pos..pos + 4].copy_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    pos += 4;
    // TTL 60s.
    response[pos..pos + 4].copy_from_slice(&[0x00, 0x00, 0x00, 0x3C]);
    pos += 4;
    // RDLENGTH 4 + the portal address.
    response[pos..pos + 2].copy_from_slice(&[0x00, 0x04]);
    pos += 2;
    response[pos..pos + 4].copy_from_slice(&PORTAL_ADDR.octets());
    pos += 4;

    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_one_a_record_with_the_portal_address() {
        // Minimal query: header + "a." QNAME + QTYPE/QCLASS.
        let query: [u8; 19] = [
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, b'a',
            0x00, 0x00, 0x01, 0x00, 0x01,
        ];
        let mut response = [0u8; 64];
        let len = build_redirect_response(&query, &mut response).unwrap();
        assert_eq!(len, query.len() + 16);
        // Transaction id preserved, response + authoritative bits set.
        assert_eq!(&response[..2], &query[..2]);
        assert_eq!(response[2], 0x84);
        assert_eq!(&response[6..8], &[0x00, 0x01]);
        // The answer ends with the portal address.
        assert_eq!(&response[len - 4..len], &PORTAL_ADDR.octets());
    }

    #[test]
    fn runt_queries_are_ignored() {
        let mut response = [0u8; 64];
        assert!(build_redirect_response(&[0u8; 5], &mut response).is_none());
    }
}
