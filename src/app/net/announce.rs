use embassy_net::{
    udp::{self, UdpSocket},
    Ipv4Address, Stack,
};
use embassy_time::{Duration, Timer};
use esp_println::println;

use super::super::config::{HOSTNAME, HTTP_PORT, MODE_GATE_POLL_MS, UPDATE_PORT};
use super::super::health::snapshot;
use super::super::types::OperatingMode;

const MDNS_PORT: u16 = 5353;
const MDNS_GROUP: Ipv4Address = Ipv4Address::new(224, 0, 0, 251);
const MDNS_FRAME_MAX: usize = 512;
const MDNS_TTL_SECS: u32 = 120;

/// Answers mDNS A queries for `netsentry.local` while in Station mode, so
/// the dashboard and updater are reachable by name. Failure here is a
/// degradation, never fatal: the device keeps its numeric address.
#[embassy_executor::task]
pub(crate) async fn mdns_responder_task(stack: Stack<'static>) {
    let mut rx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; MDNS_FRAME_MAX];
    let mut tx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; MDNS_FRAME_MAX];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if socket.bind(MDNS_PORT).is_err() {
        println!("net: mdns bind failed, hostname access unavailable");
        return;
    }

    let mut registered = false;
    let mut frame = [0u8; MDNS_FRAME_MAX];
    let mut response = [0u8; MDNS_FRAME_MAX];

    loop {
        if !matches!(snapshot::current_mode(), OperatingMode::Station) {
            registered = false;
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }
        let Some(config) = stack.config_v4() else {
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        };
        let address = config.address.address();

        if !registered {
            registered = match stack.join_multicast_group(MDNS_GROUP) {
                Ok(()) => {
                    println!(
                        "net: mdns registered {}.local -> {} (http:{} update:{})",
                        HOSTNAME, address, HTTP_PORT, UPDATE_PORT
                    );
                    // Unsolicited announcement so caches warm up immediately.
                    if let Some(len) = build_host_answer(address, 0, &mut response) {
                        let _ = socket
                            .send_to(&response[..len], (MDNS_GROUP, MDNS_PORT))
                            .await;
                    }
                    true
                }
                Err(_) => {
                    println!("net: mdns group join failed, hostname access unavailable");
                    Timer::after(Duration::from_secs(30)).await;
                    false
                }
            };
            continue;
        }

        let Ok((len, remote)) = socket.recv_from(&mut frame).await else {
            continue;
        };
        if !query_asks_for_host(&frame[..len]) {
            continue;
        }
        let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
        if let Some(response_len) = build_host_answer(address, transaction_id, &mut response) {
            if let Err(err) = socket.send_to(&response[..response_len], remote).await {
                println!("net: mdns send err={:?}", err);
            }
        }
    }
}

/// True when any question in the frame is an A/ANY query for our hostname.
/// Compressed question names are rare in queries and simply not matched.
pub(crate) fn query_asks_for_host(frame: &[u8]) -> bool {
    if frame.len() < 12 {
        return false;
    }
    // Queries only (QR bit clear).
    if frame[2] & 0x80 != 0 {
        return false;
    }
    let question_count = u16::from_be_bytes([frame[4], frame[5]]);

    let mut pos = 12usize;
    for _ in 0..question_count {
        let start = pos;
        loop {
            let Some(&len) = frame.get(pos) else {
                return false;
            };
            if len == 0 {
                pos += 1;
                break;
            }
            if len & 0xC0 != 0 {
                return false;
            }
            pos += 1 + len as usize;
        }
        let name_matches = name_is_ours(&frame[start..pos]);
        let Some(type_class) = frame.get(pos..pos + 4) else {
            return false;
        };
        let qtype = u16::from_be_bytes([type_class[0], type_class[1]]);
        pos += 4;
        // A or ANY.
        if name_matches && (qtype == 1 || qtype == 255) {
            return true;
        }
    }
    false
}

fn name_is_ours(encoded: &[u8]) -> bool {
    let mut expected = [0u8; 64];
    let Some(expected_len) = encode_host_fqdn(&mut expected) else {
        return false;
    };
    if encoded.len() != expected_len {
        return false;
    }
    encoded.eq_ignore_ascii_case(&expected[..expected_len])
}

/// `netsentry.local` as DNS labels.
pub(crate) fn encode_host_fqdn(dest: &mut [u8]) -> Option<usize> {
    let mut pos = 0usize;
    for label in [HOSTNAME, "local"] {
        let bytes = label.as_bytes();
        if pos + 1 + bytes.len() + 1 > dest.len() || bytes.len() > 63 {
            return None;
        }
        dest[pos] = bytes.len() as u8;
        dest[pos + 1..pos + 1 + bytes.len()].copy_from_slice(bytes);
        pos += 1 + bytes.len();
    }
    dest[pos] = 0;
    Some(pos + 1)
}

/// Authoritative response with one A record for the hostname.
pub(crate) fn build_host_answer(
    address: Ipv4Address,
    transaction_id: u16,
    response: &mut [u8],
) -> Option<usize> {
    if response.len() < 12 + 64 + 14 {
        return None;
    }
    response[..12].fill(0);
    response[0..2].copy_from_slice(&transaction_id.to_be_bytes());
    // QR=1 AA=1.
    response[2] = 0x84;
    // One answer, no questions.
    response[6..8].copy_from_slice(&1u16.to_be_bytes());

    let mut pos = 12usize;
    pos += encode_host_fqdn(&mut response[pos..])?;
    // TYPE A, cache-flush CLASS IN.
    response[pos..pos + 4].copy_from_slice(&[0x00, 0x01, 0x80, 0x01]);
    pos += 4;
    response[pos..pos + 4].copy_from_slice(&MDNS_TTL_SECS.to_be_bytes());
    pos += 4;
    response[pos..pos + 2].copy_from_slice(&[0x00, 0x04]);
    pos += 2;
    response[pos..pos + 4].copy_from_slice(&address.octets());
    pos += 4;
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_query(qtype: u16) -> heapless::Vec<u8, 64> {
        let mut frame: heapless::Vec<u8, 64> = heapless::Vec::new();
        frame.extend_from_slice(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .unwrap();
        let mut name = [0u8; 64];
        let len = encode_host_fqdn(&mut name).unwrap();
        frame.extend_from_slice(&name[..len]).unwrap();
        frame.extend_from_slice(&qtype.to_be_bytes()).unwrap();
        frame.extend_from_slice(&[0x00, 0x01]).unwrap();
        frame
    }

    #[test]
    fn a_query_for_our_name_matches() {
        assert!(query_asks_for_host(&host_query(1)));
        assert!(query_asks_for_host(&host_query(255)));
    }

    #[test]
    fn other_types_and_names_do_not_match() {
        // PTR query for the right name.
        assert!(!query_asks_for_host(&host_query(12)));
        // Right shape, wrong name.
        let mut frame = host_query(1);
        frame[13] = b'x';
        assert!(!query_asks_for_host(&frame));
        // Responses are never answered.
        let mut response_frame = host_query(1);
        response_frame[2] |= 0x80;
        assert!(!query_asks_for_host(&response_frame));
    }

    #[test]
    fn answer_carries_the_station_address() {
        let mut response = [0u8; 128];
        let address = Ipv4Address::new(10, 0, 0, 42);
        let len = build_host_answer(address, 7, &mut response).unwrap();
        assert_eq!(&response[len - 4..len], &address.octets());
        assert_eq!(response[2], 0x84);
        assert_eq!(&response[0..2], &[0x00, 0x07]);
    }
}
