use embassy_net::{
    udp::{self, UdpSocket},
    Ipv4Address, Stack,
};
use embassy_time::{Duration, Instant, Timer};
use esp_println::println;

use super::super::config::{
    MODE_GATE_POLL_MS, PORTAL_ADDR, PORTAL_DHCP_POOL_SIZE, PORTAL_DHCP_POOL_START, PORTAL_NETMASK,
};
use super::super::health::snapshot;
use super::super::indicators;
use super::super::types::{BlinkPattern, OperatingMode};

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_FRAME_MAX: usize = 768;
// Short leases keep portal clients refreshing while the user fills the form.
const DHCP_LEASE_SECONDS: u32 = 60;
const MAX_LEASES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LeaseRequestKind {
    Discover,
    Request,
    Release,
    Other(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LeaseRequest {
    pub(crate) kind: LeaseRequestKind,
    pub(crate) transaction_id: u32,
    pub(crate) flags: u16,
    pub(crate) client_mac: [u8; 6],
    pub(crate) requested_ip: Option<Ipv4Address>,
    pub(crate) server_id: Option<Ipv4Address>,
}

struct Lease {
    mac: [u8; 6],
    ip: Ipv4Address,
    expires_at: Instant,
}

/// Minimal lease responder for the portal network. Without it, clients join
/// the access point but never get an address, and the captive form is
/// unreachable.
#[embassy_executor::task]
pub(crate) async fn dhcp_lease_task(stack: Stack<'static>) {
    let mut rx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; DHCP_FRAME_MAX];
    let mut tx_meta = [udp::PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; DHCP_FRAME_MAX];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if socket.bind(DHCP_SERVER_PORT).is_err() {
        println!("portal: dhcp responder bind failed, restarting");
        indicators::try_blink(BlinkPattern::ServiceFault);
        Timer::after(Duration::from_secs(2)).await;
        super::super::restart();
    }

    let broadcast = {
        let octets = PORTAL_ADDR.octets();
        Ipv4Address::new(octets[0], octets[1], octets[2], 255)
    };

    let mut leases: heapless::Vec<Lease, MAX_LEASES> = heapless::Vec::new();
    let mut frame = [0u8; DHCP_FRAME_MAX];
    let mut response = [0u8; DHCP_FRAME_MAX];

    loop {
        if !matches!(
            snapshot::current_mode(),
            OperatingMode::ConfigurationPortal
        ) {
            leases.clear();
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }

        let Ok((len, _remote)) = socket.recv_from(&mut frame).await else {
            continue;
        };
        let Some(request) = parse_lease_request(&frame[..len]) else {
            continue;
        };

        // Requests addressed at some other server on the segment are not ours.
        if matches!(request.kind, LeaseRequestKind::Request)
            && request.server_id.is_some()
            && request.server_id != Some(PORTAL_ADDR)
        {
            continue;
        }

        let offer_ip = match request.kind {
            LeaseRequestKind::Discover | LeaseRequestKind::Request => ensure_lease(
                &mut leases,
                request.client_mac,
                request.requested_ip,
            )
            .unwrap_or(PORTAL_DHCP_POOL_START),
            LeaseRequestKind::Release => {
                leases.retain(|lease| lease.mac != request.client_mac);
                continue;
            }
            LeaseRequestKind::Other(_) => continue,
        };

        let Some(response_len) = build_lease_reply(&request, offer_ip, &mut response) else {
            continue;
        };

        if let Err(err) = socket
            .send_to(&response[..response_len], (broadcast, DHCP_CLIENT_PORT))
            .await
        {
            println!("portal: dhcp send err={:?}", err);
        } else {
            println!("portal: dhcp leased {} to client", offer_ip);
        }
    }
}

pub(crate) fn parse_lease_request(frame: &[u8]) -> Option<LeaseRequest> {
    if frame.len() < 240 {
        return None;
    }
    // BOOTREQUEST over Ethernet with 6-byte MACs only.
    if frame[0] != 1 || frame[1] != 1 || frame[2] != 6 {
        return None;
    }
    if frame[236..240] != DHCP_MAGIC_COOKIE {
        return None;
    }

    let transaction_id = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let flags = u16::from_be_bytes([frame[10], frame[11]]);
    let mut client_mac = [0u8; 6];
    client_mac.copy_from_slice(&frame[28..34]);

    let mut kind = None;
    let mut requested_ip = None;
    let mut server_id = None;
    let mut idx = 240;
    while idx < frame.len() {
        let option = frame[idx];
        idx += 1;
        match option {
            0 => continue,
            255 => break,
            _ => {
                let len = *frame.get(idx)? as usize;
                idx += 1;
                let data = frame.get(idx..idx + len)?;
                match option {
                    50 if len == 4 => {
                        requested_ip = Some(Ipv4Address::new(data[0], data[1], data[2], data[3]));
                    }
                    53 if len == 1 => {
                        kind = Some(match data[0] {
                            1 => LeaseRequestKind::Discover,
                            3 => LeaseRequestKind::Request,
                            7 => LeaseRequestKind::Release,
                            other => LeaseRequestKind::Other(other),
                        });
                    }
                    54 if len == 4 => {
                        server_id = Some(Ipv4Address::new(data[0], data[1], data[2], data[3]));
                    }
                    _ => {}
                }
                idx += len;
            }
        }
    }

    Some(LeaseRequest {
        kind: kind?,
        transaction_id,
        flags,
        client_mac,
        requested_ip,
        server_id,
    })
}

pub(crate) fn build_lease_reply(
    request: &LeaseRequest,
    offered_ip: Ipv4Address,
    scratch: &mut [u8],
) -> Option<usize> {
    if scratch.len() < 300 {
        return None;
    }

    scratch.fill(0);
    scratch[0] = 2; // BOOTREPLY
    scratch[1] = 1;
    scratch[2] = 6;
    scratch[4..8].copy_from_slice(&request.transaction_id.to_be_bytes());
    scratch[10..12].copy_from_slice(&request.flags.to_be_bytes());
    scratch[16..20].copy_from_slice(&offered_ip.octets());
    scratch[20..24].copy_from_slice(&PORTAL_ADDR.octets());
    scratch[28..34].copy_from_slice(&request.client_mac);
    scratch[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

    let message_type = match request.kind {
        LeaseRequestKind::Discover => 2, // Offer
        LeaseRequestKind::Request => 5,  // Ack
        _ => return None,
    };

    let mut idx = 240;
    idx += append_option(&mut scratch[idx..], 53, &[message_type])?;
    idx += append_option(&mut scratch[idx..], 54, &PORTAL_ADDR.octets())?;
    idx += append_option(&mut scratch[idx..], 51, &DHCP_LEASE_SECONDS.to_be_bytes())?;
    idx += append_option(&mut scratch[idx..], 1, &PORTAL_NETMASK.octets())?;
    idx += append_option(&mut scratch[idx..], 3, &PORTAL_ADDR.octets())?;
    // The portal is also the DNS server: that is the whole captive trick.
    idx += append_option(&mut scratch[idx..], 6, &PORTAL_ADDR.octets())?;
    scratch[idx] = 255;
    idx += 1;

    Some(idx)
}

fn append_option(dest: &mut [u8], code: u8, payload: &[u8]) -> Option<usize> {
    let needed = payload.len().saturating_add(2);
    if dest.len() < needed {
        return None;
    }
    dest[0] = code;
    dest[1] = payload.len() as u8;
    dest[2..2 + payload.len()].copy_from_slice(payload);
    Some(needed)
}

fn ip_in_pool(ip: Ipv4Address) -> bool {
    let start = u32::from_be_bytes(PORTAL_DHCP_POOL_START.octets());
    let end = start + PORTAL_DHCP_POOL_SIZE as u32 - 1;
    let value = u32::from_be_bytes(ip.octets());
    value >= start && value <= end
}

fn ensure_lease(
    leases: &mut heapless::Vec<Lease, MAX_LEASES>,
    mac: [u8; 6],
    requested: Option<Ipv4Address>,
) -> Option<Ipv4Address> {
    let now = Instant::now();
    leases.retain(|lease| lease.expires_at > now);

    let expiry = now + Duration::from_secs(DHCP_LEASE_SECONDS as u64);
    let desired = requested.filter(|ip| ip_in_pool(*ip)).filter(|ip| {
        leases
            .iter()
            .all(|lease| lease.mac == mac || lease.ip != *ip)
    });

    if let Some(existing) = leases.iter_mut().find(|lease| lease.mac == mac) {
        if let Some(ip) = desired {
            existing.ip = ip;
        }
        existing.expires_at = expiry;
        return Some(existing.ip);
    }

    let ip = desired.or_else(|| {
        let base = u32::from_be_bytes(PORTAL_DHCP_POOL_START.octets());
        (0..PORTAL_DHCP_POOL_SIZE).find_map(|offset| {
            let octets = (base + offset as u32).to_be_bytes();
            let candidate = Ipv4Address::new(octets[0], octets[1], octets[2], octets[3]);
            leases
                .iter()
                .all(|lease| lease.ip != candidate)
                .then_some(candidate)
        })
    })?;

    leases
        .push(Lease {
            mac,
            ip,
            expires_at: expiry,
        })
        .ok()?;
    Some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discover_frame() -> [u8; 248] {
        let mut frame = [0u8; 248];
        frame[0] = 1; // BOOTREQUEST
        frame[1] = 1;
        frame[2] = 6;
        frame[4..8].copy_from_slice(&0xAABBCCDDu32.to_be_bytes());
        frame[28..34].copy_from_slice(&[0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
        frame[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
        // Option 53 = Discover, then end.
        frame[240..243].copy_from_slice(&[53, 1, 1]);
        frame[243] = 255;
        frame
    }

    #[test]
    fn discover_parses_with_mac_and_xid() {
        let request = parse_lease_request(&discover_frame()).unwrap();
        assert_eq!(request.kind, LeaseRequestKind::Discover);
        assert_eq!(request.transaction_id, 0xAABBCCDD);
        assert_eq!(request.client_mac, [0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn short_or_cookieless_frames_are_rejected() {
        assert!(parse_lease_request(&[0u8; 100]).is_none());
        let mut frame = discover_frame();
        frame[236] = 0;
        assert!(parse_lease_request(&frame).is_none());
    }

    #[test]
    fn reply_is_a_bootreply_offer_pointing_at_the_portal() {
        let request = parse_lease_request(&discover_frame()).unwrap();
        let mut scratch = [0u8; 400];
        let len = build_lease_reply(&request, PORTAL_DHCP_POOL_START, &mut scratch).unwrap();
        assert!(len >= 240);
        assert_eq!(scratch[0], 2);
        assert_eq!(&scratch[4..8], &0xAABBCCDDu32.to_be_bytes());
        assert_eq!(&scratch[16..20], &PORTAL_DHCP_POOL_START.octets());
        assert_eq!(&scratch[20..24], &PORTAL_ADDR.octets());
        // Offer, not ack, for a discover.
        assert_eq!(&scratch[240..243], &[53, 1, 2]);
    }

    #[test]
    fn pool_membership_is_bounded() {
        assert!(ip_in_pool(PORTAL_DHCP_POOL_START));
        assert!(!ip_in_pool(PORTAL_ADDR));
        let base = u32::from_be_bytes(PORTAL_DHCP_POOL_START.octets());
        let past_end = (base + PORTAL_DHCP_POOL_SIZE as u32).to_be_bytes();
        assert!(!ip_in_pool(Ipv4Address::new(
            past_end[0],
            past_end[1],
            past_end[2],
            past_end[3]
        )));
    }
}
