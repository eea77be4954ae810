/// Boot and probe counters in RTC fast memory: they survive software resets
/// (the link supervisor restarts the device on purpose) but not power loss.
/// The record carries magic, version, and a checksum; anything that fails
/// validation is treated as uninitialized, never as an error.
pub(crate) const COUNTERS_MAGIC: u32 = 0x4E53_4E54; // "NSNT"
pub(crate) const COUNTERS_VERSION: u8 = 1;
pub(crate) const COUNTERS_RECORD_LEN: usize = 18;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HealthCounters {
    pub(crate) boot_count: u32,
    pub(crate) internet_up_count: u32,
    pub(crate) api_success_count: u32,
}

impl HealthCounters {
    pub(crate) const fn zeroed() -> Self {
        Self {
            boot_count: 0,
            internet_up_count: 0,
            api_success_count: 0,
        }
    }

    pub(crate) fn encode(&self) -> [u8; COUNTERS_RECORD_LEN] {
        let mut record = [0u8; COUNTERS_RECORD_LEN];
        record[0..4].copy_from_slice(&COUNTERS_MAGIC.to_le_bytes());
        record[4] = COUNTERS_VERSION;
        record[5..9].copy_from_slice(&self.boot_count.to_le_bytes());
        record[9..13].copy_from_slice(&self.internet_up_count.to_le_bytes());
        record[13..17].copy_from_slice(&self.api_success_count.to_le_bytes());
        record[COUNTERS_RECORD_LEN - 1] = checksum8(&record[..COUNTERS_RECORD_LEN - 1]);
        record
    }

    pub(crate) fn decode(record: &[u8; COUNTERS_RECORD_LEN]) -> Option<Self> {
        if u32::from_le_bytes([record[0], record[1], record[2], record[3]]) != COUNTERS_MAGIC {
            return None;
        }
        if record[4] != COUNTERS_VERSION {
            return None;
        }
        if record[COUNTERS_RECORD_LEN - 1] != checksum8(&record[..COUNTERS_RECORD_LEN - 1]) {
            return None;
        }
        Some(Self {
            boot_count: u32::from_le_bytes([record[5], record[6], record[7], record[8]]),
            internet_up_count: u32::from_le_bytes([record[9], record[10], record[11], record[12]]),
            api_success_count: u32::from_le_bytes([record[13], record[14], record[15], record[16]]),
        })
    }
}

fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}

#[esp_hal::ram(rtc_fast, persistent)]
static mut COUNTERS_BLOCK: [u8; COUNTERS_RECORD_LEN] = [0; COUNTERS_RECORD_LEN];

pub(crate) fn load() -> HealthCounters {
    let mut record = [0u8; COUNTERS_RECORD_LEN];
    // Safety: single writer (the control plane); readers copy the whole block.
    unsafe {
        let src = core::ptr::addr_of!(COUNTERS_BLOCK) as *const u8;
        core::ptr::copy_nonoverlapping(src, record.as_mut_ptr(), COUNTERS_RECORD_LEN);
    }
    HealthCounters::decode(&record).unwrap_or(HealthCounters::zeroed())
}

pub(crate) fn store(counters: &HealthCounters) {
    let record = counters.encode();
    // Safety: single writer (the control plane).
    unsafe {
        let dst = core::ptr::addr_of_mut!(COUNTERS_BLOCK) as *mut u8;
        core::ptr::copy_nonoverlapping(record.as_ptr(), dst, COUNTERS_RECORD_LEN);
    }
}
