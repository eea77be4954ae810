use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embedded_storage::{ReadStorage, Storage};
use esp_println::println;
use esp_storage::FlashStorage;

use super::config::{
    API_URL_MAX, NETWORK_NAME_MAX, NETWORK_SECRET_MAX, SETTINGS_NAME_OFFSET, SETTINGS_REGION_LEN,
    SETTINGS_SECRET_OFFSET, SETTINGS_URL_OFFSET,
};
use super::types::DeviceConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StoreError {
    WriteFailed,
}

/// Settings live in the last flash sector, three fixed-offset slots padded
/// with NUL. An erased sector reads back as all 0xFF, which decodes as three
/// empty fields.
pub(crate) struct SettingsStore<'d> {
    flash: FlashStorage<'d>,
    offset: u32,
}

impl<'d> SettingsStore<'d> {
    pub(crate) fn new(flash_peripheral: esp_hal::peripherals::FLASH<'d>) -> Self {
        let flash = FlashStorage::new(flash_peripheral).multicore_auto_park();
        let capacity = flash.capacity() as u32;
        let offset = capacity.saturating_sub(FlashStorage::SECTOR_SIZE);
        Self { flash, offset }
    }

    /// Never fails: unreadable storage yields an all-empty config.
    pub(crate) fn load(&mut self) -> DeviceConfig {
        let mut region = [0xFFu8; SETTINGS_REGION_LEN];
        if self.flash.read(self.offset, &mut region).is_err() {
            println!("store: settings sector unreadable, using empty config");
            return DeviceConfig::empty();
        }
        decode_region(&region)
    }

    pub(crate) fn save(&mut self, config: &DeviceConfig) -> Result<(), StoreError> {
        let region = encode_region(config);
        self.flash
            .write(self.offset, &region)
            .map_err(|_| StoreError::WriteFailed)
    }

    pub(crate) fn reset_to_defaults(&mut self) -> Result<(), StoreError> {
        self.save(&DeviceConfig::factory_defaults())
    }
}

static SETTINGS: Mutex<CriticalSectionRawMutex, RefCell<Option<SettingsStore<'static>>>> =
    Mutex::new(RefCell::new(None));

/// Hands the single store instance to the HTTP handlers. Called once at boot.
pub(crate) fn install(store: SettingsStore<'static>) {
    SETTINGS.lock(|cell| {
        *cell.borrow_mut() = Some(store);
    });
}

pub(crate) fn with_store<R>(f: impl FnOnce(&mut SettingsStore<'static>) -> R) -> Option<R> {
    SETTINGS.lock(|cell| cell.borrow_mut().as_mut().map(f))
}

pub(crate) fn encode_region(config: &DeviceConfig) -> [u8; SETTINGS_REGION_LEN] {
    let mut region = [0u8; SETTINGS_REGION_LEN];
    encode_field(
        &mut region[SETTINGS_NAME_OFFSET..SETTINGS_NAME_OFFSET + NETWORK_NAME_MAX],
        &config.network_name,
        config.network_name_len,
    );
    encode_field(
        &mut region[SETTINGS_SECRET_OFFSET..SETTINGS_SECRET_OFFSET + NETWORK_SECRET_MAX],
        &config.network_secret,
        config.network_secret_len,
    );
    encode_field(
        &mut region[SETTINGS_URL_OFFSET..SETTINGS_URL_OFFSET + API_URL_MAX],
        &config.api_url,
        config.api_url_len,
    );
    region
}

pub(crate) fn decode_region(region: &[u8; SETTINGS_REGION_LEN]) -> DeviceConfig {
    let name = decode_field(&region[SETTINGS_NAME_OFFSET..SETTINGS_NAME_OFFSET + NETWORK_NAME_MAX]);
    let secret =
        decode_field(&region[SETTINGS_SECRET_OFFSET..SETTINGS_SECRET_OFFSET + NETWORK_SECRET_MAX]);
    let url = decode_field(&region[SETTINGS_URL_OFFSET..SETTINGS_URL_OFFSET + API_URL_MAX]);
    DeviceConfig::from_parts(name, secret, url)
}

fn encode_field(slot: &mut [u8], bytes: &[u8], len: u8) {
    let len = (len as usize).min(slot.len()).min(bytes.len());
    slot[..len].copy_from_slice(&bytes[..len]);
}

/// A field ends at the first NUL or erased byte, whichever comes first.
fn decode_field(slot: &[u8]) -> &[u8] {
    let end = slot
        .iter()
        .position(|&byte| byte == 0x00 || byte == 0xFF)
        .unwrap_or(slot.len());
    &slot[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let config = DeviceConfig::from_parts(b"HomeNet", b"hunter22", b"http://api.local/ping");
        let region = encode_region(&config);
        let loaded = decode_region(&region);
        assert_eq!(loaded, config);
        assert_eq!(loaded.network_name(), "HomeNet");
        assert_eq!(loaded.network_secret(), "hunter22");
        assert_eq!(loaded.api_url(), "http://api.local/ping");
    }

    #[test]
    fn oversized_fields_truncate_to_capacity() {
        let long_name = [b'a'; NETWORK_NAME_MAX + 10];
        let config = DeviceConfig::from_parts(&long_name, b"s", b"u");
        assert_eq!(config.network_name_len as usize, NETWORK_NAME_MAX);
        let loaded = decode_region(&encode_region(&config));
        assert_eq!(loaded.network_name_len as usize, NETWORK_NAME_MAX);
    }

    #[test]
    fn erased_region_decodes_as_empty_fields() {
        let region = [0xFFu8; SETTINGS_REGION_LEN];
        let loaded = decode_region(&region);
        assert!(loaded.network_name_is_empty());
        assert_eq!(loaded.network_secret_len, 0);
        assert_eq!(loaded.api_url_len, 0);
    }

    #[test]
    fn field_stops_at_first_nul_or_erased_byte() {
        let mut region = [0u8; SETTINGS_REGION_LEN];
        region[SETTINGS_NAME_OFFSET..SETTINGS_NAME_OFFSET + 4].copy_from_slice(b"abcd");
        region[SETTINGS_NAME_OFFSET + 2] = 0xFF;
        let loaded = decode_region(&region);
        assert_eq!(loaded.network_name(), "ab");
    }

    #[test]
    fn factory_defaults_are_the_specific_triple_not_blanks() {
        let loaded = decode_region(&encode_region(&DeviceConfig::factory_defaults()));
        assert_eq!(loaded.network_name(), super::super::config::DEFAULT_NETWORK_NAME);
        assert_eq!(
            loaded.network_secret(),
            super::super::config::DEFAULT_NETWORK_SECRET
        );
        assert_eq!(loaded.api_url(), super::super::config::DEFAULT_API_URL);
        assert!(!loaded.network_name_is_empty());
    }
}
