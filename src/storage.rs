//! The seam between the routing core and the platform's persistence backend (flash, EEPROM,
//! NVS — whatever the board offers).
//!
//! Persistence is best-effort by design: a failed or absent write never blocks the in-memory
//! mutation or the change broadcast, so the trait has no error channel. Getters return `None`
//! when nothing has been stored yet and the compiled-in defaults should stand.

use crate::device::DEVICE_NAME_LEN;
use crate::distributor::DISTRIBUTOR_SERIAL_LEN;

/// Key-value persistence for the device identity and the distributor pool.
pub trait ConfigStorage {
    /// Number of persisted distributor constructs.
    fn num_distributors(&self) -> u8;

    /// Records the number of persisted distributor constructs.
    fn set_num_distributors(&mut self, count: u8);

    /// Reads one persisted distributor construct.
    fn distributor_construct(&self, id: u8) -> Option<[u8; DISTRIBUTOR_SERIAL_LEN]>;

    /// Writes one distributor construct.
    fn set_distributor_construct(&mut self, id: u8, construct: &[u8; DISTRIBUTOR_SERIAL_LEN]);

    /// Reads the persisted device name.
    fn device_name(&self) -> Option<[u8; DEVICE_NAME_LEN]>;

    /// Writes the device name.
    fn set_device_name(&mut self, name: &[u8; DEVICE_NAME_LEN]);

    /// Reads the persisted 14-bit device id.
    fn device_id(&self) -> Option<u16>;

    /// Writes the 14-bit device id.
    fn set_device_id(&mut self, id: u16);

    /// Reads the persisted device boolean flags.
    fn device_flags(&self) -> Option<u8>;

    /// Writes the device boolean flags.
    fn set_device_flags(&mut self, flags: u8);

    /// Erases everything this trait persists.
    fn reset_device_config(&mut self);
}

/// A storage backend that stores nothing, for boards without persistent memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStorage;

impl ConfigStorage for NullStorage {
    fn num_distributors(&self) -> u8 {
        0
    }

    fn set_num_distributors(&mut self, _count: u8) {}

    fn distributor_construct(&self, _id: u8) -> Option<[u8; DISTRIBUTOR_SERIAL_LEN]> {
        None
    }

    fn set_distributor_construct(&mut self, _id: u8, _construct: &[u8; DISTRIBUTOR_SERIAL_LEN]) {}

    fn device_name(&self) -> Option<[u8; DEVICE_NAME_LEN]> {
        None
    }

    fn set_device_name(&mut self, _name: &[u8; DEVICE_NAME_LEN]) {}

    fn device_id(&self) -> Option<u16> {
        None
    }

    fn set_device_id(&mut self, _id: u16) {}

    fn device_flags(&self) -> Option<u8> {
        None
    }

    fn set_device_flags(&mut self, _flags: u8) {}

    fn reset_device_config(&mut self) {}
}
