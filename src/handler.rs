//! Classifies incoming messages and executes them against device state: channel voice messages
//! go to the distributor pool, control changes get the pool's first-match treatment, and SysEx
//! frames run the configuration command table (implemented in [`sysex`](self)).

mod sysex;

use crate::device::DeviceIdentity;
use crate::instrument::InstrumentController;
use crate::message::{WireMessage, status};
use crate::pool::DistributorPool;
use crate::storage::ConfigStorage;

/// What a processed message produced: at most one direct response for the originating transport,
/// and a flag raised by any configuration mutation so the router can notify the other transports.
#[derive(Clone, Debug, Default)]
pub struct Dispatch {
    /// Reply for the transport the message arrived on.
    pub response: Option<WireMessage>,
    /// Whether device or distributor configuration changed.
    pub changed: bool,
}

impl Dispatch {
    fn nothing() -> Self {
        Self::default()
    }

    fn reply(response: WireMessage) -> Self {
        Self { response: Some(response), changed: false }
    }

    fn changed() -> Self {
        Self { response: None, changed: true }
    }

    fn changed_if(changed: bool) -> Self {
        Self { response: None, changed }
    }
}

/// Owns the device identity, the distributor pool, and the two platform seams, and runs every
/// message to completion against them.
pub struct ProtocolDispatcher<C: InstrumentController, S: ConfigStorage> {
    device: DeviceIdentity,
    pool: DistributorPool,
    controller: C,
    storage: S,
}

impl<C: InstrumentController, S: ConfigStorage> ProtocolDispatcher<C, S> {
    /// Builds a dispatcher from compiled-in identity defaults and the platform seams.
    pub fn new(device: DeviceIdentity, controller: C, storage: S) -> Self {
        Self { device, pool: DistributorPool::new(), controller, storage }
    }

    /// Overwrites identity and pool from persistence, where anything is persisted. Called once
    /// at boot, before the first poll.
    pub fn restore(&mut self) {
        if let Some(id) = self.storage.device_id() {
            self.device.set_id(id);
        }
        if let Some(name) = self.storage.device_name() {
            self.device.set_name(&name);
        }
        if let Some(flags) = self.storage.device_flags() {
            self.device.set_flags(flags.into());
        }
        self.pool.restore_from(&self.storage);
    }

    /// The device identity.
    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    /// The distributor pool.
    pub fn pool(&self) -> &DistributorPool {
        &self.pool
    }

    /// The instrument controller seam.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Mutable access to the instrument controller seam, for platform glue that owns the
    /// dispatcher.
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Executes one received message. Malformed or foreign traffic falls through with no
    /// response and no change flag — nothing in this path is an error worth surfacing.
    pub fn process(&mut self, message: &WireMessage) -> Dispatch {
        match message.message_type() {
            status::CONTROL_CHANGE => {
                self.pool.dispatch_control_change(message, &mut self.controller);
                Dispatch::nothing()
            }
            status::SYS_COMMON => match message.status() & 0x0F {
                status::SYS_EX => self.process_sysex(message),
                status::SYS_STOP => {
                    self.controller.stop_all();
                    Dispatch::nothing()
                }
                status::SYS_RESET => {
                    self.controller.reset_all();
                    Dispatch::nothing()
                }
                _ => Dispatch::nothing(),
            },
            _ => {
                self.pool.distribute(message, &mut self.controller);
                Dispatch::nothing()
            }
        }
    }

    /// Lets the controller expire stuck notes; the router calls this once per poll cycle.
    pub fn sweep_timeouts(&mut self) {
        self.controller.check_instrument_timeouts();
    }
}
