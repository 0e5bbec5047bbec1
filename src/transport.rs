//! The seam between the routing core and the platform's message transports.

use crate::message::WireMessage;

/// One attached transport — a serial port, USB-MIDI endpoint, UDP socket, BLE characteristic.
///
/// Adapters frame bytes into complete MIDI messages; the core never sees partial frames. Reads
/// are non-blocking: the router polls each transport once per cycle and moves on.
pub trait Transport {
    /// Brings the transport up. Called once before the first poll.
    fn begin(&mut self) {}

    /// Queues one message for transmission.
    fn send_message(&mut self, message: &WireMessage);

    /// Returns the next complete received message, or `None` when nothing is pending.
    fn read_message(&mut self) -> Option<WireMessage>;
}
