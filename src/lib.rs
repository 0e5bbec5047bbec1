//! This crate contains the architecture-agnostic core of an orchestrion-style firmware: it lets a
//! microcontroller drive an array of mechanical or electronic instruments from [MIDI](https://midi.org/midi-1-0)
//! input. Incoming notes are routed across a pool of instrument slots by configurable
//! [`Distributor`](distributor::Distributor)s, and a SysEx-based command protocol lets a host
//! application create, edit, and persist that routing configuration at runtime.
//!
//! Everything hardware-specific lives behind three seams, implemented per target platform:
//! [`InstrumentController`](instrument::InstrumentController) (the drivers that actually sound
//! notes), [`Transport`](transport::Transport) (serial/USB/UDP/BLE message framing), and
//! [`ConfigStorage`](storage::ConfigStorage) (flash or EEPROM persistence). The
//! [`MessageRouter`](router::MessageRouter) ties them together in a cooperative, run-to-completion
//! poll loop.

#![deny(missing_docs)]
#![no_std]

pub mod device;
pub mod distributor;
pub mod handler;
pub mod instrument;
pub mod message;
pub mod pool;
pub mod router;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testing;
