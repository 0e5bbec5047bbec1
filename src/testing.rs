//! In-memory stand-ins for the three platform seams, shared by the unit tests.

use tinyvec::ArrayVec;

use crate::device::DEVICE_NAME_LEN;
use crate::distributor::{DISTRIBUTOR_SERIAL_LEN, NUM_INSTRUMENT_SLOTS};
use crate::instrument::InstrumentController;
use crate::message::WireMessage;
use crate::pool::MAX_DISTRIBUTORS;
use crate::storage::ConfigStorage;
use crate::transport::Transport;

/// An [`InstrumentController`] that keeps real per-slot note bookkeeping and records every call,
/// so tests can assert on routing decisions.
#[derive(Debug, Default)]
pub struct RecordingController {
    active: [ArrayVec<[u8; 8]>; NUM_INSTRUMENT_SLOTS],
    pub plays: ArrayVec<[(u8, u8, u8, u8); 32]>,
    pub stops: ArrayVec<[(u8, u8); 32]>,
    pub pitch_bends: ArrayVec<[(u8, u16); 8]>,
    pub key_pressures: ArrayVec<[(u8, u8, u8); 8]>,
    pub stop_all_count: u8,
    pub reset_all_count: u8,
    pub timeout_sweeps: u8,
    pub modulation: Option<u8>,
    pub foot_pedal: Option<u8>,
    pub volume: Option<u8>,
    pub expression: Option<u8>,
    pub effect_1: Option<u8>,
    pub effect_2: Option<u8>,
    pub program: Option<u8>,
    pub channel_pressure: Option<u8>,
}

impl InstrumentController for RecordingController {
    fn reset_all(&mut self) {
        self.reset_all_count += 1;
        for slot in self.active.iter_mut() {
            slot.clear();
        }
    }

    fn stop_all(&mut self) {
        self.stop_all_count += 1;
        for slot in self.active.iter_mut() {
            slot.clear();
        }
    }

    fn play_note(&mut self, instrument: u8, note: u8, velocity: u8, channel: u8) {
        let sounding = &mut self.active[instrument as usize];
        if sounding.len() != sounding.capacity() {
            sounding.push(note);
        }
        self.plays.push((instrument, note, velocity, channel));
    }

    fn stop_note(&mut self, instrument: u8, note: u8, _velocity: u8) {
        let sounding = &mut self.active[instrument as usize];
        if let Some(position) = sounding.iter().position(|&n| n == note) {
            sounding.remove(position);
        }
        self.stops.push((instrument, note));
    }

    fn num_active_notes(&self, instrument: u8) -> u8 {
        self.active[instrument as usize].len() as u8
    }

    fn is_note_active(&self, instrument: u8, note: u8) -> bool {
        self.active[instrument as usize].contains(&note)
    }

    fn set_key_pressure(&mut self, instrument: u8, note: u8, pressure: u8) {
        self.key_pressures.push((instrument, note, pressure));
    }

    fn set_pitch_bend(&mut self, instrument: u8, bend: u16, _channel: u8) {
        self.pitch_bends.push((instrument, bend));
    }

    fn set_program_change(&mut self, program: u8) {
        self.program = Some(program);
    }

    fn set_channel_pressure(&mut self, pressure: u8) {
        self.channel_pressure = Some(pressure);
    }

    fn set_modulation_wheel(&mut self, value: u8) {
        self.modulation = Some(value);
    }

    fn set_foot_pedal(&mut self, value: u8) {
        self.foot_pedal = Some(value);
    }

    fn set_volume(&mut self, value: u8) {
        self.volume = Some(value);
    }

    fn set_expression(&mut self, value: u8) {
        self.expression = Some(value);
    }

    fn set_effect_ctrl_1(&mut self, value: u8) {
        self.effect_1 = Some(value);
    }

    fn set_effect_ctrl_2(&mut self, value: u8) {
        self.effect_2 = Some(value);
    }

    fn check_instrument_timeouts(&mut self) {
        self.timeout_sweeps += 1;
    }
}

/// A [`ConfigStorage`] over plain arrays.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pub count: u8,
    pub constructs: [Option<[u8; DISTRIBUTOR_SERIAL_LEN]>; MAX_DISTRIBUTORS],
    pub name: Option<[u8; DEVICE_NAME_LEN]>,
    pub id: Option<u16>,
    pub flags: Option<u8>,
    pub resets: u8,
}

impl ConfigStorage for MemoryStorage {
    fn num_distributors(&self) -> u8 {
        self.count
    }

    fn set_num_distributors(&mut self, count: u8) {
        self.count = count;
    }

    fn distributor_construct(&self, id: u8) -> Option<[u8; DISTRIBUTOR_SERIAL_LEN]> {
        self.constructs.get(id as usize).copied().flatten()
    }

    fn set_distributor_construct(&mut self, id: u8, construct: &[u8; DISTRIBUTOR_SERIAL_LEN]) {
        if let Some(slot) = self.constructs.get_mut(id as usize) {
            *slot = Some(*construct);
        }
    }

    fn device_name(&self) -> Option<[u8; DEVICE_NAME_LEN]> {
        self.name
    }

    fn set_device_name(&mut self, name: &[u8; DEVICE_NAME_LEN]) {
        self.name = Some(*name);
    }

    fn device_id(&self) -> Option<u16> {
        self.id
    }

    fn set_device_id(&mut self, id: u16) {
        self.id = Some(id);
    }

    fn device_flags(&self) -> Option<u8> {
        self.flags
    }

    fn set_device_flags(&mut self, flags: u8) {
        self.flags = Some(flags);
    }

    fn reset_device_config(&mut self) {
        *self = Self { resets: self.resets + 1, ..Self::default() };
    }
}

/// A [`Transport`] backed by two queues: tests preload `inbound` and inspect `sent`.
#[derive(Debug, Default)]
pub struct QueueTransport {
    pub inbound: ArrayVec<[WireMessage; 4]>,
    pub sent: ArrayVec<[WireMessage; 8]>,
    pub begun: bool,
}

impl Transport for QueueTransport {
    fn begin(&mut self) {
        self.begun = true;
    }

    fn send_message(&mut self, message: &WireMessage) {
        if self.sent.len() != self.sent.capacity() {
            self.sent.push(message.clone());
        }
    }

    fn read_message(&mut self) -> Option<WireMessage> {
        if self.inbound.is_empty() {
            None
        } else {
            Some(self.inbound.remove(0))
        }
    }
}
