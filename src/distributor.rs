//! Distributors route incoming notes to instrument groups via configurable algorithms.
//!
//! Each distributor owns a set of MIDI channels it listens on, a set of instrument slots it may
//! play, a [`DistributionMethod`] choosing among them, and per-instance playback policy (mute,
//! note range, polyphony flags). A channel message that passes the gates is converted into
//! play/stop calls against the shared [`InstrumentController`].
//!
//! ex. (MIDI ch 2 & 3) -> (instruments 4-8) mapped via RoundRobin.
//! ex. (MIDI ch 1,3,4) -> (instruments 1-4,7,8) mapped via Ascending.

use bitmask_enum::bitmask;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;
use wmidi::MidiMessage;

use crate::instrument::InstrumentController;
use crate::message::{self, WireMessage};

mod selection;
pub use selection::*;

/// Number of MIDI channels a distributor can listen on.
pub const NUM_CHANNELS: usize = 16;

/// Number of addressable instrument slots, bounded by the 32-bit instrument mask.
pub const NUM_INSTRUMENT_SLOTS: usize = 32;

/// Size of a serialized distributor construct.
pub const DISTRIBUTOR_SERIAL_LEN: usize = 24;

/// Per-distributor playback policy switches, bit-packed into byte 11 of the construct.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DistributorFlags {
    /// Drops every message addressed to this distributor.
    Muted,
    /// Damper pedal engaged (sustain).
    DamperPedal,
    /// Allows more than one simultaneous note per instrument.
    Polyphonic,
    /// A new note may displace a sounding one instead of being dropped.
    NoteOverwrite,
}

/// The algorithm a distributor uses to pick the next instrument slot for a note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DistributionMethod {
    /// Channel N plays instrument N, or nothing if slot N is not enabled.
    StraightThrough = 0,
    /// Cycle through the enabled instruments in index order.
    RoundRobin = 1,
    /// Cycle like [`RoundRobin`](Self::RoundRobin), but prefer the least-loaded instrument.
    RoundRobinBalance = 2,
    /// Lowest idle instrument first, least-loaded as fallback.
    Ascending = 3,
    /// Highest idle instrument first, least-loaded as fallback.
    Descending = 4,
    /// Reserved; resolves to "no instrument" until specified.
    Stack = 5,
}

/// Routes channel messages onto instrument slots. See the module docs.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Distributor {
    channels: u16,
    instruments: u32,
    method: DistributionMethod,
    flags: DistributorFlags,
    min_note: u8,
    max_note: u8,
    polyphonic_notes: u8,
    /// Most recently selected slot; `None` until the first selection and after the instrument
    /// mask changes. When `Some`, always an enabled slot.
    cursor: Option<u8>,
}

impl Default for Distributor {
    fn default() -> Self {
        Self {
            channels: 0,
            instruments: 0,
            method: DistributionMethod::RoundRobinBalance,
            flags: DistributorFlags::none(),
            min_note: 0,
            max_note: 127,
            polyphonic_notes: 1,
            cursor: None,
        }
    }
}

impl Distributor {
    /// Builds a distributor from a serialized construct, falling back to defaults for anything
    /// the construct leaves unspecified.
    pub fn from_serial(data: &[u8]) -> Self {
        let mut distributor = Self::default();
        distributor.apply_serial(data);
        distributor
    }

    /// Handles one channel message addressed to this distributor.
    ///
    /// Messages on channels outside the channel mask are ignored, as is everything while muted.
    /// Control changes are handled a level up, across the whole pool.
    pub fn process_message<C: InstrumentController>(
        &mut self,
        message: &WireMessage,
        controller: &mut C,
    ) {
        if !self.channel_enabled(message.channel()) || self.muted() {
            return;
        }
        let Some(view) = message.channel_message() else {
            return;
        };

        match view {
            MidiMessage::NoteOn(_, note, velocity) => {
                let (note, velocity) = (u8::from(note), u8::from(velocity));
                // velocity 0 is the wire's other spelling of note-off
                if velocity == 0 {
                    self.note_off(note, velocity, message.channel(), controller);
                } else {
                    self.note_on(note, velocity, message.channel(), controller);
                }
            }
            MidiMessage::NoteOff(_, note, velocity) => {
                self.note_off(u8::from(note), u8::from(velocity), message.channel(), controller);
            }
            MidiMessage::PolyphonicKeyPressure(_, note, pressure) => {
                self.key_pressure(u8::from(note), u8::from(pressure), message.channel(), controller);
            }
            MidiMessage::PitchBendChange(..) => {
                self.pitch_bend(message.pitch_bend(), message.channel(), controller);
            }
            MidiMessage::ProgramChange(_, program) => {
                controller.set_program_change(u8::from(program));
            }
            MidiMessage::ChannelPressure(_, pressure) => {
                controller.set_channel_pressure(u8::from(pressure));
            }
            _ => {}
        }
    }

    /// Picks the next instrument per the distribution method and starts the note there.
    fn note_on<C: InstrumentController>(&mut self, note: u8, velocity: u8, channel: u8, controller: &mut C) {
        if note < self.min_note || note > self.max_note {
            return;
        }
        let Some(instrument) =
            next_instrument(self.method, self.cursor, self.instruments, channel, controller)
        else {
            return;
        };
        self.cursor = Some(instrument);
        controller.play_note(instrument, note, velocity, channel);
    }

    /// Finds the instrument sounding the note and stops it there.
    fn note_off<C: InstrumentController>(
        &mut self,
        note: u8,
        velocity: u8,
        channel: u8,
        controller: &mut C,
    ) {
        if let Some(instrument) = self.locate_note(note, channel, controller) {
            controller.stop_note(instrument, note, velocity);
        }
    }

    /// Finds the instrument sounding the note and updates its pressure.
    fn key_pressure<C: InstrumentController>(
        &mut self,
        note: u8,
        pressure: u8,
        channel: u8,
        controller: &mut C,
    ) {
        if let Some(instrument) = self.locate_note(note, channel, controller) {
            controller.set_key_pressure(instrument, note, pressure);
        }
    }

    /// Applies a pitch-bend value to every enabled instrument, regardless of which distributor
    /// attributed notes to it.
    fn pitch_bend<C: InstrumentController>(&mut self, bend: u16, channel: u8, controller: &mut C) {
        for slot in 0..NUM_INSTRUMENT_SLOTS as u8 {
            if self.instrument_enabled(slot) {
                controller.set_pitch_bend(slot, bend, channel);
            }
        }
    }

    /// Reverse lookup for note-off and key-pressure attribution; see [`find_note`] for the
    /// per-method search order.
    fn locate_note<C: InstrumentController>(
        &self,
        note: u8,
        channel: u8,
        controller: &C,
    ) -> Option<u8> {
        find_note(self.method, self.cursor, self.instruments, channel, note, controller)
    }

    /// Whether this distributor listens on the given channel index.
    pub fn channel_enabled(&self, channel: u8) -> bool {
        u32::from(channel) < NUM_CHANNELS as u32 && self.channels & (1 << channel) != 0
    }

    /// Whether the given instrument slot is in this distributor's pool.
    pub fn instrument_enabled(&self, slot: u8) -> bool {
        selection::slot_enabled(self.instruments, slot)
    }

    /// The enabled-channel mask.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Replaces the enabled-channel mask.
    pub fn set_channels(&mut self, channels: u16) {
        self.channels = channels;
    }

    /// The enabled-instrument mask.
    pub fn instruments(&self) -> u32 {
        self.instruments
    }

    /// Replaces the enabled-instrument mask. The routing cursor restarts, since it may point at
    /// a slot that is no longer enabled.
    pub fn set_instruments(&mut self, instruments: u32) {
        self.instruments = instruments;
        self.cursor = None;
    }

    /// The active distribution method.
    pub fn method(&self) -> DistributionMethod {
        self.method
    }

    /// Replaces the distribution method.
    pub fn set_method(&mut self, method: DistributionMethod) {
        self.method = method;
    }

    /// The playback policy flags.
    pub fn flags(&self) -> DistributorFlags {
        self.flags
    }

    /// Replaces the playback policy flags.
    pub fn set_flags(&mut self, flags: DistributorFlags) {
        self.flags = flags;
    }

    /// Whether this distributor is muted.
    pub fn muted(&self) -> bool {
        self.flags.contains(DistributorFlags::Muted)
    }

    /// Mutes or unmutes this distributor.
    pub fn set_muted(&mut self, muted: bool) {
        self.set_flag(DistributorFlags::Muted, muted);
    }

    /// Flips the mute flag.
    pub fn toggle_muted(&mut self) {
        self.set_muted(!self.muted());
    }

    /// Whether the damper pedal is engaged.
    pub fn damper_pedal(&self) -> bool {
        self.flags.contains(DistributorFlags::DamperPedal)
    }

    /// Engages or releases the damper pedal.
    pub fn set_damper_pedal(&mut self, engaged: bool) {
        self.set_flag(DistributorFlags::DamperPedal, engaged);
    }

    /// Whether polyphonic playback is allowed.
    pub fn polyphonic(&self) -> bool {
        self.flags.contains(DistributorFlags::Polyphonic)
    }

    /// Allows or forbids polyphonic playback.
    pub fn set_polyphonic(&mut self, polyphonic: bool) {
        self.set_flag(DistributorFlags::Polyphonic, polyphonic);
    }

    /// Whether new notes may displace sounding ones.
    pub fn note_overwrite(&self) -> bool {
        self.flags.contains(DistributorFlags::NoteOverwrite)
    }

    /// The lowest note this distributor will play.
    pub fn min_note(&self) -> u8 {
        self.min_note
    }

    /// The highest note this distributor will play.
    pub fn max_note(&self) -> u8 {
        self.max_note
    }

    /// Replaces the playable note range, reordering the bounds if they arrive swapped.
    pub fn set_note_range(&mut self, min_note: u8, max_note: u8) {
        if min_note <= max_note {
            self.min_note = min_note;
            self.max_note = max_note;
        } else {
            self.min_note = max_note;
            self.max_note = min_note;
        }
    }

    /// The polyphonic note budget per instrument.
    pub fn polyphonic_notes(&self) -> u8 {
        self.polyphonic_notes
    }

    /// Replaces the polyphonic note budget.
    pub fn set_polyphonic_notes(&mut self, count: u8) {
        self.polyphonic_notes = count;
    }

    /// Serializes this distributor into its wire construct. Every byte has its high bit clear;
    /// the leading id bytes are zero here and stamped in by the pool.
    pub fn to_serial(&self) -> [u8; DISTRIBUTOR_SERIAL_LEN] {
        let mut out = [0_u8; DISTRIBUTOR_SERIAL_LEN];
        // out[0], out[1]: distributor id, stamped by the pool
        out[2..5].copy_from_slice(&message::pack_channel_mask(self.channels));
        out[5..10].copy_from_slice(&message::pack_instrument_mask(self.instruments));
        out[10] = self.method as u8;
        out[11] = u8::from(self.flags) & 0x7F;
        out[12] = self.min_note & 0x7F;
        out[13] = self.max_note & 0x7F;
        out[14] = self.polyphonic_notes & 0x7F;
        // out[15..]: reserved
        out
    }

    /// Applies a serialized construct, the exact inverse of [`to_serial`](Self::to_serial).
    /// Constructs shorter than the mandatory 15 bytes are ignored.
    pub fn apply_serial(&mut self, data: &[u8]) {
        if data.len() < 15 {
            return;
        }
        self.channels = message::unpack_channel_mask(&data[2..5]);
        self.instruments = message::unpack_instrument_mask(&data[5..10]);
        if let Some(method) = DistributionMethod::from_u8(data[10]) {
            self.method = method;
        }
        self.flags = DistributorFlags::from(data[11] & 0x0F);
        self.set_note_range(data[12], data[13]);
        self.polyphonic_notes = data[14];
        self.cursor = None;
    }

    fn set_flag(&mut self, flag: DistributorFlags, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }
}
