//! The wire-level message model: a received MIDI frame wrapped with typed accessors, plus the
//! constants of the SysEx configuration protocol.
//!
//! A [`WireMessage`] is constructed once per frame by a transport adapter and is immutable after
//! construction; responses are built as fresh instances with [`WireMessage::sysex`]. Channel-voice
//! frames additionally expose a typed [`wmidi::MidiMessage`] view via
//! [`WireMessage::channel_message`].

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;
use tinyvec::ArrayVec;

/// Largest frame the core will carry. Anything longer is dropped at the transport boundary.
pub const MAX_PACKET_LEN: usize = 128;

/// Size of the SysEx header: start byte, protocol tag, two-byte source, two-byte destination,
/// command byte.
pub const SYSEX_HEADER_LEN: usize = 7;

/// MIDI manufacturer id reserved for non-commercial use; doubles as this protocol's tag. A SysEx
/// frame carrying any other tag is not ours and is ignored.
pub const SYSEX_PROTOCOL_ID: u8 = 0x7D;

/// Destination address that every device accepts.
pub const BROADCAST_ID: u16 = 0x0000;

/// Reserved address of the configuration server (the maximum 14-bit value). Change notifications
/// are addressed here.
pub const SERVER_ID: u16 = 0x3FFF;

/// MIDI status-byte type nibbles.
pub mod status {
    /// Note Off channel message.
    pub const NOTE_OFF: u8 = 0x80;
    /// Note On channel message (velocity 0 doubles as Note Off).
    pub const NOTE_ON: u8 = 0x90;
    /// Polyphonic key pressure (aftertouch).
    pub const KEY_PRESSURE: u8 = 0xA0;
    /// Control change.
    pub const CONTROL_CHANGE: u8 = 0xB0;
    /// Program change.
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    /// Channel pressure.
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    /// Pitch bend, 14-bit value split LSB-first across the two data bytes.
    pub const PITCH_BEND: u8 = 0xE0;
    /// System common/real-time; the low nibble selects the concrete message.
    pub const SYS_COMMON: u8 = 0xF0;

    /// Low nibble of a system frame carrying SysEx.
    pub const SYS_EX: u8 = 0x0;
    /// Low nibble of the system frame on which all notes are stopped.
    pub const SYS_STOP: u8 = 0xA;
    /// Low nibble of the system reset frame.
    pub const SYS_RESET: u8 = 0xF;
}

/// Control-change controller numbers the core reacts to.
pub mod cc {
    /// Modulation wheel, forwarded device-wide.
    pub const MODULATION_WHEEL: u8 = 1;
    /// Foot pedal, forwarded device-wide.
    pub const FOOT_PEDAL: u8 = 4;
    /// Channel volume, forwarded device-wide.
    pub const VOLUME: u8 = 7;
    /// Expression, forwarded device-wide.
    pub const EXPRESSION: u8 = 11;
    /// Effect control 1, forwarded device-wide.
    pub const EFFECT_CTRL_1: u8 = 12;
    /// Effect control 2, forwarded device-wide.
    pub const EFFECT_CTRL_2: u8 = 13;
    /// Damper (sustain) pedal; values above 64 engage it.
    pub const DAMPER_PEDAL: u8 = 64;
    /// All sound off.
    pub const MUTE: u8 = 120;
    /// Reset all controllers.
    pub const RESET: u8 = 121;
    /// All notes off.
    pub const ALL_NOTES_OFF: u8 = 123;
    /// Omni mode off.
    pub const OMNI_MODE_OFF: u8 = 124;
    /// Omni mode on.
    pub const OMNI_MODE_ON: u8 = 125;
    /// Mono operation.
    pub const MONOPHONIC: u8 = 126;
    /// Poly operation.
    pub const POLYPHONIC: u8 = 127;
}

/// Command bytes of the SysEx configuration protocol.
///
/// Commands in the `0x4x` range reply with the requested field; commands in the `0x2x` and `0x5x`
/// ranges mutate silently and are answered with a `DeviceChanged` broadcast to the *other*
/// transports instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysExCommand {
    /// Liveness probe; replies with the device id.
    DeviceReady = 0x00,
    /// Clears all distributors and persisted state, resets the device name.
    ResetDeviceConfig = 0x01,
    /// Discovery probe; replies with the device id.
    DiscoverDevices = 0x02,
    /// Free-text host chatter; accepted and ignored by devices.
    Message = 0x03,
    /// Broadcast emitted after any configuration change.
    DeviceChanged = 0x04,

    /// Device construct including all distributors (never implemented on-device).
    GetDeviceConstructFull = 0x10,
    /// Replies with the 40-byte device construct.
    GetDeviceConstruct = 0x11,
    /// Replies with the 14-bit device id.
    GetDeviceId = 0x12,
    /// Replies with the 20-byte device name.
    GetDeviceName = 0x13,
    /// Replies with the device boolean flags.
    GetDeviceBoolean = 0x14,

    /// Device construct including all distributors (never implemented on-device).
    SetDeviceConstructFull = 0x20,
    /// Applies the runtime-mutable subset of a device construct.
    SetDeviceConstruct = 0x21,
    /// Sets the 14-bit device id.
    SetDeviceId = 0x22,
    /// Sets the device name.
    SetDeviceName = 0x23,
    /// Sets the device boolean flags.
    SetDeviceBoolean = 0x24,

    /// Replies with the distributor count.
    GetNumDistributors = 0x30,
    /// Appends a distributor, optionally from a serialized construct.
    AddDistributor = 0x31,
    /// Replies with the distributor count (multi-construct transfer was never specified).
    GetAllDistributors = 0x32,
    /// Removes the addressed distributor, renumbering its successors.
    RemoveDistributor = 0x33,
    /// Clears the distributor pool.
    RemoveAllDistributors = 0x34,
    /// Toggles the addressed distributor's mute flag; replies with an empty acknowledgement.
    ToggleMuteDistributor = 0x35,

    /// Replies with the addressed distributor's serialized construct.
    GetDistributorConstruct = 0x40,
    /// Replies with the addressed distributor's channel mask.
    GetDistributorChannels = 0x41,
    /// Replies with the addressed distributor's instrument mask.
    GetDistributorInstruments = 0x42,
    /// Replies with the addressed distributor's distribution method.
    GetDistributorMethod = 0x43,
    /// Replies with the addressed distributor's boolean flags.
    GetDistributorBoolValues = 0x44,
    /// Replies with the addressed distributor's note range.
    GetDistributorMinMaxNotes = 0x45,
    /// Replies with the addressed distributor's polyphonic note count.
    GetDistributorNumPolyphonicNotes = 0x46,

    /// Overwrites the addressed distributor from a construct, growing the pool as needed.
    SetDistributorConstruct = 0x50,
    /// Sets the addressed distributor's channel mask.
    SetDistributorChannels = 0x51,
    /// Sets the addressed distributor's instrument mask.
    SetDistributorInstruments = 0x52,
    /// Sets the addressed distributor's distribution method.
    SetDistributorMethod = 0x53,
    /// Sets the addressed distributor's boolean flags.
    SetDistributorBoolValues = 0x54,
    /// Sets the addressed distributor's note range.
    SetDistributorMinMaxNotes = 0x55,
    /// Sets the addressed distributor's polyphonic note count.
    SetDistributorNumPolyphonicNotes = 0x56,
}

/// Splits a 14-bit value into two 7-bit bytes, MSB first.
pub fn pack_u14(value: u16) -> [u8; 2] {
    [((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8]
}

/// Reassembles a 14-bit value from two 7-bit bytes, MSB first.
pub fn unpack_u14(bytes: &[u8]) -> u16 {
    match bytes {
        [msb, lsb, ..] => (u16::from(*msb) << 7) | u16::from(*lsb),
        _ => 0,
    }
}

/// Packs a 16-bit channel mask into three 7-bit bytes.
pub fn pack_channel_mask(mask: u16) -> [u8; 3] {
    [
        ((mask >> 14) & 0x03) as u8,
        ((mask >> 7) & 0x7F) as u8,
        (mask & 0x7F) as u8,
    ]
}

/// Inverse of [`pack_channel_mask`].
pub fn unpack_channel_mask(bytes: &[u8]) -> u16 {
    match bytes {
        [b0, b1, b2, ..] => (u16::from(*b0) << 14) | (u16::from(*b1) << 7) | u16::from(*b2),
        _ => 0,
    }
}

/// Packs a 32-bit instrument mask into five 7-bit bytes.
pub fn pack_instrument_mask(mask: u32) -> [u8; 5] {
    [
        ((mask >> 28) & 0x0F) as u8,
        ((mask >> 21) & 0x7F) as u8,
        ((mask >> 14) & 0x7F) as u8,
        ((mask >> 7) & 0x7F) as u8,
        (mask & 0x7F) as u8,
    ]
}

/// Inverse of [`pack_instrument_mask`].
pub fn unpack_instrument_mask(bytes: &[u8]) -> u32 {
    match bytes {
        [b0, b1, b2, b3, b4, ..] => {
            (u32::from(*b0) << 28)
                | (u32::from(*b1) << 21)
                | (u32::from(*b2) << 14)
                | (u32::from(*b3) << 7)
                | u32::from(*b4)
        }
        _ => 0,
    }
}

/// One received or outgoing MIDI frame.
///
/// The frame is held verbatim; accessors interpret it in place. Channel-message accessors are
/// meaningful only for channel-voice frames and SysEx accessors only for frames whose status byte
/// is `0xF0` — callers dispatch on [`status`](WireMessage::status) first, exactly as the protocol
/// handlers do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireMessage {
    bytes: ArrayVec<[u8; MAX_PACKET_LEN]>,
}

impl WireMessage {
    /// Wraps a received frame, or `None` for anything malformed.
    ///
    /// Malformed means: empty, longer than [`MAX_PACKET_LEN`], a missing status bit, or — for
    /// SysEx frames — a short header, a foreign protocol tag, a missing `0xF7` terminator, or an
    /// interior byte with its high bit set. Callers treat `None` as "silently ignore", never as
    /// an error to surface.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.is_empty() || data.len() > MAX_PACKET_LEN || data[0] & 0x80 == 0 {
            return None;
        }
        if data[0] == 0xF0 {
            if data.len() < SYSEX_HEADER_LEN + 1
                || data[1] != SYSEX_PROTOCOL_ID
                || *data.last()? != 0xF7
                || data[1..data.len() - 1].iter().any(|&b| b & 0x80 != 0)
            {
                return None;
            }
        }
        let mut bytes = ArrayVec::new();
        bytes.extend_from_slice(data);
        Some(Self { bytes })
    }

    /// Builds an outgoing SysEx frame for this protocol.
    ///
    /// The payload is truncated to the frame capacity and masked to 7 bits, honoring the MIDI
    /// data-byte constraint.
    pub fn sysex(source: u16, destination: u16, command: u8, payload: &[u8]) -> Self {
        let mut bytes = ArrayVec::new();
        bytes.push(0xF0);
        bytes.push(SYSEX_PROTOCOL_ID);
        for byte in pack_u14(source) {
            bytes.push(byte);
        }
        for byte in pack_u14(destination) {
            bytes.push(byte);
        }
        bytes.push(command & 0x7F);
        for &byte in payload.iter().take(MAX_PACKET_LEN - SYSEX_HEADER_LEN - 1) {
            bytes.push(byte & 0x7F);
        }
        bytes.push(0xF7);
        Self { bytes }
    }

    /// The raw frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The status byte.
    pub fn status(&self) -> u8 {
        self.data_byte(0)
    }

    /// The status type nibble (one of the [`status`](crate::message::status) constants).
    pub fn message_type(&self) -> u8 {
        self.status() & 0xF0
    }

    /// The channel index (0–15) of a channel-voice frame.
    pub fn channel(&self) -> u8 {
        self.status() & 0x0F
    }

    /// The controller number of a control-change frame.
    pub fn cc_control(&self) -> u8 {
        self.data_byte(1)
    }

    /// The controller value of a control-change frame.
    pub fn cc_value(&self) -> u8 {
        self.data_byte(2)
    }

    /// The 14-bit value of a pitch-bend frame (first data byte is the LSB).
    pub fn pitch_bend(&self) -> u16 {
        (u16::from(self.data_byte(2)) << 7) | u16::from(self.data_byte(1))
    }

    /// The protocol tag of a SysEx frame.
    pub fn sysex_id(&self) -> u8 {
        self.data_byte(1)
    }

    /// The 14-bit sender address of a SysEx frame.
    pub fn source_id(&self) -> u16 {
        unpack_u14(self.bytes.get(2..).unwrap_or(&[]))
    }

    /// The 14-bit destination address of a SysEx frame.
    pub fn destination_id(&self) -> u16 {
        unpack_u14(self.bytes.get(4..).unwrap_or(&[]))
    }

    /// The raw command byte of a SysEx frame.
    pub fn command_byte(&self) -> u8 {
        self.data_byte(6)
    }

    /// The decoded command of a SysEx frame, or `None` for bytes outside the table.
    pub fn command(&self) -> Option<SysExCommand> {
        SysExCommand::from_u8(self.command_byte())
    }

    /// The command payload of a SysEx frame (everything between the command byte and the
    /// terminator).
    pub fn payload(&self) -> &[u8] {
        if self.bytes.len() > SYSEX_HEADER_LEN + 1 {
            &self.bytes[SYSEX_HEADER_LEN..self.bytes.len() - 1]
        } else {
            &[]
        }
    }

    /// The 14-bit distributor index carried in the first two payload bytes of
    /// distributor-addressed commands.
    pub fn distributor_id(&self) -> u16 {
        unpack_u14(self.payload())
    }

    /// A typed view of a channel-voice frame, or `None` for system frames and undecodable data.
    pub fn channel_message(&self) -> Option<wmidi::MidiMessage<'_>> {
        if self.message_type() == status::SYS_COMMON {
            return None;
        }
        wmidi::MidiMessage::from_bytes(&self.bytes).ok()
    }

    fn data_byte(&self, index: usize) -> u8 {
        self.bytes.get(index).copied().unwrap_or(0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WireMessage {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "WireMessage {{");
        for &byte in self.bytes.iter() {
            defmt::write!(fmt, " {}", byte);
        }
        defmt::write!(fmt, " }}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_channel_voice_frames() {
        let msg = WireMessage::from_bytes(&[0x91, 60, 100]).expect("valid frame");
        assert_eq!(0x90, msg.status() & 0xF0);
        assert_eq!(1, msg.channel());

        match msg.channel_message() {
            Some(wmidi::MidiMessage::NoteOn(channel, note, velocity)) => {
                assert_eq!(1, channel.index());
                assert_eq!(60, u8::from(note));
                assert_eq!(100, u8::from(velocity));
            }
            other => panic!("expected NoteOn view, got {other:?}"),
        }
    }

    #[test]
    fn pitch_bend_is_lsb_first() {
        let msg = WireMessage::from_bytes(&[0xE0, 0x01, 0x40]).expect("valid frame");
        assert_eq!((0x40 << 7) | 0x01, msg.pitch_bend());
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(None, WireMessage::from_bytes(&[]), "empty frame");
        assert_eq!(None, WireMessage::from_bytes(&[0x40, 0x40]), "no status bit");
        assert_eq!(
            None,
            WireMessage::from_bytes(&[0xF0, SYSEX_PROTOCOL_ID, 0x00, 0xF7]),
            "short SysEx header"
        );
        assert_eq!(
            None,
            WireMessage::from_bytes(&[0xF0, 0x41, 0, 1, 0, 2, 0x00, 0xF7]),
            "foreign protocol tag"
        );
        assert_eq!(
            None,
            WireMessage::from_bytes(&[0xF0, SYSEX_PROTOCOL_ID, 0, 1, 0, 2, 0x80, 0xF7]),
            "interior byte with high bit set"
        );
    }

    #[test]
    fn sysex_frame_round_trips() {
        let msg = WireMessage::sysex(0x1234, SERVER_ID, SysExCommand::GetDeviceName as u8, &[7, 9]);
        let decoded = WireMessage::from_bytes(msg.as_bytes()).expect("self-built frame decodes");

        assert_eq!(0x1234, decoded.source_id());
        assert_eq!(SERVER_ID, decoded.destination_id());
        assert_eq!(Some(SysExCommand::GetDeviceName), decoded.command());
        assert_eq!(&[7, 9], decoded.payload());
    }

    #[test]
    fn sysex_payload_bytes_are_masked() {
        let msg = WireMessage::sysex(1, 2, SysExCommand::Message as u8, &[0xFF, 0x80]);
        assert_eq!(&[0x7F, 0x00], msg.payload());
    }

    #[test]
    fn distributor_id_reads_first_two_payload_bytes() {
        let msg = WireMessage::sysex(1, 2, SysExCommand::RemoveDistributor as u8, &[0x01, 0x05]);
        assert_eq!((1 << 7) | 5, msg.distributor_id());
    }

    #[test]
    fn mask_packing_round_trips() {
        assert_eq!(0xFFFF, unpack_channel_mask(&pack_channel_mask(0xFFFF)));
        assert_eq!(0x8421, unpack_channel_mask(&pack_channel_mask(0x8421)));
        assert_eq!(
            0xFFFF_FFFF,
            unpack_instrument_mask(&pack_instrument_mask(0xFFFF_FFFF))
        );
        assert_eq!(
            0x8000_0001,
            unpack_instrument_mask(&pack_instrument_mask(0x8000_0001))
        );
        assert_eq!(0x3FFF, unpack_u14(&pack_u14(0x3FFF)));
    }
}
