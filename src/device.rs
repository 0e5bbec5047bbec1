//! The device's own identity: its 14-bit address, display name, boolean flags, and the fixed
//! descriptors of the hardware it was built for.
//!
//! Identity starts from compiled-in defaults (a [`DeviceConfig`]), may be overwritten from
//! persistence at boot, and is mutated at runtime through the SysEx `SetDevice*` commands. It is
//! owned by the protocol dispatcher and passed by reference wherever it is read — there is no
//! ambient global.

use bitmask_enum::bitmask;
use num_derive::{FromPrimitive, ToPrimitive};
use tinyvec::ArrayVec;

/// Capacity of the device name, in bytes.
pub const DEVICE_NAME_LEN: usize = 20;

/// Size of the serialized device construct.
pub const DEVICE_CONSTRUCT_LEN: usize = 40;

/// Offset of the name field inside the device construct.
const DEVICE_NAME_OFFSET: usize = 20;

/// Name a device reports after a configuration reset.
pub const DEFAULT_DEVICE_NAME: &str = "New Device";

/// Runtime-togglable device switches, packed into the construct and the `DeviceBoolean` commands.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceFlags {
    /// Suppresses all playback device-wide.
    Muted,
    /// Accept channel messages on every channel.
    OmniMode,
}

/// The family of instrument hardware a build drives, reported in the device construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InstrumentKind {
    /// No instrument configured.
    None = 0,
    /// Software-timed PWM outputs.
    SwPwm = 1,
    /// Hardware PWM peripherals.
    HwPwm = 2,
    /// Steppers driven from hardware PWM.
    StepHwPwm = 3,
    /// Steppers driven from software PWM.
    StepSwPwm = 4,
    /// Shift-register switched outputs.
    ShiftRegister = 5,
    /// Directly driven stepper motors.
    StepperMotor = 0x10,
    /// Floppy-drive heads.
    FloppyDrive = 0x11,
}

/// The microcontroller family a build targets, reported in the device construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Platform {
    /// ESP32 family.
    Esp32 = 1,
    /// ESP8266 family.
    Esp8266 = 2,
    /// Teensy 4.1.
    Teensy41 = 3,
    /// Arduino Uno.
    ArduinoUno = 4,
    /// Arduino Mega.
    ArduinoMega = 5,
    /// Arduino Due.
    ArduinoDue = 6,
    /// Arduino Micro.
    ArduinoMicro = 7,
    /// Arduino Nano.
    ArduinoNano = 8,
}

/// Compiled-in identity defaults, edited per device build.
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    /// 14-bit device address.
    pub id: u16,
    /// Display name; bytes beyond [`DEVICE_NAME_LEN`] are dropped.
    pub name: &'static str,
    /// Instrument hardware family.
    pub instrument: InstrumentKind,
    /// Microcontroller family.
    pub platform: Platform,
    /// Number of instrument slots the build drives.
    pub num_instruments: u8,
    /// Sub-instruments per slot (stacked drives and the like).
    pub num_sub_instruments: u8,
    /// Lowest note the hardware can voice.
    pub min_note: u8,
    /// Highest note the hardware can voice.
    pub max_note: u8,
    /// 14-bit firmware revision.
    pub firmware_version: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 0x0001,
            name: DEFAULT_DEVICE_NAME,
            instrument: InstrumentKind::None,
            platform: Platform::Esp32,
            num_instruments: 0,
            num_sub_instruments: 1,
            min_note: 0,
            max_note: 127,
            firmware_version: 0x0200,
        }
    }
}

/// The device's runtime identity.
#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    id: u16,
    name: ArrayVec<[u8; DEVICE_NAME_LEN]>,
    flags: DeviceFlags,
    instrument: InstrumentKind,
    platform: Platform,
    num_instruments: u8,
    num_sub_instruments: u8,
    min_note: u8,
    max_note: u8,
    firmware_version: u16,
}

impl From<DeviceConfig> for DeviceIdentity {
    fn from(config: DeviceConfig) -> Self {
        let mut identity = Self {
            id: config.id & 0x3FFF,
            name: ArrayVec::new(),
            flags: DeviceFlags::none(),
            instrument: config.instrument,
            platform: config.platform,
            num_instruments: config.num_instruments,
            num_sub_instruments: config.num_sub_instruments,
            min_note: config.min_note,
            max_note: config.max_note,
            firmware_version: config.firmware_version & 0x3FFF,
        };
        identity.set_name(config.name.as_bytes());
        identity
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        DeviceConfig::default().into()
    }
}

impl DeviceIdentity {
    /// The 14-bit device address.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Sets the 14-bit device address.
    pub fn set_id(&mut self, id: u16) {
        self.id = id & 0x3FFF;
    }

    /// The display name, without padding.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Replaces the display name, dropping excess bytes and trailing padding.
    pub fn set_name(&mut self, name: &[u8]) {
        self.name.clear();
        let trimmed = match name.iter().rposition(|&b| b != 0 && b != b' ') {
            Some(last) => &name[..=last],
            None => &[],
        };
        for &byte in trimmed.iter().take(DEVICE_NAME_LEN) {
            self.name.push(byte);
        }
    }

    /// The name padded to [`DEVICE_NAME_LEN`] with the given byte, as the wire format wants it.
    pub fn padded_name(&self, pad: u8) -> [u8; DEVICE_NAME_LEN] {
        let mut out = [pad; DEVICE_NAME_LEN];
        out[..self.name.len()].copy_from_slice(&self.name);
        out
    }

    /// The boolean flags.
    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    /// Replaces the boolean flags.
    pub fn set_flags(&mut self, flags: DeviceFlags) {
        self.flags = flags;
    }

    /// Whether the device is muted as a whole.
    pub fn muted(&self) -> bool {
        self.flags.contains(DeviceFlags::Muted)
    }

    /// Whether omni mode is engaged.
    pub fn omni_mode(&self) -> bool {
        self.flags.contains(DeviceFlags::OmniMode)
    }

    /// Serializes the identity into the 40-byte device construct.
    pub fn construct(&self) -> [u8; DEVICE_CONSTRUCT_LEN] {
        let mut out = [0_u8; DEVICE_CONSTRUCT_LEN];
        out[0] = ((self.id >> 7) & 0x7F) as u8;
        out[1] = (self.id & 0x7F) as u8;
        out[2] = u8::from(self.flags) & 0x7F;
        out[3] = self.num_instruments & 0x7F;
        out[4] = self.num_sub_instruments & 0x7F;
        out[5] = (self.instrument as u8) & 0x7F;
        out[6] = (self.platform as u8) & 0x7F;
        out[7] = self.min_note & 0x7F;
        out[8] = self.max_note & 0x7F;
        out[9] = ((self.firmware_version >> 7) & 0x7F) as u8;
        out[10] = (self.firmware_version & 0x7F) as u8;
        let name = self.padded_name(b' ');
        out[DEVICE_NAME_OFFSET..DEVICE_NAME_OFFSET + DEVICE_NAME_LEN].copy_from_slice(&name);
        out
    }

    /// Applies the runtime-mutable fields of a device construct: id, flags, and name. The
    /// hardware descriptors are facts of the build and stay untouched.
    pub fn apply_construct(&mut self, data: &[u8]) {
        if data.len() < DEVICE_CONSTRUCT_LEN {
            return;
        }
        self.set_id((u16::from(data[0]) << 7) | u16::from(data[1]));
        self.flags = DeviceFlags::from(data[2]);
        let name = &data[DEVICE_NAME_OFFSET..DEVICE_NAME_OFFSET + DEVICE_NAME_LEN];
        self.set_name(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceConfig {
            id: 0x0123,
            name: "Dulcimer",
            instrument: InstrumentKind::StepperMotor,
            platform: Platform::Teensy41,
            num_instruments: 8,
            num_sub_instruments: 1,
            min_note: 36,
            max_note: 83,
            firmware_version: 0x0200,
        }
        .into()
    }

    #[test]
    fn construct_layout() {
        let construct = identity().construct();

        assert_eq!(0x02, construct[0], "id MSB");
        assert_eq!(0x23, construct[1], "id LSB");
        assert_eq!(0, construct[2], "flags");
        assert_eq!(8, construct[3], "instrument count");
        assert_eq!(InstrumentKind::StepperMotor as u8, construct[5]);
        assert_eq!(Platform::Teensy41 as u8, construct[6]);
        assert_eq!((36, 83), (construct[7], construct[8]), "note range");
        assert_eq!(b'D', construct[20], "name starts at offset 20");
        assert_eq!(b' ', construct[28], "name is space-padded");
    }

    #[test]
    fn apply_construct_updates_mutable_fields_only() {
        let mut identity = identity();
        let mut construct = identity.construct();
        construct[0] = 0x01;
        construct[1] = 0x05;
        construct[2] = u8::from(DeviceFlags::OmniMode);
        construct[3] = 31; // descriptor bytes must not stick
        construct[20..40].copy_from_slice(b"Calliope            ");

        identity.apply_construct(&construct);

        assert_eq!((1 << 7) | 5, identity.id());
        assert!(identity.omni_mode());
        assert_eq!(b"Calliope", identity.name());
        assert_eq!(8, identity.construct()[3], "instrument count unchanged");
    }

    #[test]
    fn name_is_truncated_and_trimmed() {
        let mut identity = DeviceIdentity::default();
        identity.set_name(b"a name well beyond twenty bytes");
        assert_eq!(DEVICE_NAME_LEN, identity.name().len());

        identity.set_name(b"Organ\0\0\0");
        assert_eq!(b"Organ", identity.name());
    }

    #[test]
    fn ids_are_masked_to_14_bits() {
        let mut identity = DeviceIdentity::default();
        identity.set_id(0xFFFF);
        assert_eq!(0x3FFF, identity.id());
    }
}
