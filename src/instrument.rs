//! The seam between the routing core and the platform's instrument drivers.
//!
//! The core treats the controller as a synchronous collaborator called only from the poll loop;
//! implementations that run timer interrupts underneath must do their own synchronization on the
//! far side of this trait.

/// Operations the routing core needs from whatever actually sounds notes — PWM channels, stepper
/// motors, floppy drives, relays.
///
/// Only note playback and the active-note queries are required; everything else defaults to a
/// no-op so that minimal instruments stay minimal. The controller owns all note bookkeeping: the
/// core asks [`is_note_active`](Self::is_note_active) and
/// [`num_active_notes`](Self::num_active_notes) rather than tracking notes itself.
pub trait InstrumentController {
    /// Returns every instrument to its power-on state.
    fn reset_all(&mut self);

    /// Stops every sounding note on every instrument. Invoked as a global panic-stop, so notes
    /// started by *any* distributor are affected.
    fn stop_all(&mut self);

    /// Starts a note on the given instrument slot.
    fn play_note(&mut self, instrument: u8, note: u8, velocity: u8, channel: u8);

    /// Stops a note on the given instrument slot.
    fn stop_note(&mut self, instrument: u8, note: u8, velocity: u8);

    /// Number of notes currently sounding on the given instrument slot.
    fn num_active_notes(&self, instrument: u8) -> u8;

    /// Whether the given note is currently sounding on the given instrument slot.
    fn is_note_active(&self, instrument: u8, note: u8) -> bool;

    /// Updates the pressure of a note that is already sounding.
    fn set_key_pressure(&mut self, instrument: u8, note: u8, pressure: u8) {
        let _ = (instrument, note, pressure);
    }

    /// Applies a 14-bit pitch-bend value to one instrument slot.
    fn set_pitch_bend(&mut self, instrument: u8, bend: u16, channel: u8) {
        let _ = (instrument, bend, channel);
    }

    /// Device-wide program-change hint.
    fn set_program_change(&mut self, program: u8) {
        let _ = program;
    }

    /// Device-wide channel-pressure hint.
    fn set_channel_pressure(&mut self, pressure: u8) {
        let _ = pressure;
    }

    /// Device-wide modulation-wheel amount.
    fn set_modulation_wheel(&mut self, value: u8) {
        let _ = value;
    }

    /// Device-wide foot-pedal amount.
    fn set_foot_pedal(&mut self, value: u8) {
        let _ = value;
    }

    /// Device-wide volume.
    fn set_volume(&mut self, value: u8) {
        let _ = value;
    }

    /// Device-wide expression amount.
    fn set_expression(&mut self, value: u8) {
        let _ = value;
    }

    /// Device-wide effect control 1.
    fn set_effect_ctrl_1(&mut self, value: u8) {
        let _ = value;
    }

    /// Device-wide effect control 2.
    fn set_effect_ctrl_2(&mut self, value: u8) {
        let _ = value;
    }

    /// Invoked once per poll cycle so the controller can expire stuck notes.
    fn check_instrument_timeouts(&mut self) {}
}
