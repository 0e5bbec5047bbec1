//! The SysEx configuration command table.
//!
//! Preconditions first: the frame must carry this protocol's tag (enforced at decode) and must be
//! addressed to this device, the broadcast address, or the reserved server address. Everything
//! else is silently dropped — on a shared bus, traffic for other devices is normal, not an error.
//!
//! Response policy, by command family: `Get*` commands always reply, echoing the command byte.
//! `Set*` and lifecycle commands never reply; they raise the changed flag instead, which the
//! router fans out to the other transports as a `DeviceChanged` broadcast. `ToggleMuteDistributor`
//! is the one mutator that also replies (an empty acknowledgement).

use super::{Dispatch, ProtocolDispatcher};
use crate::device::{DEFAULT_DEVICE_NAME, DeviceFlags};
use crate::distributor::{DistributionMethod, DistributorFlags};
use crate::instrument::InstrumentController;
use crate::message::{
    BROADCAST_ID, SERVER_ID, SysExCommand, WireMessage, pack_channel_mask, pack_instrument_mask,
    pack_u14, unpack_channel_mask, unpack_instrument_mask, unpack_u14,
};
use crate::storage::ConfigStorage;
use num_traits::FromPrimitive as _;

impl<C: InstrumentController, S: ConfigStorage> ProtocolDispatcher<C, S> {
    pub(super) fn process_sysex(&mut self, message: &WireMessage) -> Dispatch {
        let destination = message.destination_id();
        if destination != self.device.id()
            && destination != BROADCAST_ID
            && destination != SERVER_ID
        {
            return Dispatch::nothing();
        }
        let reply_to = message.source_id();
        let Some(command) = message.command() else {
            // bytes outside the table are future protocol, not errors
            return Dispatch::nothing();
        };
        let payload = message.payload();
        let id = message.distributor_id();

        match command {
            SysExCommand::DeviceReady | SysExCommand::DiscoverDevices => {
                self.reply(reply_to, command, &pack_u14(self.device.id()))
            }
            SysExCommand::ResetDeviceConfig => {
                self.pool.remove_all(&mut self.controller, &mut self.storage);
                self.storage.reset_device_config();
                self.device.set_name(DEFAULT_DEVICE_NAME.as_bytes());
                self.storage.set_device_name(&self.device.padded_name(0));
                #[cfg(feature = "defmt")]
                defmt::info!("Device configuration reset");
                Dispatch::changed()
            }
            SysExCommand::Message
            | SysExCommand::DeviceChanged
            | SysExCommand::GetDeviceConstructFull
            | SysExCommand::SetDeviceConstructFull => Dispatch::nothing(),

            SysExCommand::GetDeviceConstruct => {
                self.reply(reply_to, command, &self.device.construct())
            }
            SysExCommand::GetDeviceId => self.reply(reply_to, command, &pack_u14(self.device.id())),
            SysExCommand::GetDeviceName => {
                self.reply(reply_to, command, &self.device.padded_name(0))
            }
            SysExCommand::GetDeviceBoolean => {
                self.reply(reply_to, command, &pack_u14(u8::from(self.device.flags()).into()))
            }

            SysExCommand::SetDeviceConstruct => {
                self.device.apply_construct(payload);
                self.storage.set_device_id(self.device.id());
                self.storage.set_device_flags(self.device.flags().into());
                self.storage.set_device_name(&self.device.padded_name(0));
                Dispatch::changed()
            }
            SysExCommand::SetDeviceId => {
                if payload.len() < 2 {
                    return Dispatch::nothing();
                }
                self.device.set_id(unpack_u14(payload));
                self.storage.set_device_id(self.device.id());
                Dispatch::changed()
            }
            SysExCommand::SetDeviceName => {
                self.device.set_name(payload);
                self.storage.set_device_name(&self.device.padded_name(0));
                Dispatch::changed()
            }
            SysExCommand::SetDeviceBoolean => {
                if payload.len() < 2 {
                    return Dispatch::nothing();
                }
                self.device.set_flags(DeviceFlags::from(unpack_u14(payload) as u8));
                self.storage.set_device_flags(self.device.flags().into());
                Dispatch::changed()
            }

            SysExCommand::GetNumDistributors | SysExCommand::GetAllDistributors => {
                self.reply(reply_to, command, &[self.pool.len() as u8])
            }
            SysExCommand::AddDistributor => {
                let added = if payload.len() >= 15 {
                    self.pool.add_from_serial(payload, &mut self.storage)
                } else {
                    self.pool.add(&mut self.storage)
                };
                Dispatch::changed_if(added.is_some())
            }
            SysExCommand::RemoveDistributor => {
                Dispatch::changed_if(self.pool.remove(id, &mut self.controller, &mut self.storage))
            }
            SysExCommand::RemoveAllDistributors => {
                self.pool.remove_all(&mut self.controller, &mut self.storage);
                Dispatch::changed()
            }
            SysExCommand::ToggleMuteDistributor => {
                let changed =
                    self.pool.toggle_mute(id, &mut self.controller, &mut self.storage);
                let mut outcome = self.reply(reply_to, command, &[]);
                outcome.changed = changed;
                outcome
            }

            SysExCommand::GetDistributorConstruct => {
                // an empty pool still answers, with an all-default construct
                let mut construct = self.pool.serial_of(id).unwrap_or_default();
                construct[..2].copy_from_slice(payload.get(..2).unwrap_or(&[0, 0]));
                self.reply(reply_to, command, &construct)
            }
            SysExCommand::GetDistributorChannels => {
                let channels = self.distributor_field(id, |d| d.channels(), 0);
                self.reply(reply_to, command, &pack_channel_mask(channels))
            }
            SysExCommand::GetDistributorInstruments => {
                let instruments = self.distributor_field(id, |d| d.instruments(), 0);
                self.reply(reply_to, command, &pack_instrument_mask(instruments))
            }
            SysExCommand::GetDistributorMethod => {
                let method = self.distributor_field(id, |d| d.method() as u8, 0);
                self.reply(reply_to, command, &[method])
            }
            SysExCommand::GetDistributorBoolValues => {
                let flags = self.distributor_field(id, |d| u8::from(d.flags()), 0);
                self.reply(reply_to, command, &pack_u14(flags.into()))
            }
            SysExCommand::GetDistributorMinMaxNotes => {
                let range = self.distributor_field(id, |d| [d.min_note(), d.max_note()], [0, 127]);
                self.reply(reply_to, command, &range)
            }
            SysExCommand::GetDistributorNumPolyphonicNotes => {
                let count = self.distributor_field(id, |d| d.polyphonic_notes(), 1);
                self.reply(reply_to, command, &[count])
            }

            SysExCommand::SetDistributorConstruct => {
                Dispatch::changed_if(self.pool.set_or_add(
                    payload,
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
            SysExCommand::SetDistributorChannels => {
                if payload.len() < 5 {
                    return Dispatch::nothing();
                }
                let channels = unpack_channel_mask(&payload[2..5]);
                Dispatch::changed_if(self.pool.set_channels(
                    id,
                    channels,
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
            SysExCommand::SetDistributorInstruments => {
                if payload.len() < 7 {
                    return Dispatch::nothing();
                }
                let instruments = unpack_instrument_mask(&payload[2..7]);
                Dispatch::changed_if(self.pool.set_instruments(
                    id,
                    instruments,
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
            SysExCommand::SetDistributorMethod => {
                let Some(method) = payload.get(2).copied().and_then(DistributionMethod::from_u8)
                else {
                    return Dispatch::nothing();
                };
                Dispatch::changed_if(self.pool.set_method(
                    id,
                    method,
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
            SysExCommand::SetDistributorBoolValues => {
                if payload.len() < 4 {
                    return Dispatch::nothing();
                }
                let flags = DistributorFlags::from(unpack_u14(&payload[2..4]) as u8 & 0x0F);
                Dispatch::changed_if(self.pool.set_flags(
                    id,
                    flags,
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
            SysExCommand::SetDistributorMinMaxNotes => {
                if payload.len() < 4 {
                    return Dispatch::nothing();
                }
                Dispatch::changed_if(self.pool.set_note_range(
                    id,
                    payload[2],
                    payload[3],
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
            SysExCommand::SetDistributorNumPolyphonicNotes => {
                let Some(&count) = payload.get(2) else {
                    return Dispatch::nothing();
                };
                Dispatch::changed_if(self.pool.set_polyphonic_notes(
                    id,
                    count,
                    &mut self.controller,
                    &mut self.storage,
                ))
            }
        }
    }

    /// Builds a reply frame addressed back at the sender, echoing the command byte.
    fn reply(&self, destination: u16, command: SysExCommand, payload: &[u8]) -> Dispatch {
        Dispatch::reply(WireMessage::sysex(self.device.id(), destination, command as u8, payload))
    }

    /// Reads one field of the addressed distributor, or the protocol's default when the id is
    /// out of range.
    fn distributor_field<T>(
        &self,
        id: u16,
        read: impl FnOnce(&crate::distributor::Distributor) -> T,
        default: T,
    ) -> T {
        if (id as usize) < self.pool.len() {
            self.pool.get(id).map(read).unwrap_or(default)
        } else {
            default
        }
    }
}
