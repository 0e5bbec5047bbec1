//! The outer loop: polls every attached transport, runs each received message through the
//! protocol dispatcher, returns responses to the transport they arrived on, and fans
//! configuration-change notifications out to all the *other* transports.

use crate::handler::ProtocolDispatcher;
use crate::instrument::InstrumentController;
use crate::message::{SERVER_ID, SysExCommand, WireMessage};
use crate::storage::ConfigStorage;
use crate::transport::Transport;

/// Shuttles messages between the attached transports and the [`ProtocolDispatcher`].
///
/// Single-threaded and run-to-completion: each poll handles at most one message per transport,
/// fully, before anything else happens. Transports are passed into each call rather than stored,
/// so the platform layer keeps ownership of its concrete adapter types.
pub struct MessageRouter<C: InstrumentController, S: ConfigStorage> {
    dispatcher: ProtocolDispatcher<C, S>,
}

impl<C: InstrumentController, S: ConfigStorage> MessageRouter<C, S> {
    /// Wraps a dispatcher.
    pub fn new(dispatcher: ProtocolDispatcher<C, S>) -> Self {
        Self { dispatcher }
    }

    /// The wrapped dispatcher.
    pub fn dispatcher(&self) -> &ProtocolDispatcher<C, S> {
        &self.dispatcher
    }

    /// Mutable access to the wrapped dispatcher.
    pub fn dispatcher_mut(&mut self) -> &mut ProtocolDispatcher<C, S> {
        &mut self.dispatcher
    }

    /// Brings every transport up. Call once before the first poll.
    pub fn begin(&mut self, transports: &mut [&mut dyn Transport]) {
        for transport in transports.iter_mut() {
            transport.begin();
        }
    }

    /// Polls each transport once and processes whatever arrived, then lets the controller sweep
    /// for stuck notes.
    ///
    /// A response produced by a message goes *only* to the transport that delivered it. A
    /// configuration change triggers a `DeviceChanged` notification to every *other* transport —
    /// the originator made the change and does not need to hear about it.
    pub fn poll_once(&mut self, transports: &mut [&mut dyn Transport]) {
        for index in 0..transports.len() {
            let Some(message) = transports[index].read_message() else {
                continue;
            };
            let outcome = self.dispatcher.process(&message);

            if let Some(response) = outcome.response {
                transports[index].send_message(&response);
            }
            if outcome.changed {
                let notice = WireMessage::sysex(
                    self.dispatcher.device().id(),
                    SERVER_ID,
                    SysExCommand::DeviceChanged as u8,
                    &[],
                );
                for (other, transport) in transports.iter_mut().enumerate() {
                    if other != index {
                        transport.send_message(&notice);
                    }
                }
            }
        }
        self.dispatcher.sweep_timeouts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use crate::message::SysExCommand;
    use crate::testing::{MemoryStorage, QueueTransport, RecordingController};

    const DEVICE_ID: u16 = 0x0011;
    const SENDER_ID: u16 = 0x0007;

    fn router() -> MessageRouter<RecordingController, MemoryStorage> {
        let device = DeviceConfig { id: DEVICE_ID, ..DeviceConfig::default() };
        MessageRouter::new(ProtocolDispatcher::new(
            device.into(),
            RecordingController::default(),
            MemoryStorage::default(),
        ))
    }

    fn sysex_to_device(command: SysExCommand, payload: &[u8]) -> WireMessage {
        WireMessage::sysex(SENDER_ID, DEVICE_ID, command as u8, payload)
    }

    #[test]
    fn responses_return_to_the_originating_transport_only() {
        let mut router = router();
        let mut source = QueueTransport::default();
        let mut other = QueueTransport::default();
        source.inbound.push(sysex_to_device(SysExCommand::GetDeviceName, &[]));

        router.poll_once(&mut [&mut source, &mut other]);

        assert_eq!(1, source.sent.len(), "reply went to the source");
        assert!(other.sent.is_empty(), "a pure query notifies nobody");
        assert_eq!(
            Some(SysExCommand::GetDeviceName),
            source.sent[0].command(),
            "reply echoes the command byte"
        );
    }

    #[test]
    fn changes_broadcast_to_every_other_transport() {
        let mut router = router();
        let mut source = QueueTransport::default();
        let mut second = QueueTransport::default();
        let mut third = QueueTransport::default();
        source.inbound.push(sysex_to_device(SysExCommand::AddDistributor, &[]));

        router.poll_once(&mut [&mut source, &mut second, &mut third]);

        assert!(source.sent.is_empty(), "mutations are not acknowledged to the source");
        for transport in [&second, &third] {
            assert_eq!(1, transport.sent.len());
            let notice = &transport.sent[0];
            assert_eq!(Some(SysExCommand::DeviceChanged), notice.command());
            assert_eq!(DEVICE_ID, notice.source_id());
            assert_eq!(SERVER_ID, notice.destination_id());
        }
    }

    #[test]
    fn broadcast_destination_is_accepted() {
        let mut router = router();
        let mut source = QueueTransport::default();
        source
            .inbound
            .push(WireMessage::sysex(SENDER_ID, 0x0000, SysExCommand::GetDeviceName as u8, &[]));

        router.poll_once(&mut [&mut source]);

        assert_eq!(1, source.sent.len(), "broadcast-addressed queries are answered");
    }

    #[test]
    fn foreign_destinations_are_ignored() {
        let mut router = router();
        let mut source = QueueTransport::default();
        source
            .inbound
            .push(WireMessage::sysex(SENDER_ID, 0x0099, SysExCommand::GetDeviceName as u8, &[]));

        router.poll_once(&mut [&mut source]);

        assert!(source.sent.is_empty());
    }

    #[test]
    fn every_poll_sweeps_instrument_timeouts() {
        let mut router = router();

        router.poll_once(&mut []);
        router.poll_once(&mut []);

        assert_eq!(2, router.dispatcher().controller().timeout_sweeps);
    }

    #[test]
    fn channel_traffic_flows_to_instruments() {
        let mut router = router();
        let mut construct = crate::distributor::Distributor::default().to_serial();
        construct[4] = 0x01; // channel 0
        construct[9] = 0x03; // instruments 0 and 1

        let mut source = QueueTransport::default();
        source.inbound.push(sysex_to_device(SysExCommand::AddDistributor, &construct));
        source.inbound.push(WireMessage::from_bytes(&[0x90, 60, 100]).unwrap());

        router.poll_once(&mut [&mut source]);
        router.poll_once(&mut [&mut source]);

        assert_eq!(1, router.dispatcher().controller().plays.len());
    }
}
