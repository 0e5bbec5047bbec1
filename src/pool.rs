//! The distributor pool: an insertion-ordered, densely indexed collection of
//! [`Distributor`]s.
//!
//! A distributor's wire id *is* its current position — removing distributor `k` renumbers every
//! later one down by a slot. External tools depend on that scheme, so the pool keeps it and makes
//! the renumbering explicit: removal rewrites the persisted constructs from the removal point.
//!
//! Mutations that could orphan sounding notes stop everything first, then persist through the
//! [`ConfigStorage`] seam, and report whether anything changed so the caller can raise the
//! configuration-changed broadcast.

use tinyvec::ArrayVec;

use crate::distributor::{
    DISTRIBUTOR_SERIAL_LEN, DistributionMethod, Distributor, DistributorFlags,
};
use crate::instrument::InstrumentController;
use crate::message::{self, WireMessage, cc};
use crate::storage::ConfigStorage;

/// Upper bound on simultaneously configured distributors.
pub const MAX_DISTRIBUTORS: usize = 16;

/// An ordered pool of distributors, addressed by dense index.
#[derive(Clone, Debug, Default)]
pub struct DistributorPool {
    distributors: ArrayVec<[Distributor; MAX_DISTRIBUTORS]>,
}

impl DistributorPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of configured distributors.
    pub fn len(&self) -> usize {
        self.distributors.len()
    }

    /// Whether the pool holds no distributors.
    pub fn is_empty(&self) -> bool {
        self.distributors.is_empty()
    }

    /// Read access by id, clamped to the last distributor when `id` runs past the end. `None`
    /// only on an empty pool.
    pub fn get(&self, id: u16) -> Option<&Distributor> {
        if self.distributors.is_empty() {
            return None;
        }
        let index = (id as usize).min(self.distributors.len() - 1);
        Some(&self.distributors[index])
    }

    /// Appends a default distributor and persists it. Returns the new id, or `None` when the
    /// pool is full (the request is dropped, per the silent-degradation policy).
    pub fn add<S: ConfigStorage>(&mut self, storage: &mut S) -> Option<u16> {
        self.push_distributor(Distributor::default(), storage)
    }

    /// Appends a distributor decoded from a serialized construct and persists it. A freshly
    /// added distributor owns no sounding notes, so nothing needs stopping here.
    pub fn add_from_serial<S: ConfigStorage>(&mut self, data: &[u8], storage: &mut S) -> Option<u16> {
        self.push_distributor(Distributor::from_serial(data), storage)
    }

    /// Overwrites the distributor addressed by the construct's leading id bytes, growing the
    /// pool with defaults first when the id lies beyond the current end. Returns whether the
    /// configuration changed.
    pub fn set_or_add<C, S>(&mut self, data: &[u8], controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        if data.len() < 15 {
            return false;
        }
        let id = message::unpack_u14(data);
        while (id as usize) >= self.distributors.len() {
            if self.push_distributor(Distributor::default(), storage).is_none() {
                return false;
            }
        }
        controller.stop_all();
        self.distributors[id as usize].apply_serial(data);
        self.persist(id, storage);
        true
    }

    /// Removes the addressed distributor and renumbers its successors, force-stopping all notes
    /// first so none are orphaned. Out-of-range ids are ignored.
    pub fn remove<C, S>(&mut self, id: u16, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        if (id as usize) >= self.distributors.len() {
            return false;
        }
        controller.stop_all();
        self.distributors.remove(id as usize);
        storage.set_num_distributors(self.distributors.len() as u8);
        // every survivor past the gap now answers to a smaller id
        for index in (id as usize)..self.distributors.len() {
            self.persist(index as u16, storage);
        }
        #[cfg(feature = "defmt")]
        defmt::info!("Removed distributor {}", id);
        true
    }

    /// Clears the pool.
    pub fn remove_all<C, S>(&mut self, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        controller.stop_all();
        self.distributors.clear();
        storage.set_num_distributors(0);
        true
    }

    /// The serialized construct of the addressed distributor with its id stamped into the
    /// leading bytes, read with the same clamping as [`get`](Self::get).
    pub fn serial_of(&self, id: u16) -> Option<[u8; DISTRIBUTOR_SERIAL_LEN]> {
        let distributor = self.get(id)?;
        let index = (id as usize).min(self.distributors.len() - 1) as u16;
        let mut serial = distributor.to_serial();
        serial[..2].copy_from_slice(&message::pack_u14(index));
        Some(serial)
    }

    /// Forwards a channel message to *every* distributor listening on its channel — fan-out,
    /// not first-match.
    pub fn distribute<C: InstrumentController>(&mut self, message: &WireMessage, controller: &mut C) {
        let channel = message.channel();
        for distributor in self.distributors.iter_mut() {
            if distributor.channel_enabled(channel) {
                distributor.process_message(message, controller);
            }
        }
    }

    /// Executes a control change.
    ///
    /// Device-wide controllers act on the [`InstrumentController`] no matter what distributors
    /// exist. The per-distributor controllers act on the *first* distributor whose channel mask
    /// matches — first-match, unlike [`distribute`](Self::distribute).
    pub fn dispatch_control_change<C: InstrumentController>(
        &mut self,
        message: &WireMessage,
        controller: &mut C,
    ) {
        let value = message.cc_value();
        match message.cc_control() {
            cc::MODULATION_WHEEL => return controller.set_modulation_wheel(value),
            cc::FOOT_PEDAL => return controller.set_foot_pedal(value),
            cc::VOLUME => return controller.set_volume(value),
            cc::EXPRESSION => return controller.set_expression(value),
            cc::EFFECT_CTRL_1 => return controller.set_effect_ctrl_1(value),
            cc::EFFECT_CTRL_2 => return controller.set_effect_ctrl_2(value),
            _ => {}
        }

        let Some(distributor) = self
            .distributors
            .iter_mut()
            .find(|distributor| distributor.channel_enabled(message.channel()))
        else {
            return;
        };

        match message.cc_control() {
            cc::DAMPER_PEDAL => distributor.set_damper_pedal(value > 64),
            cc::MUTE | cc::ALL_NOTES_OFF => controller.stop_all(),
            cc::RESET => controller.reset_all(),
            cc::OMNI_MODE_OFF | cc::OMNI_MODE_ON => controller.stop_all(),
            cc::MONOPHONIC => {
                distributor.set_polyphonic(false);
                controller.stop_all();
            }
            cc::POLYPHONIC => {
                distributor.set_polyphonic(true);
                controller.stop_all();
            }
            _ => {}
        }
    }

    /// Replaces the addressed distributor's channel mask.
    pub fn set_channels<C, S>(&mut self, id: u16, channels: u16, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, |distributor| {
            distributor.set_channels(channels);
        })
    }

    /// Replaces the addressed distributor's instrument mask.
    pub fn set_instruments<C, S>(&mut self, id: u16, instruments: u32, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, |distributor| {
            distributor.set_instruments(instruments);
        })
    }

    /// Replaces the addressed distributor's distribution method.
    pub fn set_method<C, S>(&mut self, id: u16, method: DistributionMethod, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, |distributor| {
            distributor.set_method(method);
        })
    }

    /// Replaces the addressed distributor's playback policy flags.
    pub fn set_flags<C, S>(&mut self, id: u16, flags: DistributorFlags, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, |distributor| {
            distributor.set_flags(flags);
        })
    }

    /// Replaces the addressed distributor's playable note range.
    pub fn set_note_range<C, S>(&mut self, id: u16, min_note: u8, max_note: u8, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, |distributor| {
            distributor.set_note_range(min_note, max_note);
        })
    }

    /// Replaces the addressed distributor's polyphonic note budget.
    pub fn set_polyphonic_notes<C, S>(&mut self, id: u16, count: u8, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, |distributor| {
            distributor.set_polyphonic_notes(count);
        })
    }

    /// Flips the addressed distributor's mute flag.
    pub fn toggle_mute<C, S>(&mut self, id: u16, controller: &mut C, storage: &mut S) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        self.mutate(id, controller, storage, Distributor::toggle_muted)
    }

    /// Rebuilds the pool from persisted constructs at boot. Nothing is re-persisted and no
    /// change is reported; this is the restore direction of the persistence seam.
    pub fn restore_from<S: ConfigStorage>(&mut self, storage: &S) {
        self.distributors.clear();
        let count = storage.num_distributors().min(MAX_DISTRIBUTORS as u8);
        for id in 0..count {
            if let Some(construct) = storage.distributor_construct(id) {
                self.distributors.push(Distributor::from_serial(&construct));
            }
        }
    }

    /// Applies one in-range mutation with the standard side-effect triple: stop sounding notes,
    /// persist the affected construct, report the change.
    fn mutate<C, S>(
        &mut self,
        id: u16,
        controller: &mut C,
        storage: &mut S,
        change: impl FnOnce(&mut Distributor),
    ) -> bool
    where
        C: InstrumentController,
        S: ConfigStorage,
    {
        if (id as usize) >= self.distributors.len() {
            return false;
        }
        controller.stop_all();
        change(&mut self.distributors[id as usize]);
        self.persist(id, storage);
        true
    }

    fn push_distributor<S: ConfigStorage>(
        &mut self,
        distributor: Distributor,
        storage: &mut S,
    ) -> Option<u16> {
        if self.distributors.len() == self.distributors.capacity() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Distributor pool is full, dropping add request");
            return None;
        }
        self.distributors.push(distributor);
        let id = (self.distributors.len() - 1) as u16;
        self.persist(id, storage);
        storage.set_num_distributors(self.distributors.len() as u8);
        Some(id)
    }

    fn persist<S: ConfigStorage>(&self, id: u16, storage: &mut S) {
        if let Some(serial) = self.serial_of(id) {
            storage.set_distributor_construct(id as u8, &serial);
        }
    }
}
