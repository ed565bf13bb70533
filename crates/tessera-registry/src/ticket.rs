use crate::error::{RegistryError, Result};
use crate::relation::Relation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_types::{Address, EpochSchedule, Record, RecordKind, Slot};
use tracing::{debug, info};

/// Lifecycle of a relationship ticket, derived from its recorded slots.
///
/// `Inactive -> WarmingUp -> Active -> CoolingDown -> Inactive`; the terminal
/// state is re-enterable only by a fresh activation, which starts a new
/// lineage instead of resurrecting the old ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketState {
    Inactive,
    WarmingUp,
    Active,
    CoolingDown,
}

impl TicketState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Inactive)
    }
}

/// A timestamped relationship record between two registry entities.
///
/// The ticket stores the slot the relationship was activated and, when a
/// deactivation has been requested, the slot of that request. Everything else
/// (the lifecycle state, per-epoch eligibility) is derived from those two
/// slots and the network's warmup/cooldown delays, so the record never goes
/// stale between transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    relation: Relation,
    lineage: u64,
    activated_at: Slot,
    deactivated_at: Option<Slot>,
    reserved: [u8; 16],
}

impl Record for Ticket {
    const KIND: RecordKind = RecordKind::Ticket;
}

impl Ticket {
    pub fn new(relation: Relation, activated_at: Slot, lineage: u64) -> Self {
        Self {
            relation,
            lineage,
            activated_at,
            deactivated_at: None,
            reserved: [0; 16],
        }
    }

    pub const fn relation(&self) -> Relation {
        self.relation
    }

    pub const fn lineage(&self) -> u64 {
        self.lineage
    }

    pub const fn activated_at(&self) -> Slot {
        self.activated_at
    }

    pub const fn deactivated_at(&self) -> Option<Slot> {
        self.deactivated_at
    }

    pub fn address(&self) -> Address {
        self.relation.ticket_address()
    }

    /// Current lifecycle state at `current_slot`.
    pub fn state(&self, current_slot: Slot, schedule: &EpochSchedule) -> TicketState {
        if let Some(deactivated_at) = self.deactivated_at {
            let cooled = deactivated_at
                .checked_add(schedule.cooldown_slots)
                .map_or(false, |end| current_slot >= end);
            if cooled {
                TicketState::Inactive
            } else {
                TicketState::CoolingDown
            }
        } else {
            let warmed = self
                .activated_at
                .checked_add(schedule.warmup_slots)
                .map_or(false, |end| current_slot >= end);
            if warmed {
                TicketState::Active
            } else {
                TicketState::WarmingUp
            }
        }
    }

    /// Whether this relationship counts for the epoch starting at
    /// `epoch_start_slot`.
    ///
    /// True iff the warmup completed at or before the boundary and any
    /// requested deactivation has not finished cooling down by the boundary.
    /// Pure; no side effects.
    pub fn is_eligible(&self, epoch_start_slot: Slot, schedule: &EpochSchedule) -> bool {
        let warmed = self
            .activated_at
            .checked_add(schedule.warmup_slots)
            .map_or(false, |end| end <= epoch_start_slot);
        if !warmed {
            return false;
        }
        match self.deactivated_at {
            None => true,
            Some(deactivated_at) => deactivated_at
                .checked_add(schedule.cooldown_slots)
                .map_or(true, |end| end > epoch_start_slot),
        }
    }

    fn record_deactivation(&mut self, current_slot: Slot) {
        self.deactivated_at = Some(current_slot);
    }
}

/// Explicit keyed store of relationship tickets: `Relation -> Ticket`.
///
/// One ticket per relation at a time; a re-activated relation gets a fresh
/// ticket with a bumped lineage. BTreeMap keeps iteration deterministic for
/// snapshotting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketBook {
    tickets: BTreeMap<Relation, Ticket>,
}

impl TicketBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, relation: &Relation) -> Option<&Ticket> {
        self.tickets.get(relation)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Relation, &Ticket)> {
        self.tickets.iter()
    }

    /// Insert a ticket read back from the ledger, e.g. when rebuilding the
    /// book from a snapshot.
    pub fn insert(&mut self, ticket: Ticket) {
        self.tickets.insert(ticket.relation(), ticket);
    }

    /// Activate a relationship. Fails with `AlreadyActive` while a
    /// non-terminal ticket exists for the pair; otherwise records a fresh
    /// ticket in `WarmingUp` with `activated_at = current_slot`.
    pub fn activate(
        &mut self,
        relation: Relation,
        current_slot: Slot,
        schedule: &EpochSchedule,
    ) -> Result<&Ticket> {
        let lineage = match self.tickets.get(&relation) {
            Some(existing) => {
                if !existing.state(current_slot, schedule).is_terminal() {
                    return Err(RegistryError::AlreadyActive {
                        relation: relation.to_string(),
                    });
                }
                existing.lineage.saturating_add(1)
            }
            None => 0,
        };

        let ticket = Ticket::new(relation, current_slot, lineage);
        info!(
            relation = %relation,
            slot = current_slot,
            lineage,
            "ticket activated"
        );
        Ok(self.tickets.entry(relation).and_modify(|t| *t = ticket).or_insert(ticket))
    }

    /// Request deactivation. Fails with `NotActive` when no ticket exists or
    /// the ticket is already terminal; otherwise records the deactivation
    /// slot and the ticket begins cooling down.
    pub fn deactivate(
        &mut self,
        relation: Relation,
        current_slot: Slot,
        schedule: &EpochSchedule,
    ) -> Result<&Ticket> {
        let ticket = self
            .tickets
            .get_mut(&relation)
            .ok_or(RegistryError::NotActive {
                relation: relation.to_string(),
            })?;

        let state = ticket.state(current_slot, schedule);
        if state.is_terminal() || ticket.deactivated_at.is_some() {
            return Err(RegistryError::NotActive {
                relation: relation.to_string(),
            });
        }

        ticket.record_deactivation(current_slot);
        debug!(relation = %relation, slot = current_slot, "ticket cooling down");
        Ok(ticket)
    }

    /// Eligibility of a relation for the epoch starting at
    /// `epoch_start_slot`; an absent ticket is never eligible.
    pub fn is_eligible(
        &self,
        relation: &Relation,
        epoch_start_slot: Slot,
        schedule: &EpochSchedule,
    ) -> bool {
        self.tickets
            .get(relation)
            .map_or(false, |t| t.is_eligible(epoch_start_slot, schedule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(warmup: u64, cooldown: u64) -> EpochSchedule {
        EpochSchedule {
            epoch_length_slots: 100,
            warmup_slots: warmup,
            cooldown_slots: cooldown,
            claim_window_slots: 100,
        }
    }

    fn relation() -> Relation {
        Relation::VaultNetwork {
            vault: Address::new_unique(),
            network: Address::new_unique(),
        }
    }

    #[test]
    fn test_eligibility_boundary_is_exact() {
        let sched = schedule(50, 50);
        let ticket = Ticket::new(relation(), 100, 0);

        // False strictly below activation + warmup, true at exactly that slot.
        assert!(!ticket.is_eligible(149, &sched));
        assert!(ticket.is_eligible(150, &sched));
        assert!(ticket.is_eligible(151, &sched));
    }

    #[test]
    fn test_vault_activation_scenario() {
        // Vault activates against a network at slot 100 with a 50-slot
        // warmup; the epoch boundary at slot 140 excludes it, the boundary
        // at slot 151 includes it.
        let sched = schedule(50, 50);
        let mut book = TicketBook::new();
        let rel = relation();
        book.activate(rel, 100, &sched).unwrap();

        assert!(!book.is_eligible(&rel, 140, &sched));
        assert!(book.is_eligible(&rel, 151, &sched));
    }

    #[test]
    fn test_cooldown_keeps_epoch_eligibility() {
        let sched = schedule(10, 50);
        let mut book = TicketBook::new();
        let rel = relation();
        book.activate(rel, 0, &sched).unwrap();
        book.deactivate(rel, 200, &sched).unwrap();

        // Still eligible while the cooldown runs, ineligible once it ends.
        assert!(book.is_eligible(&rel, 249, &sched));
        assert!(!book.is_eligible(&rel, 250, &sched));
    }

    #[test]
    fn test_double_activate_fails() {
        let sched = schedule(10, 10);
        let mut book = TicketBook::new();
        let rel = relation();
        book.activate(rel, 0, &sched).unwrap();

        // Still warming up at slot 5 and active at slot 50: both refuse.
        assert!(matches!(
            book.activate(rel, 5, &sched),
            Err(RegistryError::AlreadyActive { .. })
        ));
        assert!(matches!(
            book.activate(rel, 50, &sched),
            Err(RegistryError::AlreadyActive { .. })
        ));
    }

    #[test]
    fn test_deactivate_requires_live_ticket() {
        let sched = schedule(10, 10);
        let mut book = TicketBook::new();
        let rel = relation();

        assert!(matches!(
            book.deactivate(rel, 0, &sched),
            Err(RegistryError::NotActive { .. })
        ));

        book.activate(rel, 0, &sched).unwrap();
        book.deactivate(rel, 20, &sched).unwrap();

        // A second request while cooling down or after terminal both fail.
        assert!(matches!(
            book.deactivate(rel, 21, &sched),
            Err(RegistryError::NotActive { .. })
        ));
        assert!(matches!(
            book.deactivate(rel, 500, &sched),
            Err(RegistryError::NotActive { .. })
        ));
    }

    #[test]
    fn test_reactivation_starts_fresh_lineage() {
        let sched = schedule(10, 10);
        let mut book = TicketBook::new();
        let rel = relation();

        book.activate(rel, 0, &sched).unwrap();
        book.deactivate(rel, 20, &sched).unwrap();

        // Terminal at slot 30 (cooldown done), so re-activation succeeds...
        let ticket = *book.activate(rel, 40, &sched).unwrap();
        assert_eq!(ticket.lineage(), 1);
        assert_eq!(ticket.activated_at(), 40);
        assert_eq!(ticket.deactivated_at(), None);

        // ...and the fresh ticket warms up from scratch.
        assert_eq!(ticket.state(45, &sched), TicketState::WarmingUp);
        assert_eq!(ticket.state(50, &sched), TicketState::Active);
    }

    #[test]
    fn test_state_progression() {
        let sched = schedule(10, 10);
        let ticket = Ticket::new(relation(), 100, 0);
        assert_eq!(ticket.state(100, &sched), TicketState::WarmingUp);
        assert_eq!(ticket.state(109, &sched), TicketState::WarmingUp);
        assert_eq!(ticket.state(110, &sched), TicketState::Active);

        let mut cooled = ticket;
        cooled.record_deactivation(200);
        assert_eq!(cooled.state(209, &sched), TicketState::CoolingDown);
        assert_eq!(cooled.state(210, &sched), TicketState::Inactive);
    }
}
