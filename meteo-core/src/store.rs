//! In-memory ordered favorites with current-location pinning.

use std::collections::HashMap;

use crate::model::{CurrentConditions, FavoriteEntry};

/// What a merge did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Current-location record placed at index 0, replacing any previous one.
    Pinned,
    Appended,
    /// A record with the same name already exists; nothing changed.
    Duplicate,
    /// The name was removed after the fetch started; nothing changed.
    Stale,
}

/// Removal generation of a name, captured before a fetch starts.
///
/// Hand it back through [`FavoritesStore::merge_with_ticket`] or
/// [`FavoritesStore::release`] once the fetch settles.
#[derive(Debug, PartialEq, Eq)]
pub struct RefreshTicket {
    name: String,
    generation: u64,
}

impl RefreshTicket {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered favorites list.
///
/// Invariants: at most one current-location record, always first; names are
/// unique; the current-location record cannot be removed by name.
#[derive(Debug, Default, Clone)]
pub struct FavoritesStore {
    items: Vec<CurrentConditions>,
    removals: HashMap<String, u64>,
    /// Tickets handed out and not yet returned. Generations are only
    /// compared against outstanding tickets, so they reset when this is 0.
    in_flight: usize,
}

impl FavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, conditions: CurrentConditions) -> MergeOutcome {
        if conditions.is_current_location {
            self.items.retain(|c| !c.is_current_location && c.label != conditions.label);
            self.items.insert(0, conditions);
            return MergeOutcome::Pinned;
        }

        if self.contains(&conditions.label) {
            return MergeOutcome::Duplicate;
        }

        self.items.push(conditions);
        MergeOutcome::Appended
    }

    /// Merge unless `name` was removed after `ticket` was issued.
    pub fn merge_with_ticket(
        &mut self,
        conditions: CurrentConditions,
        ticket: RefreshTicket,
    ) -> MergeOutcome {
        let stale = self.generation(&ticket.name) != ticket.generation;
        self.release(ticket);
        if stale {
            return MergeOutcome::Stale;
        }
        self.merge(conditions)
    }

    pub fn ticket(&mut self, name: &str) -> RefreshTicket {
        self.in_flight += 1;
        RefreshTicket { name: name.to_string(), generation: self.generation(name) }
    }

    /// Return a ticket whose fetch failed.
    pub fn release(&mut self, _ticket: RefreshTicket) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            self.removals.clear();
        }
    }

    fn generation(&self, name: &str) -> u64 {
        self.removals.get(name).copied().unwrap_or(0)
    }

    /// Remove every record named `name`. Returns false, leaving the list
    /// untouched, when that name belongs to the current location.
    pub fn remove_by_name(&mut self, name: &str) -> bool {
        if self.items.iter().any(|c| c.label == name && c.is_current_location) {
            return false;
        }

        let before = self.items.len();
        self.items.retain(|c| c.label != name);
        if self.in_flight > 0 {
            *self.removals.entry(name.to_string()).or_insert(0) += 1;
        }

        self.items.len() != before
    }

    /// Snapshot in display order.
    pub fn to_ordered_list(&self) -> Vec<CurrentConditions> {
        self.items.clone()
    }

    pub fn entries(&self) -> Vec<FavoriteEntry> {
        self.items.iter().map(CurrentConditions::to_entry).collect()
    }

    pub fn get(&self, name: &str) -> Option<&CurrentConditions> {
        self.items.iter().find(|c| c.label == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
