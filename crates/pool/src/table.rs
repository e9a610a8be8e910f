//! Name-keyed slot records with secondary lookups.

use std::collections::HashMap;

use crate::types::Slot;

/// In-memory slot set. All mutation happens under the supervisor's write
/// lock; lookups by agent id and session are linear scans (the pool is small
/// and fixed). Mutations never change a slot's `name`, `index`, or `ports`.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: HashMap<String, Slot>,
}

impl SlotTable {
    pub fn insert(&mut self, slot: Slot) {
        self.slots.insert(slot.name.clone(), slot);
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.slots.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot names in index order.
    pub fn names(&self) -> Vec<String> {
        let mut slots: Vec<&Slot> = self.slots.values().collect();
        slots.sort_by_key(|s| s.index);
        slots.iter().map(|s| s.name.clone()).collect()
    }

    /// Cloned records in index order.
    pub fn snapshot(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.slots.values().cloned().collect();
        slots.sort_by_key(|s| s.index);
        slots
    }

    pub fn find_by_agent_id(&self, id: &str) -> Option<&Slot> {
        self.slots.values().find(|s| s.agent_id() == Some(id))
    }

    pub fn find_by_session(&self, session_id: &str) -> Option<&Slot> {
        self.slots
            .values()
            .find(|s| s.session.session_id.as_deref() == Some(session_id))
    }

    /// Lowest-index slot available for reservation.
    pub fn first_available_mut(&mut self) -> Option<&mut Slot> {
        self.slots
            .values_mut()
            .filter(|s| s.is_available())
            .min_by_key(|s| s.index)
    }
}
