//! Zones and storage slots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Named grouping of slots. Capacity is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u64,
    pub name: String,
    pub capacity: u32,
}

/// Slot occupancy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    Occupied,
    Reserved,
    Maintenance,
}

impl SlotState {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotState::Empty => "empty",
            SlotState::Occupied => "occupied",
            SlotState::Reserved => "reserved",
            SlotState::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressable storage location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: u64,

    pub zone_id: u64,

    /// Human label, unique within the zone (e.g. `B-03`)
    pub label: String,

    pub row: u32,

    pub column: u32,

    pub level: u32,

    pub state: SlotState,

    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(
        id: u64,
        zone_id: u64,
        label: &str,
        position: (u32, u32, u32),
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::validation("slot label is required"));
        }

        let (row, column, level) = position;
        Ok(Self {
            id,
            zone_id,
            label: label.to_string(),
            row,
            column,
            level,
            state: SlotState::Empty,
            updated_at: now,
        })
    }

    /// Flip an empty slot to occupied
    pub fn occupy(&self, now: DateTime<Utc>) -> Result<Slot> {
        if self.state != SlotState::Empty {
            return Err(Error::SlotUnavailable {
                slot_id: self.id,
                state: self.state.to_string(),
            });
        }

        Ok(Slot {
            state: SlotState::Occupied,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Free the slot after its ticket reached a terminal status
    pub fn release(&self, now: DateTime<Utc>) -> Slot {
        Slot {
            state: SlotState::Empty,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Administrative state change. Occupancy is owned by tickets.
    pub fn set_state(&self, state: SlotState, now: DateTime<Utc>) -> Result<Slot> {
        if state == SlotState::Occupied {
            return Err(Error::validation(
                "slots become occupied only through allocation",
            ));
        }
        if self.state == SlotState::Occupied {
            return Err(Error::Conflict(format!(
                "slot {} is occupied by an open ticket",
                self.id
            )));
        }

        Ok(Slot {
            state,
            updated_at: now,
            ..self.clone()
        })
    }

    pub fn label_key(&self) -> String {
        normalize_label(&self.label)
    }
}

pub fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_uppercase()
}

/// Slots of `zone_id` an operator may pick, in row/column/level order
pub fn selectable_slots(slots: impl IntoIterator<Item = Slot>, zone_id: u64) -> Vec<Slot> {
    let mut selectable: Vec<Slot> = slots
        .into_iter()
        .filter(|slot| slot.zone_id == zone_id && slot.state == SlotState::Empty)
        .collect();
    selectable.sort_by_key(|slot| (slot.row, slot.column, slot.level, slot.id));
    selectable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u64, zone_id: u64, row: u32, state: SlotState) -> Slot {
        let mut slot = Slot::new(id, zone_id, &format!("S-{id}"), (row, 1, 1), Utc::now()).unwrap();
        slot.state = state;
        slot
    }

    #[test]
    fn test_only_empty_slots_of_zone_are_selectable() {
        let slots = vec![
            slot(1, 1, 3, SlotState::Empty),
            slot(2, 1, 1, SlotState::Occupied),
            slot(3, 1, 2, SlotState::Reserved),
            slot(4, 1, 4, SlotState::Maintenance),
            slot(5, 2, 1, SlotState::Empty),
            slot(6, 1, 1, SlotState::Empty),
        ];

        let ids: Vec<u64> = selectable_slots(slots, 1).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![6, 1]);
    }

    #[test]
    fn test_occupy_requires_empty() {
        let empty = slot(1, 1, 1, SlotState::Empty);
        let occupied = empty.occupy(Utc::now()).unwrap();
        assert_eq!(occupied.state, SlotState::Occupied);

        match occupied.occupy(Utc::now()) {
            Err(Error::SlotUnavailable { slot_id, state }) => {
                assert_eq!(slot_id, 1);
                assert_eq!(state, "occupied");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let reserved = slot(2, 1, 1, SlotState::Reserved);
        assert!(reserved.occupy(Utc::now()).is_err());
    }

    #[test]
    fn test_manual_state_changes() {
        let empty = slot(1, 1, 1, SlotState::Empty);
        let maintenance = empty.set_state(SlotState::Maintenance, Utc::now()).unwrap();
        assert_eq!(maintenance.state, SlotState::Maintenance);

        assert!(empty.set_state(SlotState::Occupied, Utc::now()).is_err());

        let occupied = slot(2, 1, 1, SlotState::Occupied);
        assert!(matches!(
            occupied.set_state(SlotState::Empty, Utc::now()),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_label_required() {
        assert!(Slot::new(1, 1, "  ", (1, 1, 1), Utc::now()).is_err());
        let slot = Slot::new(1, 1, " b-03 ", (1, 3, 1), Utc::now()).unwrap();
        assert_eq!(slot.label, "b-03");
        assert_eq!(slot.label_key(), "B-03");
    }
}
