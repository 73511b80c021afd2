//! Ticket lifecycle
//!
//! A ticket binds one container to one slot and one operator for the
//! duration of its visit. Statuses only move forward:
//!
//! ```text
//! pending -> queued -> validated -> active -> finalized
//!    \_________\__________\__________\______-> cancelled
//! ```
//!
//! `validated` is only reachable through slot allocation, which is the
//! step that binds the slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Requested by a client, no slot yet
    Pending,
    /// Accepted into the operator queue, no slot yet
    Queued,
    /// Slot bound, container expected on site
    Validated,
    /// Container physically on site
    Active,
    /// Container left the terminal
    Finalized,
    /// Abandoned before completion
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::Pending,
        TicketStatus::Queued,
        TicketStatus::Validated,
        TicketStatus::Active,
        TicketStatus::Finalized,
        TicketStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Queued => "queued",
            TicketStatus::Validated => "validated",
            TicketStatus::Active => "active",
            TicketStatus::Finalized => "finalized",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Finalized | TicketStatus::Cancelled)
    }

    /// Statuses that hold a slot
    pub fn holds_slot(self) -> bool {
        matches!(self, TicketStatus::Validated | TicketStatus::Active)
    }

    /// Whether slot allocation may pick up a ticket in this status
    pub fn accepts_allocation(self) -> bool {
        matches!(self, TicketStatus::Pending | TicketStatus::Queued)
    }

    /// Transitions exposed through the generic transition operation.
    ///
    /// `validated` is deliberately absent: it is produced by allocation.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        match (self, next) {
            (TicketStatus::Pending, TicketStatus::Queued)
            | (TicketStatus::Validated, TicketStatus::Active)
            | (TicketStatus::Active, TicketStatus::Finalized) => true,
            (current, TicketStatus::Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,

    pub container_id: u64,

    /// Bound slot, set by allocation
    pub slot_id: Option<u64>,

    /// Operator who allocated the slot
    pub assigned_user_id: Option<u64>,

    /// Client who requested the ticket, if it started as a request
    pub requested_by: Option<u64>,

    pub status: TicketStatus,

    /// When the slot was bound
    pub entered_at: Option<DateTime<Utc>>,

    /// When the ticket was finalized
    pub exited_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Result of applying a transition: the new ticket plus the slot to free
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub ticket: Ticket,
    pub released_slot: Option<u64>,
}

impl Ticket {
    /// A client request for a container, not yet slotted
    pub fn request(id: u64, container_id: u64, requested_by: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            container_id,
            slot_id: None,
            assigned_user_id: None,
            requested_by: Some(requested_by),
            status: TicketStatus::Pending,
            entered_at: None,
            exited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A ticket created directly by slot allocation
    pub fn allocated(
        id: u64,
        container_id: u64,
        slot_id: u64,
        operator_id: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            container_id,
            slot_id: Some(slot_id),
            assigned_user_id: Some(operator_id),
            requested_by: None,
            status: TicketStatus::Validated,
            entered_at: Some(now),
            exited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bind a slot to a pending or queued ticket
    pub fn promote(&self, slot_id: u64, operator_id: u64, now: DateTime<Utc>) -> Result<Ticket> {
        if !self.status.accepts_allocation() {
            return Err(Error::AlreadyProcessed {
                ticket_id: self.id,
                status: self.status,
            });
        }

        Ok(Ticket {
            slot_id: Some(slot_id),
            assigned_user_id: Some(operator_id),
            status: TicketStatus::Validated,
            entered_at: Some(now),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Move the ticket to `next`, computing side effects
    pub fn apply_transition(&self, next: TicketStatus, now: DateTime<Utc>) -> Result<Transition> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let mut ticket = self.clone();
        ticket.status = next;
        ticket.updated_at = now;

        let released_slot = if next.is_terminal() {
            ticket.slot_id
        } else {
            None
        };

        if next == TicketStatus::Finalized {
            ticket.exited_at = Some(now);
        }

        Ok(Transition {
            ticket,
            released_slot,
        })
    }
}
