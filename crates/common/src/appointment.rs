//! Pickup appointments

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Expired,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Expired => "expired",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        self == AppointmentStatus::Scheduled && next != AppointmentStatus::Scheduled
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Send/pickup window; pickup is strictly after send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentWindow {
    send_date: NaiveDate,
    pickup_date: NaiveDate,
}

impl AppointmentWindow {
    pub fn new(send_date: NaiveDate, pickup_date: NaiveDate) -> Result<Self> {
        if pickup_date <= send_date {
            return Err(Error::validation(
                "pickup date must be after the send date",
            ));
        }
        Ok(Self {
            send_date,
            pickup_date,
        })
    }

    pub fn send_date(&self) -> NaiveDate {
        self.send_date
    }

    pub fn pickup_date(&self) -> NaiveDate {
        self.pickup_date
    }

    /// Whole calendar days between send and pickup
    pub fn duration_days(&self) -> u32 {
        (self.pickup_date - self.send_date).num_days() as u32
    }
}

/// Appointment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: u64,
    pub client_id: u64,
    pub send_date: NaiveDate,
    pub pickup_date: NaiveDate,
    pub duration_days: u32,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn schedule(id: u64, client_id: u64, window: AppointmentWindow, now: DateTime<Utc>) -> Self {
        Self {
            id,
            client_id,
            send_date: window.send_date(),
            pickup_date: window.pickup_date(),
            duration_days: window.duration_days(),
            status: AppointmentStatus::Scheduled,
            created_at: now,
        }
    }

    pub fn transition(&self, next: AppointmentStatus) -> Result<Appointment> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Conflict(format!(
                "appointment {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        Ok(Appointment {
            status: next,
            ..self.clone()
        })
    }
}
