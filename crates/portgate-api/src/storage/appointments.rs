//! Pickup appointments

use chrono::Utc;
use portgate_common::{
    Appointment, AppointmentStatus, AppointmentWindow, Container, Error, Result,
};
use tracing::{debug, info};

use super::{contention, keys, Storage, Versioned, MAX_ATTEMPTS};
use crate::backend::WriteBatch;
use crate::models::{BookAppointmentRequest, Booking, Session};

impl Storage {
    /// Book an appointment and attach it, with the chosen vessel, to the
    /// container in one guarded write
    pub async fn book_appointment(
        &self,
        session: &Session,
        request: BookAppointmentRequest,
    ) -> Result<Booking> {
        let window = AppointmentWindow::new(request.send_date, request.pickup_date)?;
        self.get_vessel(request.vessel_id).await?;

        let container_key = keys::container(request.container_id);
        let mut fresh_id: Option<u64> = None;

        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<Container> = self
                .require("container", &container_key, request.container_id)
                .await?;
            let container = &current.value;
            if !session.is_admin() && !container.is_owned_by(session.user_id) {
                return Err(Error::Forbidden(format!(
                    "container {} does not belong to you",
                    container.code
                )));
            }

            if let Some(existing) = container.appointment_id {
                let scheduled = self
                    .read::<Appointment>(&keys::appointment(existing))
                    .await?
                    .map_or(false, |a| a.value.status == AppointmentStatus::Scheduled);
                if scheduled {
                    return Err(Error::Conflict(format!(
                        "container {} already has scheduled appointment #{}",
                        container.code, existing
                    )));
                }
            }

            let id = match fresh_id {
                Some(id) => id,
                None => {
                    let id = self.next_id(keys::APPOINTMENT_SEQ).await?;
                    fresh_id = Some(id);
                    id
                }
            };
            let client_id = container.owner_id.unwrap_or(session.user_id);
            let appointment = Appointment::schedule(id, client_id, window, Utc::now());
            let attached = container.attach_appointment(id, request.vessel_id);

            let mut batch = WriteBatch::new();
            batch
                .guard(container_key.as_str(), Some(&current.raw))
                .put_json(container_key.as_str(), &attached)?
                .put_json(keys::appointment(id), &appointment)?
                .index(keys::APPOINTMENTS, id, id as f64)
                .index(keys::client_appointments(client_id), id, id as f64);

            if self.commit(&batch).await? {
                info!(
                    "Booked appointment #{} for container {} ({} days)",
                    id, attached.code, appointment.duration_days
                );
                return Ok(Booking {
                    appointment,
                    container: attached,
                });
            }
            debug!("Container {} changed during booking, re-reading", request.container_id);
        }
        Err(contention("container"))
    }

    pub async fn get_appointment(&self, id: u64) -> Result<Appointment> {
        Ok(self
            .require("appointment", &keys::appointment(id), id)
            .await?
            .value)
    }

    /// All appointments, or those of one client
    pub async fn list_appointments(&self, client_id: Option<u64>) -> Result<Vec<Appointment>> {
        match client_id {
            Some(client_id) => {
                self.list(&keys::client_appointments(client_id), keys::appointment)
                    .await
            }
            None => self.list(keys::APPOINTMENTS, keys::appointment).await,
        }
    }

    pub async fn set_appointment_status(
        &self,
        id: u64,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<Appointment> = self
                .require("appointment", &keys::appointment(id), id)
                .await?;
            let updated = current.value.transition(status)?;

            let mut batch = WriteBatch::new();
            batch
                .guard(keys::appointment(id), Some(&current.raw))
                .put_json(keys::appointment(id), &updated)?;

            if self.commit(&batch).await? {
                info!("Appointment #{} is {}", id, status);
                return Ok(updated);
            }
        }
        Err(contention("appointment"))
    }

    /// Client cancellation of its own appointment
    pub async fn cancel_appointment(&self, id: u64, session: &Session) -> Result<Appointment> {
        let appointment = self.get_appointment(id).await?;
        if !session.is_admin() && appointment.client_id != session.user_id {
            return Err(Error::Forbidden(format!(
                "appointment #{} does not belong to you",
                id
            )));
        }
        self.set_appointment_status(id, AppointmentStatus::Cancelled)
            .await
    }
}
