//! Ticket workflow: scan, allocation, transitions and the change feed
//!
//! Every write touching a ticket goes through [`stage_ticket`], which bumps
//! the change sequence in the same batch. The open-ticket marker
//! `container:{id}:open_ticket` is written and cleared in the same batch as
//! the ticket it points to, so a container never has two open tickets.

use chrono::Utc;
use portgate_common::{Error, Result, Slot, Ticket, TicketStatus};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::{contention, keys, Storage, Versioned, MAX_ATTEMPTS};
use crate::backend::WriteBatch;
use crate::models::{Allocation, ScanResult, Session, TicketChanges, TicketDetails, TicketFilter};

/// Stage a ticket write plus its listing and change feed entries
fn stage_ticket(batch: &mut WriteBatch, ticket: &Ticket) -> Result<()> {
    batch
        .put_json(keys::ticket(ticket.id), ticket)?
        .index(keys::TICKETS, ticket.id, ticket.id as f64)
        .track_change(keys::CHANGE_SEQ, keys::TICKET_CHANGES, ticket.id);
    Ok(())
}

/// Open ticket of a container with the marker value it was found under
struct OpenTicket {
    marker: String,
    ticket: Versioned<Ticket>,
}

impl Storage {
    async fn open_ticket(&self, container_id: u64) -> Result<Option<OpenTicket>> {
        let marker_key = keys::open_ticket(container_id);
        let Some(marker) = self.backend().get(&marker_key).await? else {
            return Ok(None);
        };

        let ticket_id: u64 = marker.parse().map_err(|_| {
            Error::Other(anyhow::anyhow!("corrupt marker {}: {}", marker_key, marker))
        })?;
        let ticket = self
            .require("ticket", &keys::ticket(ticket_id), ticket_id)
            .await?;

        Ok(Some(OpenTicket { marker, ticket }))
    }

    /// Resolve a scanned code for the allocation workflow
    pub async fn scan(&self, code: &str) -> Result<ScanResult> {
        let container = self
            .find_container_by_code(code)
            .await?
            .ok_or_else(|| Error::not_found("container", code.trim()))?;

        let pending_ticket = match self.open_ticket(container.id).await? {
            Some(open) if open.ticket.value.status.holds_slot() => {
                let ticket = open.ticket.value;
                info!(
                    "Scan of {} rejected: ticket #{} is {}",
                    container.code, ticket.id, ticket.status
                );
                return Err(Error::AlreadyProcessed {
                    ticket_id: ticket.id,
                    status: ticket.status,
                });
            }
            Some(open) => Some(open.ticket.value),
            None => None,
        };

        info!("Scanned container {} ({})", container.id, container.code);
        Ok(ScanResult {
            container,
            pending_ticket,
        })
    }

    /// Client request for a ticket, left pending until an operator allocates
    pub async fn request_ticket(&self, container_id: u64, session: &Session) -> Result<Ticket> {
        let container = self.get_container(container_id).await?;
        if !session.is_admin() && !container.is_owned_by(session.user_id) {
            return Err(Error::Forbidden(format!(
                "container {} does not belong to you",
                container.code
            )));
        }

        let id = self.next_id(keys::TICKET_SEQ).await?;
        for _ in 0..MAX_ATTEMPTS {
            if let Some(open) = self.open_ticket(container_id).await? {
                return Err(Error::AlreadyProcessed {
                    ticket_id: open.ticket.value.id,
                    status: open.ticket.value.status,
                });
            }

            let ticket = Ticket::request(id, container_id, session.user_id, Utc::now());
            let mut batch = WriteBatch::new();
            batch
                .guard(keys::open_ticket(container_id), None)
                .put(keys::open_ticket(container_id), id.to_string());
            stage_ticket(&mut batch, &ticket)?;

            if self.commit(&batch).await? {
                info!("Ticket #{} requested for container {}", id, container.code);
                return Ok(ticket);
            }
            debug!("Open ticket marker for container {} changed, re-reading", container_id);
        }
        Err(contention("ticket"))
    }

    /// Bind an empty slot to a container in one guarded write
    pub async fn allocate(
        &self,
        container_id: u64,
        slot_id: u64,
        operator_id: u64,
    ) -> Result<Allocation> {
        let container = self.get_container(container_id).await?;
        let mut fresh_id: Option<u64> = None;

        for _ in 0..MAX_ATTEMPTS {
            let now = Utc::now();
            let slot: Versioned<Slot> = self.require("slot", &keys::slot(slot_id), slot_id).await?;
            let occupied = slot.value.occupy(now)?;

            let mut batch = WriteBatch::new();
            batch
                .guard(keys::slot(slot_id), Some(&slot.raw))
                .put_json(keys::slot(slot_id), &occupied)?;

            let ticket = match self.open_ticket(container_id).await? {
                Some(open) => {
                    let promoted = open.ticket.value.promote(slot_id, operator_id, now)?;
                    batch
                        .guard(keys::open_ticket(container_id), Some(&open.marker))
                        .guard(keys::ticket(promoted.id), Some(&open.ticket.raw));
                    promoted
                }
                None => {
                    let id = match fresh_id {
                        Some(id) => id,
                        None => {
                            let id = self.next_id(keys::TICKET_SEQ).await?;
                            fresh_id = Some(id);
                            id
                        }
                    };
                    batch
                        .guard(keys::open_ticket(container_id), None)
                        .put(keys::open_ticket(container_id), id.to_string());
                    Ticket::allocated(id, container_id, slot_id, operator_id, now)
                }
            };
            stage_ticket(&mut batch, &ticket)?;

            if self.commit(&batch).await? {
                info!(
                    "Allocated slot {} ({}) to container {} as ticket #{}",
                    slot_id, occupied.label, container.code, ticket.id
                );
                return Ok(Allocation {
                    ticket,
                    slot: occupied,
                });
            }
            debug!("Allocation of slot {} lost a race, re-reading", slot_id);
        }

        warn!("Allocation of slot {} kept conflicting", slot_id);
        Err(contention("slot"))
    }

    /// Move a ticket to `next`. Terminal statuses release the slot and the
    /// container's open-ticket marker in the same write.
    pub async fn transition(&self, ticket_id: u64, next: TicketStatus) -> Result<Ticket> {
        for _ in 0..MAX_ATTEMPTS {
            let now = Utc::now();
            let current: Versioned<Ticket> = self
                .require("ticket", &keys::ticket(ticket_id), ticket_id)
                .await?;
            let transition = current.value.apply_transition(next, now)?;
            let ticket = transition.ticket;

            let mut batch = WriteBatch::new();
            batch.guard(keys::ticket(ticket_id), Some(&current.raw));
            stage_ticket(&mut batch, &ticket)?;

            if let Some(slot_id) = transition.released_slot {
                let slot: Versioned<Slot> =
                    self.require("slot", &keys::slot(slot_id), slot_id).await?;
                batch
                    .guard(keys::slot(slot_id), Some(&slot.raw))
                    .put_json(keys::slot(slot_id), &slot.value.release(now))?;
            }

            if next.is_terminal() {
                let marker = keys::open_ticket(ticket.container_id);
                batch
                    .guard(marker.as_str(), Some(&ticket_id.to_string()))
                    .remove(marker);
            }

            if self.commit(&batch).await? {
                match transition.released_slot {
                    Some(slot_id) => info!(
                        "Ticket #{} is {}, slot {} released",
                        ticket_id, next, slot_id
                    ),
                    None => info!("Ticket #{} is {}", ticket_id, next),
                }
                return Ok(ticket);
            }
            debug!("Ticket #{} changed concurrently, re-reading", ticket_id);
        }
        Err(contention("ticket"))
    }

    pub async fn get_ticket(&self, id: u64) -> Result<Ticket> {
        Ok(self.require("ticket", &keys::ticket(id), id).await?.value)
    }

    /// Tickets matching `filter`, oldest first
    pub async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let tickets: Vec<Ticket> = self.list(keys::TICKETS, keys::ticket).await?;
        Ok(tickets
            .into_iter()
            .filter(|ticket| filter.matches(ticket))
            .collect())
    }

    /// Tickets on containers owned by `client_id`
    pub async fn list_client_tickets(&self, client_id: u64) -> Result<Vec<Ticket>> {
        let owned: HashSet<u64> = self
            .list_containers(Some(client_id))
            .await?
            .into_iter()
            .map(|container| container.id)
            .collect();

        let tickets: Vec<Ticket> = self.list(keys::TICKETS, keys::ticket).await?;
        Ok(tickets
            .into_iter()
            .filter(|ticket| owned.contains(&ticket.container_id))
            .collect())
    }

    /// Tickets joined with container code, slot label and zone name
    pub async fn ticket_board(&self, filter: &TicketFilter) -> Result<Vec<TicketDetails>> {
        let tickets = self.list_tickets(filter).await?;

        let codes: HashMap<u64, String> = self
            .list_containers(None)
            .await?
            .into_iter()
            .map(|container| (container.id, container.code))
            .collect();
        let slots: HashMap<u64, Slot> = self
            .list_slots()
            .await?
            .into_iter()
            .map(|slot| (slot.id, slot))
            .collect();
        let zones: HashMap<u64, String> = self
            .list_zones()
            .await?
            .into_iter()
            .map(|zone| (zone.id, zone.name))
            .collect();

        Ok(tickets
            .into_iter()
            .map(|ticket| {
                let slot = ticket.slot_id.and_then(|id| slots.get(&id));
                TicketDetails {
                    container_code: codes.get(&ticket.container_id).cloned(),
                    slot_label: slot.map(|slot| slot.label.clone()),
                    zone_name: slot.and_then(|slot| zones.get(&slot.zone_id).cloned()),
                    ticket,
                }
            })
            .collect())
    }

    /// Tickets changed after `since`, in change order
    pub async fn ticket_changes(&self, since: u64) -> Result<TicketChanges> {
        // a cursor from before a storage reset restarts the feed
        let current = self.backend().current_sequence(keys::CHANGE_SEQ).await?;
        let since = if since > current {
            warn!("Change cursor {} is ahead of the feed ({}), resending all", since, current);
            0
        } else {
            since
        };

        let changed = self
            .index_ids(keys::TICKET_CHANGES, Some(since as f64))
            .await?;

        let cursor = changed
            .last()
            .map(|(_, score)| *score as u64)
            .unwrap_or(since);
        let ids: Vec<u64> = changed.into_iter().map(|(id, _)| id).collect();
        let tickets = self.load_many(&ids, keys::ticket).await?;

        debug!("{} tickets changed since {}", tickets.len(), since);
        Ok(TicketChanges { tickets, cursor })
    }
}
