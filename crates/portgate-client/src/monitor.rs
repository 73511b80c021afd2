//! Live turn monitor
//!
//! Polls the ticket change feed and keeps a local board of tickets keyed by
//! id. Each poll only transfers tickets changed since the previous cursor.

use anyhow::Result;
use chrono::{DateTime, Utc};
use portgate_common::{Ticket, TicketStatus};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::client::{ApiClient, TicketChanges};

/// Default polling interval
pub const DEFAULT_INTERVAL_SECS: u64 = 8;

/// Local copy of the ticket board
#[derive(Debug, Default)]
pub struct Board {
    tickets: BTreeMap<u64, Ticket>,
    cursor: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Merge a delta into the board. Returns how many tickets changed.
    ///
    /// A cursor lower than ours means the server restarted its feed, so the
    /// delta is the whole board.
    pub fn apply(&mut self, changes: TicketChanges, now: DateTime<Utc>) -> usize {
        if changes.cursor < self.cursor {
            debug!(
                "Feed restarted at cursor {} (was {}), rebuilding board",
                changes.cursor, self.cursor
            );
            self.tickets.clear();
        }

        let changed = changes.tickets.len();
        for ticket in changes.tickets {
            self.tickets.insert(ticket.id, ticket);
        }
        self.cursor = changes.cursor;
        if changed > 0 {
            self.updated_at = Some(now);
        }
        changed
    }

    pub fn get(&self, id: u64) -> Option<&Ticket> {
        self.tickets.get(&id)
    }

    /// Tickets still in progress, oldest first
    pub fn open(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets
            .values()
            .filter(|ticket| !ticket.status.is_terminal())
    }

    /// Number of tickets per status, in workflow order
    pub fn counts(&self) -> Vec<(TicketStatus, usize)> {
        TicketStatus::ALL
            .iter()
            .map(|status| {
                let count = self
                    .tickets
                    .values()
                    .filter(|ticket| ticket.status == *status)
                    .count();
                (*status, count)
            })
            .collect()
    }

    /// One-line summary, e.g. `validated=2 active=1 finalized=4`
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .counts()
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(status, count)| format!("{}={}", status, count))
            .collect();

        if parts.is_empty() {
            "no tickets".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Ticket board monitor
pub struct TurnMonitor {
    client: ApiClient,
    interval: Duration,
    board: Board,
}

impl TurnMonitor {
    /// Create a monitor over a signed-in client
    pub fn new(client: ApiClient, interval: Duration) -> Self {
        Self {
            client,
            interval,
            board: Board::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Start the monitoring loop
    ///
    /// This runs until the task is dropped, polling at the configured interval.
    pub async fn start(mut self) -> Result<()> {
        info!(
            "Starting turn monitor on {} (polling every {} seconds)",
            self.client.base_url(),
            self.interval.as_secs()
        );

        loop {
            if let Err(e) = self.poll_once().await {
                error!("Error polling ticket changes: {:#}", e);
            }

            sleep(self.interval).await;
        }
    }

    /// Fetch and merge one delta
    pub async fn poll_once(&mut self) -> Result<usize> {
        let changes = self.client.ticket_changes(self.board.cursor()).await?;
        let changed = self.board.apply(changes, Utc::now());

        if changed == 0 {
            debug!("No ticket changes (cursor {})", self.board.cursor());
            return Ok(0);
        }

        info!(
            "{} ticket(s) changed, cursor {}: {}",
            changed,
            self.board.cursor(),
            self.board.summary()
        );
        for ticket in self.board.open() {
            debug!(
                "  #{} container {} slot {:?} {}",
                ticket.id, ticket.container_id, ticket.slot_id, ticket.status
            );
        }

        Ok(changed)
    }
}
