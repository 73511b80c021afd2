//! Storage for the terminal records
//!
//! Data model (every record is JSON):
//! - `{entity}:{id}` → record, `{entity}s:all` → index of ids (score = id)
//! - `seq:{entity}` → id sequence
//! - `user:email:{email}`, `container:code:{CODE}`, `slot:label:{zone}:{LABEL}` → id (uniqueness)
//! - `container:{id}:open_ticket` → id of the container's non-terminal ticket
//! - `zone:{id}:slots`, `client:{id}:appointments`, `invoice:{id}:payments` → indexes
//! - `ticket:{id}:invoice` → id of the ticket's live invoice
//! - `tickets:changes` → ticket ids scored by `seq:changes`
//! - `session:{token}` → session, expiring

mod appointments;
mod billing;
mod inventory;
mod stats;
mod tickets;
mod users;

use portgate_common::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::backend::{Backend, MemoryBackend, RedisBackend, WriteBatch};

/// Attempts for operations whose guarded write lost a race
pub(crate) const MAX_ATTEMPTS: usize = 3;

pub(crate) mod keys {
    pub const USERS: &str = "users:all";
    pub const USER_SEQ: &str = "seq:users";
    pub const VESSELS: &str = "vessels:all";
    pub const VESSEL_SEQ: &str = "seq:vessels";
    pub const ZONES: &str = "zones:all";
    pub const ZONE_SEQ: &str = "seq:zones";
    pub const SLOTS: &str = "slots:all";
    pub const SLOT_SEQ: &str = "seq:slots";
    pub const CONTAINERS: &str = "containers:all";
    pub const CONTAINER_SEQ: &str = "seq:containers";
    pub const TICKETS: &str = "tickets:all";
    pub const TICKET_SEQ: &str = "seq:tickets";
    pub const TICKET_CHANGES: &str = "tickets:changes";
    pub const CHANGE_SEQ: &str = "seq:changes";
    pub const APPOINTMENTS: &str = "appointments:all";
    pub const APPOINTMENT_SEQ: &str = "seq:appointments";
    pub const INVOICES: &str = "invoices:all";
    pub const INVOICE_SEQ: &str = "seq:invoices";
    pub const PAYMENT_SEQ: &str = "seq:payments";

    pub fn user(id: u64) -> String {
        format!("user:{}", id)
    }

    pub fn user_email(email: &str) -> String {
        format!("user:email:{}", email)
    }

    pub fn vessel(id: u64) -> String {
        format!("vessel:{}", id)
    }

    pub fn zone(id: u64) -> String {
        format!("zone:{}", id)
    }

    pub fn zone_slots(zone_id: u64) -> String {
        format!("zone:{}:slots", zone_id)
    }

    pub fn slot(id: u64) -> String {
        format!("slot:{}", id)
    }

    pub fn slot_label(zone_id: u64, label: &str) -> String {
        format!("slot:label:{}:{}", zone_id, label)
    }

    pub fn container(id: u64) -> String {
        format!("container:{}", id)
    }

    pub fn container_code(code: &str) -> String {
        format!("container:code:{}", code)
    }

    pub fn open_ticket(container_id: u64) -> String {
        format!("container:{}:open_ticket", container_id)
    }

    pub fn ticket(id: u64) -> String {
        format!("ticket:{}", id)
    }

    pub fn ticket_invoice(ticket_id: u64) -> String {
        format!("ticket:{}:invoice", ticket_id)
    }

    pub fn appointment(id: u64) -> String {
        format!("appointment:{}", id)
    }

    pub fn client_appointments(client_id: u64) -> String {
        format!("client:{}:appointments", client_id)
    }

    pub fn invoice(id: u64) -> String {
        format!("invoice:{}", id)
    }

    pub fn invoice_payments(invoice_id: u64) -> String {
        format!("invoice:{}:payments", invoice_id)
    }

    pub fn payment(id: u64) -> String {
        format!("payment:{}", id)
    }

    pub fn session(token: &str) -> String {
        format!("session:{}", token)
    }
}

/// A record with the exact stored value it was decoded from, used as the
/// expected value when guarding a later write
#[derive(Debug, Clone)]
pub(crate) struct Versioned<T> {
    pub value: T,
    pub raw: String,
}

/// Storage for terminal records over a [`Backend`]
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn Backend>,
}

impl Storage {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Storage over the in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Storage over Redis
    pub async fn redis(redis_url: &str) -> anyhow::Result<Self> {
        let backend = RedisBackend::new(redis_url).await?;
        Ok(Self::new(Arc::new(backend)))
    }

    pub async fn health_check(&self) -> Result<()> {
        self.backend.ping().await
    }

    pub(crate) async fn next_id(&self, sequence: &str) -> Result<u64> {
        self.backend.next_id(sequence).await
    }

    pub(crate) async fn commit(&self, batch: &WriteBatch) -> Result<bool> {
        self.backend.commit(batch).await
    }

    pub(crate) async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Versioned<T>>> {
        match self.backend.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)?;
                Ok(Some(Versioned { value, raw }))
            }
            None => Ok(None),
        }
    }

    /// Read a record that must exist
    pub(crate) async fn require<T: DeserializeOwned>(
        &self,
        entity: &'static str,
        key: &str,
        id: u64,
    ) -> Result<Versioned<T>> {
        self.read(key)
            .await?
            .ok_or_else(|| Error::not_found(entity, id))
    }

    /// Read an id stored under a lookup key
    pub(crate) async fn read_id(&self, key: &str) -> Result<Option<u64>> {
        match self.backend.get(key).await? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| Error::Other(anyhow::anyhow!("corrupt id under {}: {}", key, raw))),
            None => Ok(None),
        }
    }

    /// Ids in an index, ascending by score
    pub(crate) async fn index_ids(&self, index: &str, after: Option<f64>) -> Result<Vec<(u64, f64)>> {
        let members = self.backend.index_range(index, after).await?;
        Ok(members
            .into_iter()
            .filter_map(|(member, score)| member.parse().ok().map(|id| (id, score)))
            .collect())
    }

    /// Load records by id, skipping ids whose record is gone
    pub(crate) async fn load_many<T: DeserializeOwned>(
        &self,
        ids: &[u64],
        key: fn(u64) -> String,
    ) -> Result<Vec<T>> {
        let keys: Vec<String> = ids.iter().map(|id| key(*id)).collect();
        let values = self.backend.get_many(&keys).await?;

        let mut records = Vec::with_capacity(values.len());
        for raw in values.into_iter().flatten() {
            records.push(serde_json::from_str(&raw)?);
        }
        Ok(records)
    }

    /// Every record listed in `index`
    pub(crate) async fn list<T: DeserializeOwned>(
        &self,
        index: &str,
        key: fn(u64) -> String,
    ) -> Result<Vec<T>> {
        let ids: Vec<u64> = self
            .index_ids(index, None)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        self.load_many(&ids, key).await
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}

/// Error for a guarded write that kept losing races
pub(crate) fn contention(what: &str) -> Error {
    Error::Conflict(format!("{} was modified concurrently, try again", what))
}
