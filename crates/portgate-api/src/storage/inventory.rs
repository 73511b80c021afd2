//! Vessels, zones, slots and containers

use chrono::Utc;
use portgate_common::{
    normalize_code, selectable_slots, Container, ContainerPatch, Error, NewContainer, Result,
    Slot, SlotState, Vessel, Zone,
};
use tracing::{debug, info};

use super::{contention, keys, Storage, Versioned, MAX_ATTEMPTS};
use crate::backend::WriteBatch;
use crate::models::{NewSlot, NewVessel, NewZone};

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

impl Storage {
    pub async fn create_vessel(&self, draft: NewVessel) -> Result<Vessel> {
        let name = required(&draft.name, "name")?;
        let shipping_line = required(&draft.shipping_line, "shipping_line")?;

        let id = self.next_id(keys::VESSEL_SEQ).await?;
        let vessel = Vessel {
            id,
            name,
            shipping_line,
        };

        let mut batch = WriteBatch::new();
        batch
            .put_json(keys::vessel(id), &vessel)?
            .index(keys::VESSELS, id, id as f64);
        self.commit(&batch).await?;

        info!("Created vessel {} ({})", id, vessel.name);
        Ok(vessel)
    }

    pub async fn get_vessel(&self, id: u64) -> Result<Vessel> {
        Ok(self.require("vessel", &keys::vessel(id), id).await?.value)
    }

    pub async fn list_vessels(&self) -> Result<Vec<Vessel>> {
        self.list(keys::VESSELS, keys::vessel).await
    }

    pub async fn create_zone(&self, draft: NewZone) -> Result<Zone> {
        let name = required(&draft.name, "name")?;

        let id = self.next_id(keys::ZONE_SEQ).await?;
        let zone = Zone {
            id,
            name,
            capacity: draft.capacity,
        };

        let mut batch = WriteBatch::new();
        batch
            .put_json(keys::zone(id), &zone)?
            .index(keys::ZONES, id, id as f64);
        self.commit(&batch).await?;

        info!("Created zone {} ({})", id, zone.name);
        Ok(zone)
    }

    pub async fn get_zone(&self, id: u64) -> Result<Zone> {
        Ok(self.require("zone", &keys::zone(id), id).await?.value)
    }

    pub async fn list_zones(&self) -> Result<Vec<Zone>> {
        self.list(keys::ZONES, keys::zone).await
    }

    /// Add a slot to a zone. Labels are unique within the zone.
    pub async fn create_slot(&self, zone_id: u64, draft: NewSlot) -> Result<Slot> {
        self.get_zone(zone_id).await?;

        let id = self.next_id(keys::SLOT_SEQ).await?;
        let slot = Slot::new(
            id,
            zone_id,
            &draft.label,
            (draft.row, draft.column, draft.level),
            Utc::now(),
        )?;

        let label_key = keys::slot_label(zone_id, &slot.label_key());
        let mut batch = WriteBatch::new();
        batch
            .guard(label_key.as_str(), None)
            .put_json(keys::slot(id), &slot)?
            .put(label_key, id.to_string())
            .index(keys::SLOTS, id, id as f64)
            .index(keys::zone_slots(zone_id), id, id as f64);

        if !self.commit(&batch).await? {
            return Err(Error::Conflict(format!(
                "slot {} already exists in zone {}",
                slot.label, zone_id
            )));
        }

        info!("Created slot {} ({}) in zone {}", id, slot.label, zone_id);
        Ok(slot)
    }

    pub async fn get_slot(&self, id: u64) -> Result<Slot> {
        Ok(self.require("slot", &keys::slot(id), id).await?.value)
    }

    /// Every slot of a zone with its state
    pub async fn list_zone_slots(&self, zone_id: u64) -> Result<Vec<Slot>> {
        self.get_zone(zone_id).await?;

        let mut slots: Vec<Slot> = self.list(&keys::zone_slots(zone_id), keys::slot).await?;
        slots.sort_by_key(|slot| (slot.row, slot.column, slot.level, slot.id));
        Ok(slots)
    }

    /// Slots of a zone an operator can allocate
    pub async fn available_slots(&self, zone_id: u64) -> Result<Vec<Slot>> {
        let slots = self.list_zone_slots(zone_id).await?;
        let available = selectable_slots(slots, zone_id);
        debug!("Zone {} has {} available slots", zone_id, available.len());
        Ok(available)
    }

    pub async fn list_slots(&self) -> Result<Vec<Slot>> {
        self.list(keys::SLOTS, keys::slot).await
    }

    /// Administrative state change (empty, reserved, maintenance)
    pub async fn set_slot_state(&self, id: u64, state: SlotState) -> Result<Slot> {
        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<Slot> = self.require("slot", &keys::slot(id), id).await?;
            let updated = current.value.set_state(state, Utc::now())?;

            let mut batch = WriteBatch::new();
            batch
                .guard(keys::slot(id), Some(&current.raw))
                .put_json(keys::slot(id), &updated)?;

            if self.commit(&batch).await? {
                info!("Slot {} is now {}", id, state);
                return Ok(updated);
            }
        }
        Err(contention("slot"))
    }

    /// Register a container. Codes are unique after normalization.
    pub async fn register_container(&self, draft: NewContainer) -> Result<Container> {
        self.get_vessel(draft.vessel_id).await?;
        if let Some(owner_id) = draft.owner_id {
            self.get_user(owner_id).await?;
        }

        let id = self.next_id(keys::CONTAINER_SEQ).await?;
        let container = Container::register(id, draft, Utc::now())?;

        let code_key = keys::container_code(&container.code);
        let mut batch = WriteBatch::new();
        batch
            .guard(code_key.as_str(), None)
            .put_json(keys::container(id), &container)?
            .put(code_key, id.to_string())
            .index(keys::CONTAINERS, id, id as f64);

        if !self.commit(&batch).await? {
            debug!("Container code already registered: {}", container.code);
            return Err(Error::Conflict(format!(
                "container {} is already registered",
                container.code
            )));
        }

        info!("Registered container {} ({})", id, container.code);
        Ok(container)
    }

    pub async fn get_container(&self, id: u64) -> Result<Container> {
        Ok(self
            .require("container", &keys::container(id), id)
            .await?
            .value)
    }

    /// Look up a container by its scan code, case-insensitively
    pub async fn find_container_by_code(&self, code: &str) -> Result<Option<Container>> {
        let code = normalize_code(code)?;
        let Some(id) = self.read_id(&keys::container_code(&code)).await? else {
            return Ok(None);
        };
        Ok(self
            .read::<Container>(&keys::container(id))
            .await?
            .map(|container| container.value))
    }

    /// All containers, or those owned by `owner_id`
    pub async fn list_containers(&self, owner_id: Option<u64>) -> Result<Vec<Container>> {
        let containers: Vec<Container> = self.list(keys::CONTAINERS, keys::container).await?;
        Ok(containers
            .into_iter()
            .filter(|container| owner_id.map_or(true, |owner| container.is_owned_by(owner)))
            .collect())
    }

    pub async fn update_container(&self, id: u64, patch: ContainerPatch) -> Result<Container> {
        if let Some(vessel_id) = patch.vessel_id {
            self.get_vessel(vessel_id).await?;
        }

        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<Container> = self
                .require("container", &keys::container(id), id)
                .await?;
            let updated = current.value.apply(patch.clone())?;

            let mut batch = WriteBatch::new();
            batch
                .guard(keys::container(id), Some(&current.raw))
                .put_json(keys::container(id), &updated)?;

            if self.commit(&batch).await? {
                info!("Updated container {} ({})", id, updated.code);
                return Ok(updated);
            }
        }
        Err(contention("container"))
    }
}
