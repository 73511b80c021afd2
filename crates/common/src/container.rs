//! Containers and the vessels carrying them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vessel (ship) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub id: u64,
    pub name: String,
    pub shipping_line: String,
}

/// Container record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: u64,

    /// Scan key, stored normalized (upper-case, trimmed)
    pub code: String,

    /// Optional ISO container number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    /// Free-form dimensions, e.g. `20x8x8.6`
    pub dimensions: String,

    /// Container type, e.g. `dry`, `reefer`
    pub kind: String,

    pub weight_kg: f64,

    pub vessel_id: u64,

    /// Pickup appointment attached by a booking
    pub appointment_id: Option<u64>,

    /// Client owning the container
    pub owner_id: Option<u64>,

    pub created_at: DateTime<Utc>,
}

/// Fields required to register a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContainer {
    pub code: String,
    #[serde(default)]
    pub number: Option<String>,
    pub dimensions: String,
    pub kind: String,
    pub weight_kg: f64,
    pub vessel_id: u64,
    #[serde(default)]
    pub owner_id: Option<u64>,
}

/// Partial update; the code is immutable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vessel_id: Option<u64>,
}

/// Normalize a scanned code for exact, case-insensitive matching
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::validation("container code is required"));
    }
    Ok(code.to_ascii_uppercase())
}

fn check_weight(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        return Err(Error::validation("weight_kg must be a positive number"));
    }
    Ok(())
}

impl Container {
    pub fn register(id: u64, draft: NewContainer, now: DateTime<Utc>) -> Result<Self> {
        let code = normalize_code(&draft.code)?;
        if draft.dimensions.trim().is_empty() || draft.kind.trim().is_empty() {
            return Err(Error::validation("dimensions and kind are required"));
        }
        check_weight(draft.weight_kg)?;

        Ok(Self {
            id,
            code,
            number: draft.number.filter(|n| !n.trim().is_empty()),
            dimensions: draft.dimensions.trim().to_string(),
            kind: draft.kind.trim().to_string(),
            weight_kg: draft.weight_kg,
            vessel_id: draft.vessel_id,
            appointment_id: None,
            owner_id: draft.owner_id,
            created_at: now,
        })
    }

    pub fn apply(&self, patch: ContainerPatch) -> Result<Container> {
        let mut updated = self.clone();
        if let Some(dimensions) = patch.dimensions {
            updated.dimensions = dimensions.trim().to_string();
        }
        if let Some(kind) = patch.kind {
            updated.kind = kind.trim().to_string();
        }
        if let Some(weight_kg) = patch.weight_kg {
            check_weight(weight_kg)?;
            updated.weight_kg = weight_kg;
        }
        if let Some(vessel_id) = patch.vessel_id {
            updated.vessel_id = vessel_id;
        }
        if updated.dimensions.is_empty() || updated.kind.is_empty() {
            return Err(Error::validation("dimensions and kind are required"));
        }
        Ok(updated)
    }

    /// Attach a booked appointment and the vessel chosen with it
    pub fn attach_appointment(&self, appointment_id: u64, vessel_id: u64) -> Container {
        Container {
            appointment_id: Some(appointment_id),
            vessel_id,
            ..self.clone()
        }
    }

    pub fn is_owned_by(&self, user_id: u64) -> bool {
        self.owner_id == Some(user_id)
    }
}
