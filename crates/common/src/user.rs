//! Users, roles and password hashing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use constant_time_eq::constant_time_eq;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored user record, including the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as exposed over the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub role: Role,
    pub active: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            company: user.company.clone(),
            role: user.role,
            active: user.active,
        }
    }
}

/// Fields required to create a user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub role: Role,
}

/// Partial update of a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub password: Option<String>,
}

pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::validation("a valid email is required"));
    }
    Ok(email)
}

/// PBKDF2 rounds for new hashes. Stored hashes carry their own count.
pub const PASSWORD_ROUNDS: u32 = 100_000;

const HASH_SCHEME: &str = "pbkdf2-sha256";

/// Hash a password as `pbkdf2-sha256$rounds$salt$hex(key)`
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(Error::validation("password is required"));
    }
    let salt = uuid::Uuid::new_v4().simple().to_string();
    Ok(format!(
        "{}${}${}${}",
        HASH_SCHEME,
        PASSWORD_ROUNDS,
        salt,
        derive_key(password, &salt, PASSWORD_ROUNDS)
    ))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(4, '$');
    let (Some(HASH_SCHEME), Some(rounds), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    if rounds == 0 {
        return false;
    }

    let actual = derive_key(password, salt, rounds);
    constant_time_eq(actual.as_bytes(), expected.as_bytes())
}

fn derive_key(password: &str, salt: &str, rounds: u32) -> String {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), rounds, &mut key);
    hex::encode(key)
}

impl User {
    pub fn create(id: u64, draft: NewUser, now: DateTime<Utc>) -> Result<Self> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(Error::validation("name is required"));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            email: normalize_email(&draft.email)?,
            password_hash: hash_password(&draft.password)?,
            phone: draft.phone,
            company: draft.company,
            role: draft.role,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&self, patch: UserPatch, now: DateTime<Utc>) -> Result<User> {
        let mut updated = self.clone();
        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::validation("name is required"));
            }
            updated.name = name.to_string();
        }
        if patch.phone.is_some() {
            updated.phone = patch.phone;
        }
        if patch.company.is_some() {
            updated.company = patch.company;
        }
        if let Some(role) = patch.role {
            updated.role = role;
        }
        if let Some(active) = patch.active {
            updated.active = active;
        }
        if let Some(password) = patch.password {
            updated.password_hash = hash_password(&password)?;
        }
        updated.updated_at = now;
        Ok(updated)
    }

    /// Credential check used by login: inactive users never authenticate
    pub fn authenticate(&self, password: &str) -> Result<()> {
        if self.active && verify_password(password, &self.password_hash) {
            Ok(())
        } else {
            Err(Error::InvalidCredentials)
        }
    }
}
