//! Users, credentials and sessions

use chrono::Utc;
use portgate_common::{normalize_email, Error, NewUser, Result, Role, User, UserPatch};
use tracing::{debug, info, warn};

use super::{contention, keys, Storage, Versioned, MAX_ATTEMPTS};
use crate::backend::WriteBatch;
use crate::models::Session;

impl Storage {
    /// Create a user. The email must not be taken.
    pub async fn create_user(&self, draft: NewUser) -> Result<User> {
        let id = self.next_id(keys::USER_SEQ).await?;
        let user = User::create(id, draft, Utc::now())?;

        let email_key = keys::user_email(&user.email);
        let mut batch = WriteBatch::new();
        batch
            .guard(email_key.as_str(), None)
            .put_json(keys::user(id), &user)?
            .put(email_key, id.to_string())
            .index(keys::USERS, id, id as f64);

        if !self.commit(&batch).await? {
            debug!("Email already registered: {}", user.email);
            return Err(Error::Conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }

        info!("Created user {} ({}) as {}", id, user.email, user.role);
        Ok(user)
    }

    pub async fn get_user(&self, id: u64) -> Result<User> {
        Ok(self.require("user", &keys::user(id), id).await?.value)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email)?;
        let Some(id) = self.read_id(&keys::user_email(&email)).await? else {
            return Ok(None);
        };
        Ok(self.read::<User>(&keys::user(id)).await?.map(|user| user.value))
    }

    /// All users, optionally restricted to one role
    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let users: Vec<User> = self.list(keys::USERS, keys::user).await?;
        Ok(users
            .into_iter()
            .filter(|user| role.map_or(true, |role| user.role == role))
            .collect())
    }

    pub async fn update_user(&self, id: u64, patch: UserPatch) -> Result<User> {
        for _ in 0..MAX_ATTEMPTS {
            let current: Versioned<User> = self.require("user", &keys::user(id), id).await?;
            let updated = current.value.apply(patch.clone(), Utc::now())?;

            let mut batch = WriteBatch::new();
            batch
                .guard(keys::user(id), Some(&current.raw))
                .put_json(keys::user(id), &updated)?;

            if self.commit(&batch).await? {
                info!("Updated user {}", id);
                return Ok(updated);
            }
        }
        Err(contention("user"))
    }

    /// Check credentials. Unknown email, wrong password and inactive user
    /// are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = match self.find_user_by_email(email).await {
            Ok(Some(user)) => user,
            Ok(None) | Err(Error::Validation(_)) => {
                debug!("Login for unknown email");
                return Err(Error::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };

        user.authenticate(password).map_err(|err| {
            debug!("Rejected login for user {}", user.id);
            err
        })?;
        Ok(user)
    }

    /// Open a session for an authenticated user
    pub async fn create_session(&self, user: &User, ttl_secs: u64) -> Result<Session> {
        let session = Session {
            token: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user.id,
            name: user.name.clone(),
            role: user.role,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&session)?;
        self.backend()
            .put_expiring(&keys::session(&session.token), &json, ttl_secs)
            .await?;

        info!("Opened session for user {} ({})", user.id, user.role);
        Ok(session)
    }

    /// Resolve a session token. Sessions of users that were since removed,
    /// deactivated or given another role are revoked.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let Some(session) = self.read::<Session>(&keys::session(token)).await? else {
            return Ok(None);
        };
        let session = session.value;

        let user = self.read::<User>(&keys::user(session.user_id)).await?;
        let still_valid = user
            .as_ref()
            .is_some_and(|user| user.value.active && user.value.role == session.role);
        if !still_valid {
            info!("Revoking stale session of user {}", session.user_id);
            self.delete_session(token).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub async fn delete_session(&self, token: &str) -> Result<()> {
        self.backend().delete(&keys::session(token)).await
    }

    /// Make sure an administrator with `email` exists
    pub async fn ensure_admin(&self, email: &str, password: &str, name: &str) -> Result<User> {
        if let Some(user) = self.find_user_by_email(email).await? {
            if user.role != Role::Admin {
                warn!("Bootstrap user {} exists but is not an admin", user.email);
            }
            return Ok(user);
        }

        self.create_user(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            phone: None,
            company: None,
            role: Role::Admin,
        })
        .await
    }
}
