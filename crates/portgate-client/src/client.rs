//! Client for the Portgate API

use anyhow::{Context, Result};
use portgate_common::{Ticket, UserProfile};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

/// Tickets changed after a cursor, plus the cursor to use next
#[derive(Debug, Clone, Deserialize)]
pub struct TicketChanges {
    pub tickets: Vec<Ticket>,
    pub cursor: u64,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: UserProfile,
}

/// Client for interacting with the Portgate API
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new, signed-out client
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            base_url: api_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }

    /// Sign in and keep the session token for later requests
    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfile> {
        let url = format!("{}/api/auth/login", self.base_url);
        debug!("Signing in to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Login rejected: invalid credentials");
        }
        if !response.status().is_success() {
            anyhow::bail!("Failed to sign in: {}", response.status());
        }

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        self.token = Some(login.token);
        Ok(login.user)
    }

    /// End the current session
    pub async fn logout(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };

        let url = format!("{}/api/auth/logout", self.base_url);
        let response = self.client.post(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to sign out: {}", response.status());
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self
            .token
            .as_deref()
            .context("Not signed in: call login first")?;
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Request to {} failed: {}", path, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// Tickets changed after `since`
    pub async fn ticket_changes(&self, since: u64) -> Result<TicketChanges> {
        self.get_json(&format!("/api/tickets/changes?since={}", since))
            .await
    }

    /// Check if the API is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}
