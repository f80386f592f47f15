//! HTTP transport for the team provider.
//!
//! Thin `reqwest` client with bearer auth. Non-success statuses become
//! [`RemoteError::from_status`]; connect, timeout and decode failures become
//! [`RemoteError::transport`]. Retry and circuit breaking live in the gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use seatbroker_core::config::ProviderConfig;
use seatbroker_core::error::{AppError, RemoteError};
use seatbroker_core::traits::provider::{InviteReceipt, RemoteMember, TeamProvider};

/// `reqwest`-backed [`TeamProvider`].
#[derive(Debug, Clone)]
pub struct HttpTeamProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct InviteBody<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RenameBody<'a> {
    name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct InviteResponse {
    #[serde(default)]
    invite_id: Option<String>,
    #[serde(default)]
    member_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<RemoteMember>,
}

impl HttpTeamProvider {
    /// Build the client from provider settings.
    pub fn new(config: &ProviderConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::configuration(format!("Failed to build provider HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Provider returned error status");
        Err(RemoteError::from_status(status.as_u16(), truncate(&body, 200)))
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
impl TeamProvider for HttpTeamProvider {
    async fn send_invite(
        &self,
        token: &str,
        team_id: &str,
        email: &str,
    ) -> Result<InviteReceipt, RemoteError> {
        let response = Self::send(
            self.request(Method::POST, &format!("/teams/{team_id}/invites"), token)
                .json(&InviteBody { email }),
        )
        .await?;
        let body: InviteResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::transport(format!("invalid invite response: {e}")))?;
        Ok(InviteReceipt {
            invite_id: body.invite_id,
            member_id: body.member_id,
        })
    }

    async fn remove_member(
        &self,
        token: &str,
        team_id: &str,
        member_id: &str,
    ) -> Result<(), RemoteError> {
        Self::send(self.request(
            Method::DELETE,
            &format!("/teams/{team_id}/members/{member_id}"),
            token,
        ))
        .await?;
        Ok(())
    }

    async fn list_members(&self, token: &str, team_id: &str) -> Result<Vec<RemoteMember>, RemoteError> {
        let response = Self::send(self.request(
            Method::GET,
            &format!("/teams/{team_id}/members"),
            token,
        ))
        .await?;
        let body: MembersResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::transport(format!("invalid members response: {e}")))?;
        Ok(body.members)
    }

    async fn rename_team(&self, token: &str, team_id: &str, name: &str) -> Result<(), RemoteError> {
        Self::send(
            self.request(Method::PATCH, &format!("/teams/{team_id}"), token)
                .json(&RenameBody { name }),
        )
        .await?;
        Ok(())
    }

    async fn cancel_invite(&self, token: &str, team_id: &str, email: &str) -> Result<(), RemoteError> {
        Self::send(
            self.request(Method::DELETE, &format!("/teams/{team_id}/invites"), token)
                .json(&InviteBody { email }),
        )
        .await?;
        Ok(())
    }
}
