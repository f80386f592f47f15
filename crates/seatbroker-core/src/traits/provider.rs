//! Remote team-management primitives.
//!
//! The engine needs exactly three calls from the provider; the remaining
//! two are optional and default to "unsupported".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// A member (or pending invite) listed on a remote team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMember {
    /// Member mailbox.
    pub email: String,
    /// Provider-side member identifier.
    pub member_id: String,
}

/// Receipt returned by a successful invite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteReceipt {
    /// Provider-side invite request identifier, if one is issued.
    pub invite_id: Option<String>,
    /// Member identifier, when the provider adds the member directly.
    pub member_id: Option<String>,
}

/// Outbound calls against an external team account.
#[async_trait]
pub trait TeamProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Invite `email` to `team_id` using the mother's access `token`.
    async fn send_invite(
        &self,
        token: &str,
        team_id: &str,
        email: &str,
    ) -> Result<InviteReceipt, RemoteError>;

    /// Remove a member from the team.
    async fn remove_member(
        &self,
        token: &str,
        team_id: &str,
        member_id: &str,
    ) -> Result<(), RemoteError>;

    /// List members of the team.
    async fn list_members(&self, token: &str, team_id: &str)
    -> Result<Vec<RemoteMember>, RemoteError>;

    /// Rename the team.
    async fn rename_team(&self, _token: &str, _team_id: &str, _name: &str) -> Result<(), RemoteError> {
        Err(RemoteError::unsupported("rename_team"))
    }

    /// Withdraw a pending invite.
    async fn cancel_invite(
        &self,
        _token: &str,
        _team_id: &str,
        _email: &str,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::unsupported("cancel_invite"))
    }
}
