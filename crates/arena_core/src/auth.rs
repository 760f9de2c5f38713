//! Authorization contract consumed by the server host.
//!
//! Authorization is the one place the server waits on I/O before a player
//! exists, so [`Authorizer`] is async. The host resolves it on the runtime
//! and resumes on the tick thread through the executor.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PeerId, PlayerId};

/// Outcome of an authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accept { player_id: PlayerId, name: String },
    /// Rejects the peer with an application-defined reason code, forwarded
    /// verbatim to the client.
    Reject { reason: u16 },
}

impl AuthDecision {
    pub fn into_result(self) -> Result<(PlayerId, String), AuthorizationRejected> {
        match self {
            AuthDecision::Accept { player_id, name } => Ok((player_id, name)),
            AuthDecision::Reject { reason } => Err(AuthorizationRejected { reason }),
        }
    }
}

/// A peer failed authorization. The connection is closed after the client
/// has been told why.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Authorization rejected with reason {reason}")]
pub struct AuthorizationRejected {
    pub reason: u16,
}

/// Decides whether a peer may become a player.
///
/// # Arguments
///
/// * `peer` - Transport identity of the connection asking to authorize
/// * `credentials` - Opaque credential bytes from the `Authorize` message
///
/// # Returns
///
/// The player identity to assign, or a rejection reason.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, peer: PeerId, credentials: Vec<u8>) -> AuthDecision;
}

/// Accepts everyone. Credentials are read as a UTF-8 display name; an empty
/// name becomes `guest-<peer>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthorizer;

#[async_trait]
impl Authorizer for AnonymousAuthorizer {
    async fn authorize(&self, peer: PeerId, credentials: Vec<u8>) -> AuthDecision {
        let name = String::from_utf8_lossy(&credentials).trim().to_string();
        let name = if name.is_empty() {
            format!("guest-{}", peer.0)
        } else {
            name
        };
        AuthDecision::Accept {
            player_id: PlayerId::new(),
            name,
        }
    }
}
