use super::broadcast::Outbox;
use super::protocol::ServerEvent;
use super::room::{guest_identity, ConnectionId};
use crate::auth::AuthenticatedUser;
use crate::error::Result;

/// One live realtime link, owned by its gateway task.
pub struct Connection {
    pub id: ConnectionId,
    pub user: AuthenticatedUser,
    pub outbox: Outbox,
}

impl Connection {
    pub fn new(id: ConnectionId, user: AuthenticatedUser, outbox: Outbox) -> Self {
        Self { id, user, outbox }
    }

    /// Authenticated user id, or the guest identity derived from the connection id.
    pub fn identity(&self) -> String {
        self.user
            .user_id
            .clone()
            .unwrap_or_else(|| guest_identity(&self.id))
    }

    /// Sends an event to this connection only.
    pub fn send(&self, event: &ServerEvent) -> Result<()> {
        let message = event.to_message()?;
        if self.outbox.send(message).is_err() {
            tracing::debug!(connection_id = %self.id, "Outbox closed, dropping direct event");
        }
        Ok(())
    }
}
