use crate::error::{OdioError, Result};
use crate::types::EntityKey;
use tokio::sync::broadcast;

/// Receiver for refresh notifications
///
/// Yields the key of every entity whose synthesized state changed in a
/// cycle. Read the new state through [`crate::Entity::state`]; by the time
/// the notification arrives, the full snapshot is already published.
pub struct UpdateReceiver {
    rx: broadcast::Receiver<EntityKey>,
}

impl UpdateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<EntityKey>) -> Self {
        Self { rx }
    }

    /// Receive the next changed entity key
    pub async fn recv(&mut self) -> Result<EntityKey> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => OdioError::Shutdown,
            broadcast::error::RecvError::Lagged(n) => {
                OdioError::ChannelError(format!("Lagged by {} updates", n))
            }
        })
    }

    /// Try to receive a changed entity key without blocking
    ///
    /// Returns `Ok(None)` if no notification is pending.
    pub fn try_recv(&mut self) -> Result<Option<EntityKey>> {
        match self.rx.try_recv() {
            Ok(key) => Ok(Some(key)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(OdioError::Shutdown),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(OdioError::ChannelError(format!("Lagged by {} updates", n)))
            }
        }
    }
}
