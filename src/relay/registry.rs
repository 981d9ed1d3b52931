use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Registry of which user owns which live connection.
///
/// Owned by [`super::RelayState`], constructed at server start and torn
/// down with it. A fresh join for a user overwrites the previous mapping
/// without closing the old socket (last connection wins). The user id is
/// client-supplied and trusted.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: RwLock<HashMap<String, Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `user_id` as owned by `connection_id`. Idempotent.
    pub async fn join(&self, connection_id: Uuid, user_id: &str) {
        let mut users = self.users.write().await;
        users.insert(user_id.to_string(), connection_id);
        debug!("User {} joined with connection {}", user_id, connection_id);
    }

    /// Drop the registration held by `connection_id`, if any. A stale
    /// connection that was already overwritten by a newer join for the
    /// same user leaves the newer mapping untouched.
    pub async fn leave(&self, connection_id: Uuid) {
        let mut users = self.users.write().await;
        users.retain(|user_id, conn| {
            let keep = *conn != connection_id;
            if !keep {
                debug!("User {} disconnected", user_id);
            }
            keep
        });
    }

    pub async fn connection_for(&self, user_id: &str) -> Option<Uuid> {
        self.users.read().await.get(user_id).copied()
    }

    pub async fn online_count(&self) -> usize {
        self.users.read().await.len()
    }
}
