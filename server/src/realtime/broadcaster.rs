use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sea_orm::DatabaseConnection;
use tokio::sync::broadcast;

use crate::model::activity::ActivityCtrl;

use super::AgentEvent;

const ROOM_CAPACITY: usize = 256;

/// Per-user event rooms. Emissions fan out to connected sockets and are
/// mirrored into the activity log so late joiners can reconstruct state.
#[derive(Clone)]
pub struct Broadcaster {
    rooms: Arc<RwLock<HashMap<i32, broadcast::Sender<String>>>>,
    conn: DatabaseConnection,
}

impl Broadcaster {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            conn,
        }
    }

    /// Joins the user's room, creating it on first subscribe. Lagged
    /// receivers drop the oldest events.
    pub fn subscribe(&self, user_id: i32) -> broadcast::Receiver<String> {
        let mut rooms = self.rooms.write().unwrap();
        rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    pub fn connected_users(&self) -> Vec<i32> {
        self.rooms
            .read()
            .unwrap()
            .iter()
            .filter(|(_, tx)| tx.receiver_count() > 0)
            .map(|(user_id, _)| *user_id)
            .collect()
    }

    pub async fn emit(&self, user_id: i32, event: AgentEvent) {
        if let Ok(serialized) = serde_json::to_string(&event) {
            if let Some(tx) = self.rooms.read().unwrap().get(&user_id) {
                // A send error only means nobody is listening right now.
                let _ = tx.send(serialized);
            }
        }

        if let Err(e) = ActivityCtrl::insert(
            &self.conn,
            user_id,
            event.kind(),
            event.stage(),
            event.activity_status(),
            event.payload(),
        )
        .await
        {
            tracing::error!("Failed to mirror event to activity log: {:?}", e);
        }
    }

    /// Fan-out without the activity mirror, for high-frequency status pushes.
    pub fn emit_transient(&self, user_id: i32, event: &AgentEvent) {
        if let Ok(serialized) = serde_json::to_string(event) {
            if let Some(tx) = self.rooms.read().unwrap().get(&user_id) {
                let _ = tx.send(serialized);
            }
        }
    }
}
