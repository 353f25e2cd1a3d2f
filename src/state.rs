use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::models::RoomStatusEvent;
use crate::services::identity::CachedLookup;
use crate::services::storage::ObjectStorage;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub storage: Box<dyn ObjectStorage>,
    /// Short-lived guest-lookup cache keyed by normalized phone number.
    pub lookup_cache: Mutex<HashMap<String, CachedLookup>>,
    pub room_events_tx: broadcast::Sender<RoomStatusEvent>,
}
