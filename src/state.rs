use crate::db::DbPool;
use crate::ws::FanoutHub;

/// Application state cloned into every handler through the axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite handle
    pub db: DbPool,
    /// 256-bit HS256 signing key
    pub jwt_secret: Vec<u8>,
    /// Fan-out hub: live WebSocket connections grouped by chat
    pub hub: FanoutHub,
    /// Data directory (DB, JWT key, uploads)
    pub data_dir: String,
    /// Access token lifetime in minutes
    pub access_token_expire_minutes: u64,
    /// Maximum multipart upload size in megabytes
    pub max_upload_size_mb: u32,
}
