pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared handle to the single SQLite connection. rusqlite is synchronous,
/// so handlers take the lock inside `tokio::task::spawn_blocking` and keep
/// the async workers free.
pub type DbPool = Arc<Mutex<Connection>>;

/// Open (or create) `{data_dir}/chat.db` and bring the schema up to date.
/// WAL keeps readers unblocked during writes; foreign keys are enforced so
/// participant and message rows follow their chat on delete.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = Path::new(data_dir).join("chat.db");

    let mut conn = Connection::open(&db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!("Database ready at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}
