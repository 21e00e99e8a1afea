//! Attachment storage for message images.
//!
//! Files are written under `{data_dir}/uploads/` with server-generated
//! names and served back at `/uploads/{name}`. Client filenames are never
//! trusted for anything but the extension.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Longest extension we will preserve from a client filename.
const MAX_EXT_LEN: usize = 8;

/// Compute the uploads directory path.
pub fn uploads_dir(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("uploads")
}

/// Create the uploads directory if it does not exist yet.
pub fn ensure_uploads_dir(data_dir: &str) -> std::io::Result<PathBuf> {
    let dir = uploads_dir(data_dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write one attachment and return its public URL path (`/uploads/{name}`).
///
/// The stored name is `{unix_millis}_{random}` plus the sanitized extension
/// of the client filename, so collisions and path traversal are off the
/// table regardless of what the client sends.
pub fn store_attachment(
    data_dir: &str,
    client_filename: &str,
    data: &[u8],
) -> Result<String, String> {
    let dir = ensure_uploads_dir(data_dir)
        .map_err(|e| format!("Failed to create uploads directory: {}", e))?;

    let name = generate_name(client_filename);
    let file_path = dir.join(&name);
    std::fs::write(&file_path, data)
        .map_err(|e| format!("Failed to write upload {}: {}", file_path.display(), e))?;

    tracing::debug!("Stored attachment {} ({} bytes)", name, data.len());
    Ok(format!("/uploads/{}", name))
}

fn generate_name(client_filename: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let nonce: u32 = rand::rng().random();

    match sanitized_extension(client_filename) {
        Some(ext) => format!("{}_{:08x}.{}", millis, nonce, ext),
        None => format!("{}_{:08x}", millis, nonce),
    }
}

/// Extract the extension of a client filename, keeping only ASCII
/// alphanumerics. Anything missing, oversized or otherwise odd yields None.
fn sanitized_extension(filename: &str) -> Option<String> {
    let ext = filename.rsplit('.').next()?;
    if ext.is_empty() || ext.len() > MAX_EXT_LEN || ext == filename {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
