// src/store_manager.rs
//
// Centralised store manager for client state persistence.
// Holds the durable auth keys (logged-in flag + serialized session) plus
// small bits of UI state like the last selected record.
//
// Data is cached in memory and persisted to disk with debounced writes.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

// ============================================================================
// Types
// ============================================================================

/// The store data structure - a simple key-value store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(flatten)]
    entries: HashMap<String, serde_json::Value>,
}

/// Store manager state
struct StoreManager {
    /// The in-memory store data
    data: StoreData,
    /// Path to the store file
    store_path: Option<PathBuf>,
    /// Whether there are unsaved changes
    dirty: bool,
    /// Last save time (for debouncing)
    last_save: Instant,
}

impl Default for StoreManager {
    fn default() -> Self {
        Self {
            data: StoreData::default(),
            store_path: None,
            dirty: false,
            last_save: Instant::now(),
        }
    }
}

/// Global store manager singleton
static STORE_MANAGER: Lazy<RwLock<StoreManager>> =
    Lazy::new(|| RwLock::new(StoreManager::default()));

/// Channel for triggering debounced saves
static SAVE_CHANNEL: Lazy<mpsc::UnboundedSender<()>> = Lazy::new(|| {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    // Spawn the debounced save task
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        rt.block_on(async {
            let debounce_duration = Duration::from_millis(500);
            let mut pending = false;

            loop {
                tokio::select! {
                    result = rx.recv() => {
                        if result.is_none() {
                            // Channel closed
                            break;
                        }
                        pending = true;
                    }
                    _ = tokio::time::sleep(debounce_duration), if pending => {
                        pending = false;
                        if let Err(e) = save_to_disk_internal() {
                            tlog!("[StoreManager] Failed to save: {}", e);
                        }
                    }
                }
            }
        });
    });

    tx
});

// ============================================================================
// Internal Functions
// ============================================================================

/// Get the store file path for the app
fn get_store_path() -> Result<PathBuf, String> {
    let app_data_dir = dirs::data_dir()
        .ok_or_else(|| "Failed to resolve the platform data dir".to_string())?
        .join("ResumeDesk");

    // Ensure directory exists
    fs::create_dir_all(&app_data_dir)
        .map_err(|e| format!("Failed to create app data dir: {}", e))?;

    Ok(app_data_dir.join("client-state.json"))
}

/// Load store data from disk
fn load_from_disk(path: &PathBuf) -> Result<StoreData, String> {
    if !path.exists() {
        return Ok(StoreData::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read store file: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse store file: {}", e))
}

/// Save store data to disk (atomic write)
fn save_to_disk_internal() -> Result<(), String> {
    let manager = STORE_MANAGER
        .read()
        .map_err(|e| format!("Failed to acquire read lock: {}", e))?;

    let path = match &manager.store_path {
        Some(p) => p.clone(),
        None => return Ok(()), // Not initialised yet
    };

    if !manager.dirty {
        return Ok(()); // Nothing to save
    }

    let json = serde_json::to_string_pretty(&manager.data)
        .map_err(|e| format!("Failed to serialise store: {}", e))?;

    drop(manager); // Release read lock before file operations

    // Atomic write: write to temp file, then rename
    let temp_path = path.with_extension("json.tmp");

    fs::write(&temp_path, &json).map_err(|e| format!("Failed to write temp file: {}", e))?;

    fs::rename(&temp_path, &path).map_err(|e| format!("Failed to rename temp file: {}", e))?;

    // Clear dirty flag
    if let Ok(mut manager) = STORE_MANAGER.write() {
        manager.dirty = false;
        manager.last_save = Instant::now();
    }

    Ok(())
}

/// Schedule a debounced save
fn schedule_save() {
    // Ignore errors (channel might not be ready yet during init)
    let _ = SAVE_CHANNEL.send(());
}

// ============================================================================
// Public API
// ============================================================================

/// Initialise the store manager with the platform data dir.
/// Call this once during app startup.
pub fn initialise() -> Result<(), String> {
    initialise_at(get_store_path()?)
}

/// Initialise the store manager with an explicit store file path.
pub fn initialise_at(path: PathBuf) -> Result<(), String> {
    let mut manager = STORE_MANAGER
        .write()
        .map_err(|e| format!("Failed to acquire write lock: {}", e))?;

    // Load existing data if available
    manager.data = load_from_disk(&path)?;
    manager.store_path = Some(path);
    manager.dirty = false;

    tlog!(
        "[StoreManager] Initialised with {} entries",
        manager.data.entries.len()
    );

    Ok(())
}

/// Get a value from the store
pub fn get(key: &str) -> Option<serde_json::Value> {
    let manager = STORE_MANAGER.read().ok()?;
    manager.data.entries.get(key).cloned()
}

/// Set a value in the store
pub fn set(key: &str, value: serde_json::Value) -> Result<(), String> {
    let mut manager = STORE_MANAGER
        .write()
        .map_err(|e| format!("Failed to acquire write lock: {}", e))?;

    manager.data.entries.insert(key.to_string(), value);
    manager.dirty = true;

    drop(manager); // Release lock before scheduling save

    schedule_save();
    Ok(())
}

/// Delete a value from the store
pub fn delete(key: &str) -> Result<bool, String> {
    let mut manager = STORE_MANAGER
        .write()
        .map_err(|e| format!("Failed to acquire write lock: {}", e))?;

    let existed = manager.data.entries.remove(key).is_some();

    if existed {
        manager.dirty = true;
        drop(manager);
        schedule_save();
    }

    Ok(existed)
}

/// Check if a key exists
#[allow(unused)]
pub fn has(key: &str) -> bool {
    STORE_MANAGER
        .read()
        .map(|m| m.data.entries.contains_key(key))
        .unwrap_or(false)
}

/// Force an immediate save (useful before app shutdown)
pub fn flush() -> Result<(), String> {
    save_to_disk_internal()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// The store is process-wide state; serialise tests that touch it.
    pub(crate) static STORE_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn temp_store_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "resumedesk-store-test-{}-{}.json",
            tag,
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn test_set_get_delete_round_trip() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        initialise_at(temp_store_path("roundtrip")).unwrap();

        set("auth.loggedIn", serde_json::json!("true")).unwrap();
        assert_eq!(get("auth.loggedIn"), Some(serde_json::json!("true")));
        assert!(has("auth.loggedIn"));

        assert!(delete("auth.loggedIn").unwrap());
        assert!(get("auth.loggedIn").is_none());
        assert!(!delete("auth.loggedIn").unwrap());
    }

    #[test]
    fn test_flush_persists_and_reload_restores() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        let path = temp_store_path("reload");
        initialise_at(path.clone()).unwrap();

        set("ui.lastRecord", serde_json::json!(42)).unwrap();
        flush().unwrap();

        // Re-initialise from the same file: the entry must survive
        initialise_at(path.clone()).unwrap();
        assert_eq!(get("ui.lastRecord"), Some(serde_json::json!(42)));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_initialise_with_corrupt_file_fails_cleanly() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        let path = temp_store_path("corrupt");
        std::fs::write(&path, b"not json at all").unwrap();

        assert!(initialise_at(path.clone()).is_err());

        let _ = std::fs::remove_file(path);
    }
}
