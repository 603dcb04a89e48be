//! Identity file persistence for the daemon.
//!
//! The file holds the overlay's [`PersistedIdentity`] as JSON so the
//! node keeps its peer id across restarts:
//!
//! ```json
//! { "id": "12D3KooW...", "priv_key": "<hex>" }
//! ```

use std::path::Path;

use swapmesh_network::PersistedIdentity;

/// Loads the identity at `path`. A missing file is `Ok(None)`.
pub fn load_identity(path: &Path) -> Result<Option<PersistedIdentity>, String> {
    if !path.exists() {
        return Ok(None);
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read identity file: {e}"))?;
    let identity: PersistedIdentity = serde_json::from_str(&text)
        .map_err(|e| format!("invalid identity file: {e}"))?;

    tracing::info!(path = %path.display(), id = %identity.id, "identity loaded");
    Ok(Some(identity))
}

/// Writes the identity to `path` via a temp file and rename.
pub fn save_identity(path: &Path, identity: &PersistedIdentity) -> Result<(), String> {
    let json = serde_json::to_string_pretty(identity)
        .map_err(|e| format!("JSON serialization failed: {e}"))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("failed to create identity directory: {e}"))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| format!("failed to write identity file: {e}"))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        format!("failed to rename identity file: {e}")
    })?;

    tracing::info!(path = %path.display(), "identity saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("swapmesh-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_file_is_none() -> Result<(), String> {
        assert!(load_identity(&temp_path("absent.json"))?.is_none());
        Ok(())
    }

    #[test]
    fn save_then_load() -> Result<(), String> {
        let path = temp_path("identity.json");
        let identity = PersistedIdentity {
            id: "12D3KooWExample".into(),
            priv_key: "08011240".into(),
        };

        save_identity(&path, &identity)?;
        let loaded = load_identity(&path)?;
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, Some(identity));
        Ok(())
    }

    #[test]
    fn garbage_file_rejected() -> Result<(), String> {
        let path = temp_path("garbage.json");
        std::fs::write(&path, "not json").map_err(|e| e.to_string())?;
        let res = load_identity(&path);
        let _ = std::fs::remove_file(&path);

        assert!(res.is_err());
        Ok(())
    }
}
