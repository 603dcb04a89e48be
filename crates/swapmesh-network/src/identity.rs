//! Overlay node identity.
//!
//! A node's libp2p keypair can be exported as a [`PersistedIdentity`]
//! (JSON-serializable) and handed back on the next start so the node
//! keeps its `PeerId` across restarts.
//!
//! ```json
//! { "id": "12D3KooW…", "priv_key": "<hex of protobuf-encoded keypair>" }
//! ```
//!
//! Restoring is lenient: a record that fails to decode, or whose
//! `id` does not match the decoded key, is logged and replaced by a
//! freshly generated identity rather than failing the start.

use libp2p::identity;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};

use swapmesh_types::{Result, SwapMeshError};

/// Serialized libp2p identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    /// Base58 `PeerId` derived from the key.
    pub id: String,
    /// Hex of the protobuf-encoded private keypair.
    pub priv_key: String,
}

impl std::fmt::Debug for PersistedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedIdentity")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Exports a keypair into its persisted form.
///
/// # Errors
///
/// Returns `CryptoError` if libp2p cannot encode the key type.
pub fn export_identity(keypair: &identity::Keypair) -> Result<PersistedIdentity> {
    let encoded = keypair
        .to_protobuf_encoding()
        .map_err(|e| SwapMeshError::CryptoError {
            reason: format!("failed to encode libp2p keypair: {e}"),
        })?;

    Ok(PersistedIdentity {
        id: PeerId::from(keypair.public()).to_base58(),
        priv_key: hex::encode(encoded),
    })
}

/// Restores a keypair from its persisted form.
///
/// # Errors
///
/// Returns `CryptoError` if the key is not valid hex or protobuf, or if
/// the stored `id` does not belong to the key.
pub fn restore_identity(persisted: &PersistedIdentity) -> Result<identity::Keypair> {
    let bytes = hex::decode(&persisted.priv_key).map_err(|e| SwapMeshError::CryptoError {
        reason: format!("persisted identity key is not valid hex: {e}"),
    })?;

    let keypair =
        identity::Keypair::from_protobuf_encoding(&bytes).map_err(|e| SwapMeshError::CryptoError {
            reason: format!("failed to decode persisted libp2p keypair: {e}"),
        })?;

    let derived = PeerId::from(keypair.public()).to_base58();
    if derived != persisted.id {
        return Err(SwapMeshError::CryptoError {
            reason: format!(
                "persisted identity id {} does not match its key ({derived})",
                persisted.id
            ),
        });
    }

    Ok(keypair)
}

/// Restores `persisted` when present and valid, otherwise generates a
/// new Ed25519 identity.
pub fn load_or_generate(persisted: Option<&PersistedIdentity>) -> identity::Keypair {
    match persisted.map(restore_identity) {
        Some(Ok(keypair)) => {
            tracing::debug!(peer_id = %PeerId::from(keypair.public()), "restored persisted identity");
            keypair
        }
        Some(Err(e)) => {
            tracing::warn!(%e, "persisted identity unusable, generating a new one");
            identity::Keypair::generate_ed25519()
        }
        None => identity::Keypair::generate_ed25519(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_then_restore_keeps_peer_id() -> std::result::Result<(), SwapMeshError> {
        let keypair = identity::Keypair::generate_ed25519();
        let persisted = export_identity(&keypair)?;
        assert_eq!(persisted.id, PeerId::from(keypair.public()).to_base58());

        let restored = restore_identity(&persisted)?;
        assert_eq!(PeerId::from(restored.public()), PeerId::from(keypair.public()));
        Ok(())
    }

    #[test]
    fn mismatched_id_rejected() -> std::result::Result<(), SwapMeshError> {
        let mut persisted = export_identity(&identity::Keypair::generate_ed25519())?;
        persisted.id = PeerId::random().to_base58();
        assert!(restore_identity(&persisted).is_err());
        Ok(())
    }

    #[test]
    fn garbage_falls_back_to_fresh_identity() {
        let persisted = PersistedIdentity {
            id: "nope".into(),
            priv_key: "zz".into(),
        };
        let keypair = load_or_generate(Some(&persisted));
        assert_ne!(PeerId::from(keypair.public()).to_base58(), "nope");
    }

    #[test]
    fn persisted_form_is_json() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let keypair = identity::Keypair::generate_ed25519();
        let persisted = export_identity(&keypair)?;
        let json = serde_json::to_string(&persisted)?;
        assert!(json.contains("\"priv_key\""));

        let parsed: PersistedIdentity = serde_json::from_str(&json)?;
        let restored = load_or_generate(Some(&parsed));
        assert_eq!(PeerId::from(restored.public()), PeerId::from(keypair.public()));
        Ok(())
    }

    #[test]
    fn debug_hides_private_key() -> std::result::Result<(), SwapMeshError> {
        let persisted = export_identity(&identity::Keypair::generate_ed25519())?;
        assert!(!format!("{persisted:?}").contains(&persisted.priv_key));
        Ok(())
    }
}
