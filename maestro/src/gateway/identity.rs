//! Persistent per-installation device identity: an Ed25519 key pair and a
//! stable deviceId (hex SHA-256 of the public key).
//!
//! Created on first use and stored as JSON with owner-only permissions; an
//! existing valid file is reused across all gateway connections (including by
//! concurrent processes). An unreadable or corrupt file is regenerated.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity io: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity key: {0}")]
    Key(String),
}

/// On-disk shape of the identity file.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    device_id: String,
    public_key_base64: String,
    private_key_pem: String,
}

/// Ed25519 device identity backing the signed gateway handshake.
#[derive(Debug)]
pub struct DeviceIdentity {
    device_id: String,
    signing_key: SigningKey,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl DeviceIdentity {
    /// Default file location: `<config home>/maestro/device.json`.
    pub fn default_path() -> PathBuf {
        let base = match std::env::var_os("XDG_CONFIG_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")),
        };
        base.join("maestro").join("device.json")
    }

    /// Loads the identity at `path`, creating (and persisting) a fresh one
    /// when the file is absent or unusable.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            match Self::load(path) {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    warn!("unusable device identity at {}: {}; regenerating", path.display(), e);
                }
            }
        }
        let identity = Self::generate();
        identity.save(path)?;
        Ok(identity)
    }

    /// Fresh identity that is never persisted. Used by tests.
    pub fn ephemeral() -> Self {
        Self::generate()
    }

    fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let device_id = hex(&Sha256::digest(signing_key.verifying_key().as_bytes()));
        Self {
            device_id,
            signing_key,
        }
    }

    fn load(path: &Path) -> Result<Self, IdentityError> {
        let content = std::fs::read_to_string(path)?;
        let file: IdentityFile =
            serde_json::from_str(&content).map_err(|e| IdentityError::Key(e.to_string()))?;
        let signing_key = SigningKey::from_pkcs8_pem(&file.private_key_pem)
            .map_err(|e| IdentityError::Key(e.to_string()))?;
        let device_id = hex(&Sha256::digest(signing_key.verifying_key().as_bytes()));
        if device_id != file.device_id {
            return Err(IdentityError::Key(
                "deviceId does not match stored key".to_string(),
            ));
        }
        Ok(Self {
            device_id,
            signing_key,
        })
    }

    fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| IdentityError::Key(e.to_string()))?;
        let file = IdentityFile {
            device_id: self.device_id.clone(),
            public_key_base64: STANDARD.encode(self.signing_key.verifying_key().as_bytes()),
            private_key_pem: pem.to_string(),
        };
        let content =
            serde_json::to_string_pretty(&file).map_err(|e| IdentityError::Key(e.to_string()))?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Hex SHA-256 of the public key; stable across connections.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Public key as base64url without padding, the wire encoding.
    pub fn public_key_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Signs `message` and returns the signature base64url-encoded.
    pub fn sign_base64url(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    }
}
