use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ssh_key::{Algorithm, LineEnding, PrivateKey};
use tempfile::TempDir;
use tracing::warn;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::session::resolver::ResolvedInstance;
use crate::{Result, TunnelError};

/// Pushes a public key for short-lived authorization on an instance.
/// The server side owns the expiry window (60 seconds for EC2 Instance
/// Connect); rejection is fatal for the session and never retried.
#[async_trait]
pub trait KeyAuthorizer: Send + Sync {
    async fn authorize(
        &self,
        instance: &ResolvedInstance,
        user: &str,
        public_key: &str,
    ) -> Result<()>;
}

/// Creates fresh key pairs; injected so tests can count generations
pub trait KeyFactory: Send + Sync {
    fn generate(&self) -> Result<EphemeralKeyPair>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Generated,
    Authorized,
    Destroyed,
}

/// A single-session SSH key pair.
///
/// The public half is held in memory as an OpenSSH authorized-key line; the
/// private half exists only as a 0600 file inside an owned scratch directory,
/// consumed by the spawned ssh process. `destroy` must run on every exit path
/// of the session that generated it; `Drop` is the backstop for panics and
/// cancellation.
pub struct EphemeralKeyPair {
    public_key: String,
    private_key_path: PathBuf,
    scratch: Option<TempDir>,
    state: KeyState,
}

impl EphemeralKeyPair {
    /// Generate a fresh Ed25519 key pair and write the private half to a
    /// scratch file with owner-only permissions
    pub fn generate() -> Result<Self> {
        let mut key = PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
            .map_err(TunnelError::key)?;
        key.set_comment(format!("aws-ssh-tunnel-{}", std::process::id()));

        let public_key = key.public_key().to_openssh().map_err(TunnelError::key)?;
        let private_pem = key.to_openssh(LineEnding::LF).map_err(TunnelError::key)?;

        let scratch = TempDir::new()?;
        let private_key_path = scratch.path().join("id_ed25519");

        Self::write_private_key(&private_key_path, private_pem.as_bytes())?;

        Ok(Self {
            public_key,
            private_key_path,
            scratch: Some(scratch),
            state: KeyState::Generated,
        })
    }

    fn write_private_key(path: &Path, contents: &[u8]) -> Result<()> {
        #[cfg(unix)]
        {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)?;
            file.write_all(contents)?;
        }

        #[cfg(not(unix))]
        {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)?;
            file.write_all(contents)?;
        }

        Ok(())
    }

    /// OpenSSH authorized-key line for the public half
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Path to the private key file, for the spawned ssh process
    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    /// Record that the public half was accepted by the authorization service
    pub fn mark_authorized(&mut self) {
        if self.state == KeyState::Generated {
            self.state = KeyState::Authorized;
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == KeyState::Destroyed
    }

    /// Erase the private key material and remove the scratch directory.
    /// Idempotent and terminal; failures are logged, never raised, so a
    /// cleanup problem cannot mask the session's primary outcome.
    pub fn destroy(&mut self) {
        if self.state == KeyState::Destroyed {
            return;
        }
        self.state = KeyState::Destroyed;

        // Overwrite before unlinking so the key bytes don't linger on disk
        if let Ok(meta) = std::fs::metadata(&self.private_key_path) {
            let zeros = vec![0u8; meta.len() as usize];
            if let Err(e) = std::fs::write(&self.private_key_path, zeros) {
                warn!(path = %self.private_key_path.display(), error = %e, "failed to overwrite private key");
            }
        }

        if let Some(scratch) = self.scratch.take() {
            if let Err(e) = scratch.close() {
                warn!(error = %e, "failed to remove key scratch directory");
            }
        }
    }
}

impl Drop for EphemeralKeyPair {
    fn drop(&mut self) {
        if self.state != KeyState::Destroyed {
            warn!("ephemeral key dropped without explicit destroy");
            self.destroy();
        }
    }
}

/// Default factory producing Ed25519 key pairs
pub struct Ed25519KeyFactory;

impl KeyFactory for Ed25519KeyFactory {
    fn generate(&self) -> Result<EphemeralKeyPair> {
        EphemeralKeyPair::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_writes_private_key_file() {
        let key = EphemeralKeyPair::generate().unwrap();
        assert!(key.private_key_path().exists());
        assert!(key.public_key().starts_with("ssh-ed25519 "));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let key = EphemeralKeyPair::generate().unwrap();
        let mode = std::fs::metadata(key.private_key_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_destroy_removes_scratch() {
        let mut key = EphemeralKeyPair::generate().unwrap();
        let path = key.private_key_path().to_path_buf();
        key.destroy();
        assert!(key.is_destroyed());
        assert!(!path.exists());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut key = EphemeralKeyPair::generate().unwrap();
        key.destroy();
        key.destroy();
        assert!(key.is_destroyed());
    }

    #[test]
    fn test_drop_removes_scratch() {
        let path = {
            let key = EphemeralKeyPair::generate().unwrap();
            key.private_key_path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_keys_are_unique() {
        let a = EphemeralKeyPair::generate().unwrap();
        let b = EphemeralKeyPair::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }
}
