//! Durable username to password-hash storage

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::AuthError;
use crate::password::PasswordHasher;

/// Password verified against when the requested user does not exist, so a
/// lookup miss costs the same as a wrong password.
const TIMING_DUMMY_PASSWORD: &str = "routegate-timing-equalizer";

/// Username to password-hash mapping backed by a single JSON file
///
/// Every mutation rewrites the whole file before returning. If the write
/// fails the in-memory change is undone, so the mapping held here always
/// equals the last state successfully persisted.
pub struct CredentialStore {
    path: PathBuf,
    hasher: PasswordHasher,
    credentials: BTreeMap<String, String>,
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("users", &self.credentials.len())
            .finish()
    }
}

impl CredentialStore {
    /// Open the store at `path`, loading any existing credentials
    ///
    /// A missing file yields an empty store. A file that exists but cannot
    /// be parsed is an error; it is never silently replaced.
    pub fn open(path: impl Into<PathBuf>, hasher: PasswordHasher) -> Result<Self, AuthError> {
        let path = path.into();
        let dummy_hash = hasher.hash(TIMING_DUMMY_PASSWORD)?;

        let mut store = Self {
            path,
            hasher,
            credentials: BTreeMap::new(),
            dummy_hash,
        };
        store.credentials = store.load()?;

        info!(
            "Opened credential store at {:?} ({} users)",
            store.path,
            store.credentials.len()
        );
        Ok(store)
    }

    /// Hash `password` with a fresh salt and store it for `username`
    ///
    /// An existing record for the same username is overwritten.
    pub fn add_user(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        let hash = self.hasher.hash(password)?;
        let previous = self.credentials.insert(username.to_string(), hash);

        if let Err(e) = self.save() {
            match previous {
                Some(old) => {
                    self.credentials.insert(username.to_string(), old);
                }
                None => {
                    self.credentials.remove(username);
                }
            }
            return Err(e);
        }

        if previous.is_some() {
            info!("Replaced credentials for user {}", username);
        } else {
            info!("Added user {}", username);
        }
        Ok(())
    }

    /// Check a username/password pair
    pub fn validate_user(&self, username: &str, password: &str) -> bool {
        match self.credentials.get(username) {
            Some(hash) => self.hasher.verify(password, hash),
            None => {
                // Burn the same verification cost as a real mismatch
                let _ = self.hasher.verify(password, &self.dummy_hash);
                false
            }
        }
    }

    /// Remove `username` if `password` is currently correct for it
    ///
    /// Returns `Ok(false)` without touching the store when the pair does
    /// not validate.
    pub fn delete_user(&mut self, username: &str, password: &str) -> Result<bool, AuthError> {
        if !self.validate_user(username, password) {
            debug!("Refusing to delete user {}: credentials did not match", username);
            return Ok(false);
        }

        let Some(removed) = self.credentials.remove(username) else {
            return Ok(false);
        };

        if let Err(e) = self.save() {
            self.credentials.insert(username.to_string(), removed);
            return Err(e);
        }

        info!("Deleted user {}", username);
        Ok(true)
    }

    /// Write the full mapping to the backing file
    ///
    /// The file is replaced atomically: content goes to a temp file in the
    /// same directory which is then renamed over the target.
    pub fn save(&self) -> Result<(), AuthError> {
        let write_err = |source: std::io::Error| AuthError::StorageWrite {
            path: self.path.clone(),
            source,
        };

        let content = serde_json::to_vec_pretty(&self.credentials)
            .map_err(|e| write_err(e.into()))?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let temp_file = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        {
            let mut file = temp_file.as_file();
            file.write_all(&content).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }

        // Password hashes are readable by the owner only
        #[cfg(unix)]
        {
            let mut perms = temp_file.as_file().metadata().map_err(write_err)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(temp_file.path(), perms).map_err(write_err)?;
        }

        temp_file
            .persist(&self.path)
            .map_err(|e| write_err(e.error))?;

        debug!(
            "Saved {} credentials to {:?}",
            self.credentials.len(),
            self.path
        );
        Ok(())
    }

    /// Read the mapping from the backing file
    pub fn load(&self) -> Result<BTreeMap<String, String>, AuthError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Credential store {:?} does not exist yet, starting empty",
                    self.path
                );
                return Ok(BTreeMap::new());
            }
            Err(source) => {
                return Err(AuthError::StorageRead {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| {
            warn!("Credential store {:?} could not be parsed", self.path);
            AuthError::StorageCorrupt {
                path: self.path.clone(),
                source,
            }
        })
    }

    pub fn contains(&self, username: &str) -> bool {
        self.credentials.contains_key(username)
    }

    /// Sorted list of stored usernames
    pub fn usernames(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Clonable handle to a [`CredentialStore`] shared across request handlers
///
/// Mutations hold the write lock for the whole hash-update-persist cycle,
/// so concurrent add/delete calls cannot lose each other's updates.
#[derive(Clone, Debug)]
pub struct SharedCredentials {
    inner: Arc<RwLock<CredentialStore>>,
}

impl SharedCredentials {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Open a store and wrap it in a shared handle
    pub fn open(path: impl Into<PathBuf>, hasher: PasswordHasher) -> Result<Self, AuthError> {
        CredentialStore::open(path, hasher).map(Self::new)
    }

    pub fn add_user(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.inner.write().add_user(username, password)
    }

    pub fn validate_user(&self, username: &str, password: &str) -> bool {
        self.inner.read().validate_user(username, password)
    }

    pub fn delete_user(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        self.inner.write().delete_user(username, password)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.inner.read().contains(username)
    }

    pub fn usernames(&self) -> Vec<String> {
        self.inner.read().usernames()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn path(&self) -> PathBuf {
        self.inner.read().path().to_path_buf()
    }

    // Async variants run hashing and file I/O on the blocking pool

    pub async fn add_user_async(&self, username: String, password: String) -> Result<(), AuthError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.write().add_user(&username, &password))
            .await
            .map_err(|e| AuthError::Task(e.to_string()))?
    }

    pub async fn validate_user_async(
        &self,
        username: String,
        password: String,
    ) -> Result<bool, AuthError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.read().validate_user(&username, &password))
            .await
            .map_err(|e| AuthError::Task(e.to_string()))
    }

    pub async fn delete_user_async(
        &self,
        username: String,
        password: String,
    ) -> Result<bool, AuthError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.write().delete_user(&username, &password))
            .await
            .map_err(|e| AuthError::Task(e.to_string()))?
    }
}
