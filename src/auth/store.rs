use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Service name every secret is filed under.
pub const SERVICE_NAME: &str = "renku-dev-utils";
/// Prefix of every account name written by rdu.
pub const APP_PREFIX: &str = "rdu";

const INDEX_ACCOUNT: &str = "rdu:index";
const CREDENTIAL_FILE_VERSION: u32 = 1;

/// Which half of the token pair a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Identifies one secret: the constant service plus `rdu:<issuer>:<kind>`.
///
/// # Example
/// ```
/// use rdu::auth::{CredentialKey, TokenKind};
///
/// let key = CredentialKey::new("https://ci-renku-42.dev.renku.ch", TokenKind::AccessToken);
/// assert_eq!(key.account(), "rdu:https://ci-renku-42.dev.renku.ch:access_token");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    account: String,
}

impl CredentialKey {
    pub fn new(issuer_base_url: &str, kind: TokenKind) -> Self {
        Self {
            account: format!("{APP_PREFIX}:{issuer_base_url}:{}", kind.as_str()),
        }
    }

    pub fn service(&self) -> &'static str {
        SERVICE_NAME
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", SERVICE_NAME, self.account)
    }
}

/// Secure storage for named secrets.
///
/// Each call is atomic for its own key only. Writing both halves of a token
/// pair is two calls, and the second one can fail after the first succeeded.
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, AuthError>;
    fn set(&self, key: &CredentialKey, secret: &str) -> Result<(), AuthError>;
    /// Fails with [`AuthError::CredentialNotFound`] when the key is absent.
    fn delete(&self, key: &CredentialKey) -> Result<(), AuthError>;
    /// Remove every secret under [`SERVICE_NAME`], across issuers.
    fn delete_all(&self) -> Result<(), AuthError>;
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

/// Raw secret operations under [`SERVICE_NAME`], addressed by account.
///
/// Errors are rendered to text; the store wraps them in read or write
/// variants with the key attached.
trait SecretBackend: Send + Sync + std::fmt::Debug {
    fn read(&self, account: &str) -> Result<Option<String>, String>;
    fn write(&self, account: &str, secret: &str) -> Result<(), String>;
    /// `Ok(false)` when nothing was stored under `account`.
    fn remove(&self, account: &str) -> Result<bool, String>;
}

#[derive(Debug)]
struct OsKeyring;

impl OsKeyring {
    fn entry(account: &str) -> Result<keyring::Entry, String> {
        keyring::Entry::new(SERVICE_NAME, account).map_err(|e| e.to_string())
    }
}

impl SecretBackend for OsKeyring {
    fn read(&self, account: &str) -> Result<Option<String>, String> {
        match Self::entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn write(&self, account: &str, secret: &str) -> Result<(), String> {
        Self::entry(account)?
            .set_password(secret)
            .map_err(|e| e.to_string())
    }

    fn remove(&self, account: &str) -> Result<bool, String> {
        match Self::entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Store backed by the platform keychain (Keychain, Credential Manager,
/// Secret Service).
///
/// The platform APIs cannot list entries by service, so the accounts written
/// through this store are tracked in an index entry that `delete_all` walks.
#[derive(Debug)]
pub struct KeyringCredentialStore {
    backend: Arc<dyn SecretBackend>,
    index_lock: Mutex<()>,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::with_backend(Arc::new(OsKeyring))
    }
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_backend(backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            backend,
            index_lock: Mutex::new(()),
        }
    }

    fn lock_index(&self) -> Result<std::sync::MutexGuard<'_, ()>, AuthError> {
        self.index_lock
            .lock()
            .map_err(|_| AuthError::StoreWrite("keyring index lock poisoned".to_string()))
    }

    fn read_index(&self) -> Result<Vec<String>, AuthError> {
        let raw = self
            .backend
            .read(INDEX_ACCOUNT)
            .map_err(|e| AuthError::StoreRead(format!("keyring index: {e}")))?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AuthError::StoreRead(format!("corrupt keyring index: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn write_index(&self, accounts: &[String]) -> Result<(), AuthError> {
        let result = if accounts.is_empty() {
            self.backend.remove(INDEX_ACCOUNT).map(|_| ())
        } else {
            let raw = serde_json::to_string(accounts)
                .map_err(|e| AuthError::StoreWrite(format!("keyring index: {e}")))?;
            self.backend.write(INDEX_ACCOUNT, &raw)
        };
        result.map_err(|e| AuthError::StoreWrite(format!("keyring index: {e}")))
    }

    fn update_index(&self, update: impl FnOnce(&mut Vec<String>)) -> Result<(), AuthError> {
        let _guard = self.lock_index()?;
        let mut accounts = self.read_index()?;
        update(&mut accounts);
        self.write_index(&accounts)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, AuthError> {
        let secret = self
            .backend
            .read(key.account())
            .map_err(|e| AuthError::StoreRead(format!("{key}: {e}")))?;
        if secret.is_some() {
            tracing::debug!(key = %key, "credential loaded from keyring");
        }
        Ok(secret)
    }

    fn set(&self, key: &CredentialKey, secret: &str) -> Result<(), AuthError> {
        self.backend
            .write(key.account(), secret)
            .map_err(|e| AuthError::StoreWrite(format!("{key}: {e}")))?;
        let account = key.account().to_string();
        self.update_index(|accounts| {
            if !accounts.contains(&account) {
                accounts.push(account.clone());
            }
        })
        .map_err(|e| {
            AuthError::StoreWrite(format!(
                "{key} was saved but not indexed, so logout --all will not remove it ({e})"
            ))
        })
    }

    fn delete(&self, key: &CredentialKey) -> Result<(), AuthError> {
        let result = match self.backend.remove(key.account()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::CredentialNotFound(key.to_string())),
            Err(e) => Err(AuthError::StoreWrite(format!("{key}: {e}"))),
        };
        if !matches!(result, Err(AuthError::StoreWrite(_))) {
            let account = key.account();
            if let Err(e) = self.update_index(|accounts| accounts.retain(|a| a != account)) {
                // A stale index entry only costs a no-op delete later.
                tracing::warn!(key = %key, error = %e, "failed to update keyring index");
            }
        }
        result
    }

    fn delete_all(&self) -> Result<(), AuthError> {
        let _guard = self.lock_index()?;
        let accounts = self.read_index()?;
        let mut remaining = Vec::new();
        for account in accounts {
            if let Err(e) = self.backend.remove(&account) {
                tracing::warn!(account = %account, error = %e, "failed to delete credential");
                remaining.push(account);
            }
        }
        self.write_index(&remaining)?;
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(AuthError::StoreWrite(format!(
                "could not delete {}",
                remaining.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// File fallback
// ---------------------------------------------------------------------------

/// Store backed by a TOML file, for hosts without a secret service.
///
/// # Example
/// ```no_run
/// use rdu::auth::{CredentialKey, CredentialStore, FileCredentialStore, TokenKind};
///
/// let store = FileCredentialStore::new_default();
/// let key = CredentialKey::new("https://example.org", TokenKind::RefreshToken);
/// store.set(&key, "refresh")?;
/// # Ok::<(), rdu::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn new_default() -> Self {
        Self::new(crate::config::default_rdu_dir().join("credentials.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CredentialFile, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialFile::default())
            }
            Err(err) => {
                return Err(AuthError::StoreRead(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };
        let file: CredentialFile = toml::from_str(&raw)?;
        if file.version != CREDENTIAL_FILE_VERSION {
            return Err(AuthError::StoreRead(format!(
                "unsupported credentials file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(file)
    }

    fn save(&self, file: &CredentialFile) -> Result<(), AuthError> {
        let serialized = toml::to_string(file)?;
        atomic_write(&self.path, serialized.as_bytes())
            .map_err(|e| AuthError::StoreWrite(format!("{}: {e}", self.path.display())))
    }

    fn with_file<T>(
        &self,
        f: impl FnOnce(&mut CredentialFile) -> Result<(T, bool), AuthError>,
    ) -> Result<T, AuthError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::StoreWrite("credential file lock poisoned".to_string()))?;
        let mut file = self.load()?;
        let (out, dirty) = f(&mut file)?;
        if dirty {
            self.save(&file)?;
        }
        Ok(out)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, AuthError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AuthError::StoreRead("credential file lock poisoned".to_string()))?;
        Ok(self.load()?.secrets.get(key.account()).cloned())
    }

    fn set(&self, key: &CredentialKey, secret: &str) -> Result<(), AuthError> {
        self.with_file(|file| {
            file.secrets
                .insert(key.account().to_string(), secret.to_string());
            Ok(((), true))
        })
    }

    fn delete(&self, key: &CredentialKey) -> Result<(), AuthError> {
        self.with_file(|file| match file.secrets.remove(key.account()) {
            Some(_) => Ok(((), true)),
            None => Err(AuthError::CredentialNotFound(key.to_string())),
        })
    }

    fn delete_all(&self) -> Result<(), AuthError> {
        self.with_file(|file| {
            let dirty = !file.secrets.is_empty();
            file.secrets.clear();
            Ok(((), dirty))
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialFile {
    version: u32,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

impl Default for CredentialFile {
    fn default() -> Self {
        Self {
            version: CREDENTIAL_FILE_VERSION,
            secrets: BTreeMap::new(),
        }
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".to_string());
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path =
        path.with_file_name(format!(".{file_name}.tmp-{}-{nonce}", std::process::id()));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn secrets(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AuthError> {
        self.secrets
            .lock()
            .map_err(|_| AuthError::StoreRead("memory store lock poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &CredentialKey) -> Result<Option<String>, AuthError> {
        Ok(self.secrets()?.get(key.account()).cloned())
    }

    fn set(&self, key: &CredentialKey, secret: &str) -> Result<(), AuthError> {
        self.secrets()?
            .insert(key.account().to_string(), secret.to_string());
        Ok(())
    }

    fn delete(&self, key: &CredentialKey) -> Result<(), AuthError> {
        self.secrets()?
            .remove(key.account())
            .map(|_| ())
            .ok_or_else(|| AuthError::CredentialNotFound(key.to_string()))
    }

    fn delete_all(&self) -> Result<(), AuthError> {
        self.secrets()?.clear();
        Ok(())
    }
}
