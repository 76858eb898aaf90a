use anyhow::{Context, Result};
use quill_backend::session::{StoredTokens, TokenChange, TokenPair, TokenStore};
use quill_backend::utils::APP_NAME;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// `<config dir>/quill/session.json`
pub fn default_session_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no configuration directory for this platform")?;
    Ok(base.join(APP_NAME).join("session.json"))
}

/// Token store persisted as a small JSON file so the session survives
/// between invocations of the terminal client.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    tokens: Mutex<StoredTokens>,
    save_error: Mutex<Option<io::Error>>,
}

impl FileTokenStore {
    /// Loads the stored session, starting empty when the file is missing.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tokens = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt session file {}", path.display()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => StoredTokens::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
            save_error: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fails if any change since the last check could not be written. The
    /// trait methods cannot return errors, so callers check after each
    /// command.
    pub fn ensure_saved(&self) -> Result<()> {
        let failed = self
            .save_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match failed {
            Some(err) => Err(err)
                .with_context(|| format!("failed to save session to {}", self.path.display())),
            None => Ok(()),
        }
    }

    fn apply(&self, change: TokenChange) {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.apply(change);
        if let Err(err) = persist(&self.path, &tokens) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to save session");
            *self.save_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        }
    }

    fn snapshot(&self) -> StoredTokens {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn persist(path: &Path, tokens: &StoredTokens) -> io::Result<()> {
    if tokens.access.is_none() && tokens.refresh.is_none() {
        return match fs::remove_file(path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        };
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(tokens)?;
    let mut file = open_private(path)?;
    file.write_all(&json)?;
    file.sync_all()
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies to newly created files.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.snapshot().access
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh
    }

    fn store_pair(&self, pair: TokenPair) {
        self.apply(TokenChange::Pair(pair));
    }

    fn replace_access(&self, access: String) {
        self.apply(TokenChange::Access(access));
    }

    fn replace_refresh(&self, refresh: String) {
        self.apply(TokenChange::Refresh(refresh));
    }

    fn discard_access(&self) {
        self.apply(TokenChange::DiscardAccess);
    }

    fn clear(&self) {
        self.apply(TokenChange::Clear);
    }
}
