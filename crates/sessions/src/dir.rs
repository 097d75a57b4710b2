use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{error::SessionError, name::SessionName};

const SESSION_EXT: &str = "session";
const CREDENTIALS_EXT: &str = "json";

/// File locations belonging to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// Opaque client library state.
    pub session_file: PathBuf,
    /// `{"api_id", "api_hash", "phone", "twofa"}` JSON.
    pub credentials_file: PathBuf,
    pub lock_file: PathBuf,
}

/// What [`SessionDir::delete`] actually removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub session_file: bool,
    pub credentials_file: bool,
}

impl DeleteOutcome {
    pub fn removed_anything(&self) -> bool {
        self.session_file || self.credentials_file
    }
}

/// The directory holding all saved sessions.
#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

impl SessionDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> Result<(), SessionError> {
        fs::create_dir_all(&self.root).map_err(|e| SessionError::io(&self.root, e))
    }

    pub fn paths(&self, name: &SessionName) -> SessionPaths {
        let stem = name.as_str();
        SessionPaths {
            session_file: self.root.join(format!("{stem}.{SESSION_EXT}")),
            credentials_file: self.root.join(format!("{stem}.{CREDENTIALS_EXT}")),
            lock_file: self.root.join(format!("{stem}.{SESSION_EXT}.lock")),
        }
    }

    /// Whether a session file exists for `name`.
    pub fn exists(&self, name: &SessionName) -> bool {
        self.paths(name).session_file.is_file()
    }

    /// List sessions that have a `.session` file, sorted by name.
    ///
    /// Files whose stem is not a valid session name are skipped. A missing
    /// directory is created and yields an empty list.
    pub fn list(&self) -> Result<Vec<SessionName>, SessionError> {
        self.ensure()?;
        let entries = fs::read_dir(&self.root).map_err(|e| SessionError::io(&self.root, e))?;

        let mut names: Vec<SessionName> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(SESSION_EXT))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_string();
                match SessionName::parse(&stem) {
                    Ok(name) if name.as_str() == stem => Some(name),
                    _ => {
                        warn!(path = %path.display(), "skipping session file with unusable name");
                        None
                    },
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove the session file, credentials file and lock sidecar for `name`.
    ///
    /// Missing files are not an error.
    pub fn delete(&self, name: &SessionName) -> Result<DeleteOutcome, SessionError> {
        let paths = self.paths(name);
        let outcome = DeleteOutcome {
            session_file: remove_if_exists(&paths.session_file)?,
            credentials_file: remove_if_exists(&paths.credentials_file)?,
        };
        remove_if_exists(&paths.lock_file)?;
        debug!(session = %name, ?outcome, "deleted session");
        Ok(outcome)
    }
}

fn remove_if_exists(path: &Path) -> Result<bool, SessionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SessionError::io(path, e)),
    }
}
