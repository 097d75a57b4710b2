use std::fs;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize, Serializer},
    tracing::{debug, warn},
};

use crate::{dir::SessionDir, error::SessionError, name::SessionName};

/// API credentials and login details saved next to a session file.
///
/// On disk this is `{"api_id": 123, "api_hash": "...", "phone": "...", "twofa": ""}`
/// where an empty `twofa` means no two-factor secret was stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub api_id: i32,
    #[serde(serialize_with = "serialize_secret")]
    pub api_hash: Secret<String>,
    pub phone: String,
    #[serde(
        default,
        serialize_with = "serialize_twofa",
        deserialize_with = "deserialize_twofa"
    )]
    pub twofa: Option<Secret<String>>,
}

fn serialize_secret<S: Serializer>(secret: &Secret<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

fn serialize_twofa<S: Serializer>(
    secret: &Option<Secret<String>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.as_ref().map_or("", |v| v.expose_secret().as_str()))
}

fn deserialize_twofa<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Secret<String>>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.filter(|v| !v.is_empty()).map(Secret::new))
}

/// File-based credential storage at `<sessions_dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: SessionDir,
}

impl CredentialStore {
    pub fn new(dir: SessionDir) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &SessionDir {
        &self.dir
    }

    /// Load saved credentials. Missing or unreadable files yield `None`.
    pub fn load(&self, name: &SessionName) -> Option<SessionCredentials> {
        let path = self.dir.paths(name).credentials_file;
        let data = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!(session = %name, path = %path.display(), error = %e, "ignoring malformed credentials file");
                None
            },
        }
    }

    pub fn save(&self, name: &SessionName, creds: &SessionCredentials) -> Result<(), SessionError> {
        self.dir.ensure()?;
        let path = self.dir.paths(name).credentials_file;

        let data = serde_json::to_string_pretty(creds).map_err(|source| SessionError::Encode {
            name: name.to_string(),
            source,
        })?;
        fs::write(&path, data).map_err(|e| SessionError::io(&path, e))?;

        // Set file permissions to 0600 on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|e| SessionError::io(&path, e))?;
        }

        debug!(session = %name, "saved session credentials");
        Ok(())
    }

    pub fn delete(&self, name: &SessionName) -> Result<(), SessionError> {
        let path = self.dir.paths(name).credentials_file;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }
}
