use std::{fmt, str::FromStr};

use crate::error::SessionError;

const MAX_LEN: usize = 64;

/// A validated session name, safe to use as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionName(String);

impl SessionName {
    /// Validate a user-supplied session name. Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let name = raw.trim();
        let invalid = |reason| SessionError::InvalidName {
            name: raw.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.chars().count() > MAX_LEN {
            return Err(invalid("name is longer than 64 characters"));
        }
        if name.starts_with('.') {
            return Err(invalid("name starts with '.'"));
        }
        if name.contains(['/', '\\']) {
            return Err(invalid("name contains a path separator"));
        }
        if name.chars().any(char::is_control) {
            return Err(invalid("name contains control characters"));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionName {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
