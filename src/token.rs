//! API credentials and the secrets file they are loaded from.
//!
//! The secrets file is TOML:
//!
//! ```toml
//! endpoint = "https://music.example.com/api/scrobble"
//! token = "..."
//! ```
//!
//! The token is redacted from `Debug` output so it does not end up in logs.

use std::{fmt, fs, path::Path};

use serde::Deserialize;
use url::Url;
use veil::Redact;

use crate::error::{Error, Result};

/// Bearer token for the scrobble service.
#[derive(Clone, Redact, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct Token(#[redact] String);

impl Token {
    /// Creates a token after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the token is empty or contains
    /// characters that cannot go into an HTTP header.
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::invalid_argument("token is empty"));
        }
        if !token.chars().all(|chr| chr.is_ascii_graphic()) {
            return Err(Error::invalid_argument(
                "token contains non-printable characters",
            ));
        }
        Ok(Self(token.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contents of the secrets file.
#[derive(Clone, Debug, Deserialize)]
pub struct Secrets {
    pub endpoint: Url,
    pub token: Option<Token>,
}

impl Secrets {
    /// Secrets files are tiny; anything larger is rejected before reading.
    const MAX_FILE_SIZE: u64 = 1024;

    /// Loads secrets from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is larger than 1 KiB,
    /// is not valid TOML, or holds an invalid endpoint or token.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: secrets file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        contents.parse()
    }
}

impl std::str::FromStr for Secrets {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let secrets: Self = toml::from_str(s)?;

        // Run deserialized tokens through the same checks as `Token::new`.
        let token = secrets.token.map(|token| Token::new(token.as_str())).transpose()?;
        if !matches!(secrets.endpoint.scheme(), "http" | "https") {
            return Err(Error::invalid_argument(format!(
                "unsupported endpoint scheme {}",
                secrets.endpoint.scheme()
            )));
        }

        Ok(Self {
            endpoint: secrets.endpoint,
            token,
        })
    }
}
