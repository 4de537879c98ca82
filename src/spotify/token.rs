use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicTokenResponse;
use oauth2::TokenResponse;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Tokens are considered expired slightly before the provider says so.
const EXPIRY_LEEWAY_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expiry", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// Caches written with a zero time (`0001-01-01T00:00:00Z`) carry no expiry.
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
    Ok(expiry.filter(|e| e.timestamp() > 0))
}

impl Token {
    /// Builds a token from a token endpoint response. Refresh responses may omit the
    /// refresh token, in which case `previous_refresh` is kept.
    pub fn from_response(
        response: &BasicTokenResponse,
        previous_refresh: Option<&str>,
        now: DateTime<Utc>,
    ) -> Token {
        let token_type = serde_json::to_value(response.token_type())
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(default_token_type);

        let expiry = response
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| now + d);

        Token {
            access_token: response.access_token().secret().clone(),
            token_type,
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| previous_refresh.map(str::to_owned)),
            expiry,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now,
            None => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("no cached token at {0:?}")]
    NotFound(PathBuf),
    #[error("cached token is malformed: {0}")]
    Deserialization(#[source] serde_json::Error),
    #[error("could not serialize token: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("token cache i/o error: {0}")]
    Io(#[from] io::Error),
}

/// File backed cache for the OAuth token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> TokenStore {
        TokenStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Token, TokenError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TokenError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data).map_err(TokenError::Deserialization)
    }

    pub fn save(&self, token: &Token) -> Result<(), TokenError> {
        let json = serde_json::to_vec(token).map_err(TokenError::Serialization)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = open_private(&self.path)?;
        file.write_all(&json)?;

        log::debug!("saved token to {:?}", self.path);
        Ok(())
    }
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
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
