use failure::Error;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use std::env;
use std::io;

pub mod auth;
pub mod client;
pub mod token;

pub const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SCOPES: &[&str] = &["playlist-read-private", "user-library-read"];

const CLIENT_ID_VAR: &str = "SPOTIFY_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "SPOTIFY_CLIENT_SECRET";

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str) -> Credentials {
        Credentials {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
        }
    }

    /// Reads the client credentials, loading `.env` from the working directory first.
    pub fn from_env() -> Result<Credentials, Error> {
        match dotenv::dotenv() {
            Ok(path) => log::debug!("loaded environment from {:?}", path),
            Err(dotenv::Error::Io(ref e)) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("no .env file found, reading credentials from the environment")
            }
            Err(err) => return Err(failure::format_err!("could not load .env file: {}", err)),
        }

        let client_id = env::var(CLIENT_ID_VAR)
            .map_err(|_| failure::format_err!("{} is not set", CLIENT_ID_VAR))?;
        let client_secret = env::var(CLIENT_SECRET_VAR)
            .map_err(|_| failure::format_err!("{} is not set", CLIENT_SECRET_VAR))?;

        Ok(Credentials::new(&client_id, &client_secret))
    }
}

pub fn build_oauth_client(credentials: &Credentials, redirect_url: &str) -> Result<BasicClient, Error> {
    let client = BasicClient::new(
        ClientId::new(credentials.client_id.clone()),
        Some(ClientSecret::new(credentials.client_secret.clone())),
        AuthUrl::new(AUTH_URL.to_string())?,
        Some(TokenUrl::new(TOKEN_URL.to_string())?),
    )
    .set_redirect_uri(RedirectUrl::new(redirect_url.to_string())?);

    Ok(client)
}

/// URLs of the collections a backup walks.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
    pub playlists_limit: u32,
    pub playlist_tracks_limit: u32,
    pub saved_tracks_limit: u32,
}

impl Endpoints {
    pub fn new(base: &str) -> Endpoints {
        Endpoints {
            base: base.trim_end_matches('/').to_owned(),
            playlists_limit: 50,
            playlist_tracks_limit: 100,
            saved_tracks_limit: 50,
        }
    }

    pub fn playlists(&self) -> String {
        format!("{}/v1/me/playlists?offset=0&limit={}", self.base, self.playlists_limit)
    }

    pub fn playlist_tracks(&self, playlist_id: &str) -> String {
        format!(
            "{}/v1/playlists/{}/tracks?offset=0&limit={}",
            self.base, playlist_id, self.playlist_tracks_limit
        )
    }

    pub fn saved_tracks(&self) -> String {
        format!("{}/v1/me/tracks?offset=0&limit={}", self.base, self.saved_tracks_limit)
    }
}
