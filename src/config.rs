use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use std::env;
use std::fmt::{self, Display, Formatter};
use std::io::Read;
use std::time::Duration;

use crate::spotify::Endpoints;

const CONFIG_FILE: &str = "./spotify-archive.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    token_cache: PathBuf,
    api_base: String,
    pub redirect_port: u16,
    pub callback_timeout_secs: u64,
    pub playlist_pause_ms: u64,
    pub playlists_page_size: u32,
    pub playlist_tracks_page_size: u32,
    pub saved_tracks_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(env::var("DATA_DIR").ok().unwrap_or(".".to_owned()));
        let api_base = env::var("API_BASE").ok().unwrap_or("https://api.spotify.com".into());
        let redirect_port = env::var("REDIRECT_PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(8080);

        Config {
            data_dir,
            backup_dir: PathBuf::from("backups"),
            token_cache: PathBuf::from("token_cache.json"),
            api_base,
            redirect_port,
            callback_timeout_secs: 300,
            playlist_pause_ms: 2000,
            playlists_page_size: 50,
            playlist_tracks_page_size: 100,
            saved_tracks_page_size: 50,
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, failure::Error> {
        Config::load_from(CONFIG_FILE)
    }

    /// Reads a toml config, falling back to defaults when the file does not exist.
    pub fn load_from<P: AsRef<Path>>(config_path: P) -> Result<Config, failure::Error> {
        let config = match std::fs::File::open(config_path.as_ref()) {
            Ok(mut cfg) => {
                let mut c = String::new();
                cfg.read_to_string(&mut c)?;
                toml::from_str(&c).map_err(failure::Error::from)?
            },
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            },
            Err(err) => return Err(err.into())
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), failure::Error> {
        if self.playlists_page_size == 0 || self.playlist_tracks_page_size == 0 || self.saved_tracks_page_size == 0 {
            failure::bail!("page sizes must be greater than zero");
        }

        if self.redirect_port == 0 {
            failure::bail!("redirect_port must be set");
        }

        Ok(())
    }

    pub fn token_cache_path(&self) -> PathBuf { self.data_dir.join(&self.token_cache) }

    pub fn backup_path(&self) -> PathBuf { self.data_dir.join(&self.backup_dir) }

    pub fn redirect_url(&self) -> String { format!("http://localhost:{}/callback", self.redirect_port) }

    pub fn callback_addr(&self) -> String { format!("127.0.0.1:{}", self.redirect_port) }

    pub fn callback_timeout(&self) -> Duration { Duration::from_secs(self.callback_timeout_secs) }

    pub fn playlist_pause(&self) -> Duration { Duration::from_millis(self.playlist_pause_ms) }

    pub fn endpoints(&self) -> Endpoints {
        let mut endpoints = Endpoints::new(&self.api_base);
        endpoints.playlists_limit = self.playlists_page_size;
        endpoints.playlist_tracks_limit = self.playlist_tracks_page_size;
        endpoints.saved_tracks_limit = self.saved_tracks_page_size;
        endpoints
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "data_dir={:?}, token_cache_path={:?}, backup_path={:?}, api_base={}, redirect_url={}, playlist_pause={:?}",
            self.data_dir,
            self.token_cache_path(),
            self.backup_path(),
            self.api_base,
            self.redirect_url(),
            self.playlist_pause()
        )
    }
}
