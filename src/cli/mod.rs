use failure::Error;

use crate::backup;
use crate::config::Config;
use crate::spotify::auth::{Authenticator, CallbackListener, TokenSource};
use crate::spotify::client::ApiClient;
use crate::spotify::token::{Token, TokenStore};
use crate::spotify::*;
use crate::writer::BackupWriter;

/// Backs up the library, or runs the authorization flow when there is no usable
/// cached token. After authorizing the run ends; the next one performs the backup.
pub fn cli(config: &Config, force_auth: bool) -> Result<(), Error> {
    let credentials = Credentials::from_env()?;
    let oauth = build_oauth_client(&credentials, &config.redirect_url())?;
    let store = TokenStore::new(config.token_cache_path());

    let cached = if force_auth { None } else { load_cached(&store) };

    let token = match cached {
        Some(token) => token,
        None => {
            let listener = CallbackListener::bind(&config.callback_addr(), "/callback", config.callback_timeout())?;
            Authenticator::new(oauth, store).run_interactive(listener)?;

            println!("Authorization successful. Run the command again to start the backup.");
            return Ok(());
        }
    };

    let spotify = ApiClient::new(TokenSource::new(oauth, store, token))?;
    let writer = BackupWriter::new(config.backup_path());

    let summary = backup::run_backup(&spotify, &config.endpoints(), &writer, config.playlist_pause())?;

    log::info!(
        "Saved {} files to {:?}, skipped {} playlists",
        summary.files.len(),
        config.backup_path(),
        summary.skipped.len()
    );

    for skipped in &summary.skipped {
        log::warn!("playlist {:?} was not backed up: {}", skipped.name, skipped.reason);
    }

    Ok(())
}

fn load_cached(store: &TokenStore) -> Option<Token> {
    match store.load() {
        Ok(token) => Some(token),
        Err(err) => {
            log::info!("{}, starting authorization", err);
            None
        }
    }
}
