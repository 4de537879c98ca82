use failure::Error;

use crate::pagination::{fetch_all, PageRequest};
use crate::serialize::*;
use crate::spotify::client::*;
use crate::spotify::Endpoints;

pub fn fetch_playlists(spotify: &dyn SpotifyClient, endpoints: &Endpoints) -> Result<Vec<Playlist>, Error> {
    let request = PageRequest::new("playlists", endpoints.playlists(), endpoints.playlists_limit);

    // the listing occasionally carries null entries
    let playlists: Vec<Option<Playlist>> = fetch_all(spotify, &request)?;

    Ok(playlists.into_iter().flatten().collect())
}

pub fn fetch_playlist_tracks(
    spotify: &dyn SpotifyClient,
    endpoints: &Endpoints,
    playlist: &Playlist,
) -> Result<Vec<Item>, Error> {
    log::debug!("Fetching tracks of playlist {:?}", playlist.name);

    let label = format!("tracks for playlist {}", playlist.name);
    let request = PageRequest::new(
        &label,
        endpoints.playlist_tracks(&playlist.id),
        endpoints.playlist_tracks_limit,
    );

    fetch_all(spotify, &request)
        .map_err(|e| failure::format_err!("failed to fetch tracks for playlist {}: {}", playlist.name, e))
}
