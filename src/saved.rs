use crate::pagination::{fetch_all, PageRequest};
use crate::serialize::*;
use crate::spotify::client::*;
use crate::spotify::Endpoints;
use failure::Error;

/// Fetches the user's liked tracks. A page shorter than the limit ends the walk
/// even if the provider still returned a cursor.
pub fn fetch_saved_tracks(spotify: &dyn SpotifyClient, endpoints: &Endpoints) -> Result<Vec<Item>, Error> {
    let request = PageRequest::new("saved tracks", endpoints.saved_tracks(), endpoints.saved_tracks_limit)
        .stop_on_short_page();

    fetch_all(spotify, &request).map_err(|e| failure::format_err!("failed to fetch saved tracks: {}", e))
}
