use failure::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::playlists;
use crate::saved;
use crate::spotify::client::SpotifyClient;
use crate::spotify::Endpoints;
use crate::writer::BackupWriter;

pub const SAVED_TRACKS_NAME: &str = "saved_tracks";

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFile {
    pub name: String,
    pub path: PathBuf,
    pub item_count: usize,
}

/// A playlist left out of the run and the error that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPlaylist {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BackupSummary {
    pub files: Vec<WrittenFile>,
    pub skipped: Vec<SkippedPlaylist>,
}

/// Fetches every playlist, its tracks and the saved tracks, writing one file per
/// collection. A playlist whose tracks cannot be fetched is skipped.
pub fn run_backup(
    spotify: &dyn SpotifyClient,
    endpoints: &Endpoints,
    writer: &BackupWriter,
    pause: Duration,
) -> Result<BackupSummary, Error> {
    let mut summary = BackupSummary::default();

    let all_playlists = playlists::fetch_playlists(spotify, endpoints)
        .map_err(|e| failure::format_err!("Error fetching playlists: {}", e))?;

    for (i, playlist) in all_playlists.iter().enumerate() {
        let tracks = match playlists::fetch_playlist_tracks(spotify, endpoints, playlist) {
            Ok(tracks) => tracks,
            Err(err) => {
                log::error!("{}, skipping", err);
                summary.skipped.push(SkippedPlaylist {
                    name: playlist.name.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let path = writer.write(&playlist.name, &tracks)?;
        summary.files.push(WrittenFile {
            name: playlist.name.clone(),
            path,
            item_count: tracks.len(),
        });

        if i + 1 < all_playlists.len() && pause > Duration::from_secs(0) {
            thread::sleep(pause);
        }
    }

    let saved_tracks = saved::fetch_saved_tracks(spotify, endpoints)?;
    let path = writer.write(SAVED_TRACKS_NAME, &saved_tracks)?;
    summary.files.push(WrittenFile {
        name: SAVED_TRACKS_NAME.into(),
        path,
        item_count: saved_tracks.len(),
    });

    Ok(summary)
}
