pub mod backup;
pub mod cli;
pub mod config;
pub mod pagination;
pub mod playlists;
pub mod saved;
pub mod serialize;
pub mod spotify;
pub mod writer;
