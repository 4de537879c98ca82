use failure::Error;
use serde::de::DeserializeOwned;

use crate::serialize::Page;
use crate::spotify::client::SpotifyClient;

/// Describes one walk over a paginated collection.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub label: String,
    pub url: String,
    pub limit: u32,
    /// Also stop once a page comes back with fewer than `limit` items.
    pub stop_on_short_page: bool,
}

impl PageRequest {
    pub fn new(label: &str, url: String, limit: u32) -> PageRequest {
        PageRequest {
            label: label.to_owned(),
            url,
            limit,
            stop_on_short_page: false,
        }
    }

    pub fn stop_on_short_page(mut self) -> PageRequest {
        self.stop_on_short_page = true;
        self
    }
}

/// Follows `next` cursors until the collection is exhausted. Any failure discards
/// whatever was fetched so far.
pub fn fetch_all<T: DeserializeOwned>(spotify: &dyn SpotifyClient, request: &PageRequest) -> Result<Vec<T>, Error> {
    let mut items: Vec<T> = vec![];
    let mut next_url = Some(request.url.clone());

    while let Some(url) = next_url.take() {
        let body = spotify.get(&url)?;

        let mut page: Page<T> = serde_json::from_str(&body)
            .map_err(|e| failure::format_err!("could not decode {} page {}: {}", request.label, url, e))?;

        let page_len = page.items.len();
        items.append(&mut page.items);

        log::info!("Fetched {} {}", items.len(), request.label);

        if request.stop_on_short_page && page_len < request.limit as usize {
            break;
        }

        next_url = page.next_url().map(str::to_owned);
    }

    Ok(items)
}
