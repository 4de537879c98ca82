use failure::Error;
use std::time::Duration;

use super::auth::TokenSource;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The one operation the fetchers need from the Web API: an authenticated GET
/// returning the response body.
pub trait SpotifyClient {
    fn get(&self, url: &str) -> Result<String, Error>;
}

pub struct ApiClient {
    http: reqwest::blocking::Client,
    tokens: TokenSource,
}

impl ApiClient {
    pub fn new(tokens: TokenSource) -> Result<ApiClient, Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(ApiClient { http, tokens })
    }
}

impl SpotifyClient for ApiClient {
    fn get(&self, url: &str) -> Result<String, Error> {
        let access_token = self.tokens.access_token()?;

        log::debug!("GET {}", url);

        let body = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()?
            .error_for_status()?
            .text()?;

        Ok(body)
    }
}

#[cfg(test)]
mockall::mock! {
    pub SpotifyClientM {}
    impl SpotifyClient for SpotifyClientM {
        fn get(&self, url: &str) -> Result<String, Error>;
    }
}
