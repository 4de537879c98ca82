use chrono::{DateTime, Utc};
use failure::Error;
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{AuthorizationCode, CsrfToken, HttpRequest, HttpResponse, RefreshToken, Scope};
use std::cell::RefCell;
use std::time::{Duration, Instant};
use url::Url;

use super::token::{Token, TokenStore};

const CALLBACK_PAGE: &str = "Authorization received. You can close this window.";

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid state received: {0}")]
    StateMismatch(String),
    #[error("authorization was denied by the provider: {0}")]
    ProviderError(String),
    #[error("authorization callback carried no code")]
    MissingCode,
    #[error("malformed authorization callback: {0}")]
    MalformedCallback(String),
    #[error("could not start callback listener: {0}")]
    Listener(String),
    #[error("timed out after {0:?} waiting for the authorization callback")]
    Timeout(Duration),
    #[error("error exchanging authorization code: {0}")]
    Exchange(String),
    #[error("error refreshing access token: {0}")]
    Refresh(String),
    #[error("cached token has expired and cannot be refreshed, run `auth` again")]
    NoRefreshToken,
}

/// Query parameters the provider appends to the redirect url.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Callback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl Callback {
    /// Parses the request target of a redirect, e.g. `/callback?code=..&state=..`.
    pub fn from_request_url(request_url: &str) -> Result<Callback, AuthError> {
        let url = Url::parse("http://localhost")
            .and_then(|base| base.join(request_url))
            .map_err(|e| AuthError::MalformedCallback(e.to_string()))?;

        let mut callback = Callback::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => callback.code = Some(value.into_owned()),
                "state" => callback.state = Some(value.into_owned()),
                "error" => callback.error = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(callback)
    }

    /// Checks the callback against the issued state and returns the authorization code.
    pub fn verify(self, expected_state: &CsrfToken) -> Result<AuthorizationCode, AuthError> {
        let received = self.state.unwrap_or_default();
        if received != *expected_state.secret() {
            return Err(AuthError::StateMismatch(received));
        }

        if let Some(error) = self.error {
            return Err(AuthError::ProviderError(error));
        }

        self.code
            .filter(|code| !code.is_empty())
            .map(AuthorizationCode::new)
            .ok_or(AuthError::MissingCode)
    }
}

/// Loopback listener held for exactly one authorization redirect.
pub struct CallbackListener {
    server: tiny_http::Server,
    path: String,
    timeout: Duration,
}

impl CallbackListener {
    pub fn bind(addr: &str, path: &str, timeout: Duration) -> Result<CallbackListener, AuthError> {
        let server = tiny_http::Server::http(addr).map_err(|e| AuthError::Listener(e.to_string()))?;
        log::debug!("listening for authorization callback on {}", addr);

        Ok(CallbackListener {
            server,
            path: path.to_owned(),
            timeout,
        })
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Waits for the redirect and releases the port on return.
    pub fn accept(self) -> Result<Callback, AuthError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::from_secs(0) {
                return Err(AuthError::Timeout(self.timeout));
            }

            let request = match self.server.recv_timeout(remaining) {
                Ok(Some(request)) => request,
                Ok(None) => return Err(AuthError::Timeout(self.timeout)),
                Err(e) => return Err(AuthError::Listener(e.to_string())),
            };

            let request_url = request.url().to_owned();
            let path = request_url.split('?').next().unwrap_or_default();

            if path != self.path {
                log::debug!("ignoring request to {}", request_url);
                let _ = request.respond(tiny_http::Response::from_string("Not Found").with_status_code(404));
                continue;
            }

            let callback = Callback::from_request_url(&request_url)?;

            if let Err(e) = request.respond(tiny_http::Response::from_string(CALLBACK_PAGE)) {
                log::warn!("could not answer the authorization callback: {}", e);
            }

            return Ok(callback);
        }
    }
}

pub struct Unauthenticated {
    csrf_token: CsrfToken,
    authorize_url: Url,
}

pub struct Authenticated {
    token: Token,
}

/// Authorization-code flow. Only `Authenticator<Authenticated>` hands out a token.
pub struct Authenticator<S> {
    oauth: BasicClient,
    store: TokenStore,
    state: S,
}

impl Authenticator<Unauthenticated> {
    pub fn new(oauth: BasicClient, store: TokenStore) -> Authenticator<Unauthenticated> {
        Self::with_state(oauth, store, CsrfToken::new_random())
    }

    pub fn with_state(oauth: BasicClient, store: TokenStore, csrf_token: CsrfToken) -> Authenticator<Unauthenticated> {
        let issued = csrf_token.clone();
        let (authorize_url, csrf_token) = oauth
            .authorize_url(move || issued)
            .add_scopes(super::SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .url();

        Authenticator {
            oauth,
            store,
            state: Unauthenticated {
                csrf_token,
                authorize_url,
            },
        }
    }

    pub fn authorize_url(&self) -> &Url {
        &self.state.authorize_url
    }

    /// Presents the authorization url, waits for the redirect and exchanges the code.
    pub fn run_interactive(self, listener: CallbackListener) -> Result<Authenticator<Authenticated>, Error> {
        let url = self.authorize_url().to_string();

        println!("Visit the following URL to authorize the app:\n{}", url);
        if let Err(e) = webbrowser::open(&url) {
            log::warn!("could not open a browser: {}", e);
        }

        let callback = listener.accept()?;
        self.complete(callback, http_client)
    }

    /// Verifies the callback and exchanges its code for a token, persisting it.
    pub fn complete<F, RE>(self, callback: Callback, http: F) -> Result<Authenticator<Authenticated>, Error>
    where
        F: FnOnce(HttpRequest) -> Result<HttpResponse, RE>,
        RE: std::error::Error + 'static,
    {
        let code = callback.verify(&self.state.csrf_token)?;

        let response = self
            .oauth
            .exchange_code(code)
            .request(http)
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let token = Token::from_response(&response, None, Utc::now());
        self.store.save(&token)?;
        log::info!("authorization successful, token saved to {:?}", self.store.path());

        Ok(Authenticator {
            oauth: self.oauth,
            store: self.store,
            state: Authenticated { token },
        })
    }
}

impl Authenticator<Authenticated> {
    pub fn token(&self) -> &Token {
        &self.state.token
    }

    /// Hands the token over to a `TokenSource` for the rest of the run.
    pub fn into_token_source(self) -> TokenSource {
        TokenSource::new(self.oauth, self.store, self.state.token)
    }
}

/// Supplies a valid access token, refreshing the cached one when it expires.
pub struct TokenSource {
    oauth: BasicClient,
    store: TokenStore,
    token: RefCell<Token>,
}

impl TokenSource {
    pub fn new(oauth: BasicClient, store: TokenStore, token: Token) -> TokenSource {
        TokenSource {
            oauth,
            store,
            token: RefCell::new(token),
        }
    }

    pub fn access_token(&self) -> Result<String, Error> {
        self.access_token_with(Utc::now(), http_client)
    }

    pub fn access_token_with<F, RE>(&self, now: DateTime<Utc>, http: F) -> Result<String, Error>
    where
        F: FnOnce(HttpRequest) -> Result<HttpResponse, RE>,
        RE: std::error::Error + 'static,
    {
        if !self.token.borrow().is_expired(now) {
            return Ok(self.token.borrow().access_token.clone());
        }

        let refresh_token = self
            .token
            .borrow()
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        log::info!("access token expired, refreshing");

        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request(http)
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        let token = Token::from_response(&response, Some(&refresh_token), now);
        self.store.save(&token)?;

        let access_token = token.access_token.clone();
        self.token.replace(token);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::{build_oauth_client, Credentials};
    use chrono::Duration as ChronoDuration;
    use oauth2::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use oauth2::http::StatusCode;
    use std::io::{self, Read, Write};
    use std::net::TcpStream;
    use std::thread;

    fn new_oauth() -> BasicClient {
        build_oauth_client(&Credentials::new("client-id", "client-secret"), "http://localhost:8080/callback").unwrap()
    }

    fn json_response(body: &str) -> Result<HttpResponse, io::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(HttpResponse {
            status_code: StatusCode::OK,
            headers,
            body: body.as_bytes().to_vec(),
        })
    }

    fn new_authenticator(dir: &tempfile::TempDir) -> Authenticator<Unauthenticated> {
        let store = TokenStore::new(dir.path().join("token_cache.json"));
        Authenticator::with_state(new_oauth(), store, CsrfToken::new("issued-state".into()))
    }

    #[test]
    fn test_authorize_url() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = new_authenticator(&dir);
        let url = authenticator.authorize_url();

        assert!(url.as_str().starts_with(crate::spotify::AUTH_URL));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".into(), "issued-state".into())));
        assert!(pairs.contains(&("client_id".into(), "client-id".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("scope".into(), "playlist-read-private user-library-read".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost:8080/callback".into())));
    }

    #[test]
    fn test_callback_from_request_url() {
        let callback = Callback::from_request_url("/callback?code=AQB%2Fx&state=abc").unwrap();

        assert_eq!(callback.code.as_deref(), Some("AQB/x"));
        assert_eq!(callback.state.as_deref(), Some("abc"));
        assert_eq!(callback.error, None);

        let denied = Callback::from_request_url("/callback?error=access_denied&state=abc").unwrap();
        assert_eq!(denied.error.as_deref(), Some("access_denied"));
    }

    #[test]
    fn test_state_mismatch_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = new_authenticator(&dir);

        let callback = Callback {
            code: Some("code".into()),
            state: Some("forged-state".into()),
            error: None,
        };

        let result = authenticator.complete(callback, |_| -> Result<HttpResponse, io::Error> {
            panic!("the code must not be exchanged")
        });

        let err = result.err().unwrap();
        match err.downcast_ref::<AuthError>() {
            Some(AuthError::StateMismatch(state)) => assert_eq!(state, "forged-state"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!dir.path().join("token_cache.json").exists());
    }

    #[test]
    fn test_provider_error_and_missing_code() {
        let issued = CsrfToken::new("s".into());

        let denied = Callback {
            code: None,
            state: Some("s".into()),
            error: Some("access_denied".into()),
        };
        assert!(matches!(denied.verify(&issued), Err(AuthError::ProviderError(_))));

        let missing = Callback {
            code: None,
            state: Some("s".into()),
            error: None,
        };
        assert!(matches!(missing.verify(&issued), Err(AuthError::MissingCode)));
    }

    #[test]
    fn test_complete_saves_token() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = new_authenticator(&dir);

        let callback = Callback {
            code: Some("the-code".into()),
            state: Some("issued-state".into()),
            error: None,
        };

        let authenticated = authenticator
            .complete(callback, |request: HttpRequest| {
                let body = String::from_utf8_lossy(&request.body).to_string();
                assert!(body.contains("grant_type=authorization_code"));
                assert!(body.contains("code=the-code"));
                json_response(r#"{"access_token":"access","token_type":"bearer","expires_in":3600,"refresh_token":"refresh"}"#)
            })
            .unwrap();

        assert_eq!(authenticated.token().access_token, "access");

        let saved = TokenStore::new(dir.path().join("token_cache.json")).load().unwrap();
        assert_eq!(&saved, authenticated.token());
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh"));
        assert!(saved.expiry.is_some());
    }

    #[test]
    fn test_failed_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = new_authenticator(&dir);

        let callback = Callback {
            code: Some("the-code".into()),
            state: Some("issued-state".into()),
            error: None,
        };

        let result = authenticator.complete(callback, |_| -> Result<HttpResponse, io::Error> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        });

        let err = result.err().unwrap();
        assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::Exchange(_))));
        assert!(!dir.path().join("token_cache.json").exists());
    }

    #[test]
    fn test_listener_accepts_callback() {
        let listener = CallbackListener::bind("127.0.0.1:0", "/callback", std::time::Duration::from_secs(5)).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();

            write!(stream, "GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
            write!(
                stream,
                "GET /callback?code=abc&state=xyz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
            )
            .unwrap();

            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        let callback = listener.accept().unwrap();
        assert_eq!(callback.code.as_deref(), Some("abc"));
        assert_eq!(callback.state.as_deref(), Some("xyz"));

        let response = client.join().unwrap();
        assert!(response.contains(CALLBACK_PAGE));
    }

    #[test]
    fn test_listener_times_out() {
        let listener = CallbackListener::bind("127.0.0.1:0", "/callback", std::time::Duration::from_millis(50)).unwrap();
        assert!(matches!(listener.accept(), Err(AuthError::Timeout(_))));
    }

    #[test]
    fn test_token_source_keeps_fresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token_cache.json"));
        let now = Utc::now();

        let token = Token {
            access_token: "fresh".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("refresh".into()),
            expiry: Some(now + ChronoDuration::hours(1)),
        };
        let source = TokenSource::new(new_oauth(), store, token);

        let access = source
            .access_token_with(now, |_| -> Result<HttpResponse, io::Error> { panic!("no refresh expected") })
            .unwrap();
        assert_eq!(access, "fresh");
    }

    #[test]
    fn test_token_source_refreshes_expired_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token_cache.json"));
        let now = Utc::now();

        let token = Token {
            access_token: "stale".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("refresh".into()),
            expiry: Some(now - ChronoDuration::minutes(1)),
        };
        let source = TokenSource::new(new_oauth(), store.clone(), token);

        let access = source
            .access_token_with(now, |request: HttpRequest| {
                let body = String::from_utf8_lossy(&request.body).to_string();
                assert!(body.contains("grant_type=refresh_token"));
                assert!(body.contains("refresh_token=refresh"));
                json_response(r#"{"access_token":"renewed","token_type":"bearer","expires_in":3600}"#)
            })
            .unwrap();
        assert_eq!(access, "renewed");

        let saved = store.load().unwrap();
        assert_eq!(saved.access_token, "renewed");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh"));
        assert!(!saved.is_expired(now));
    }

    #[test]
    fn test_token_source_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token_cache.json"));
        let now = Utc::now();

        let token = Token {
            access_token: "stale".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: Some(now - ChronoDuration::minutes(1)),
        };
        let source = TokenSource::new(new_oauth(), store, token);

        let err = source
            .access_token_with(now, |_| -> Result<HttpResponse, io::Error> { panic!("no refresh expected") })
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::NoRefreshToken)));
    }
}
