//! OAuth2 credentials for the Gmail API.
//!
//! Tokens are kept in an authorized-user file (`token.json`) compatible with
//! Google's client libraries. A valid token is reused, an expired one is
//! refreshed, and when neither works the installed-app loopback flow runs
//! against the client secrets file (`credentials.json`).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret as OAuthClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TriageError};

/// Scope needed to read messages and change their labels.
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

/// Contents of `token.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizedUser {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUser {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TriageError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| TriageError::Auth(format!("cannot parse {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TriageError::Auth(format!("cannot serialize token: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TriageError::io(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| TriageError::io(path, e))?;
        debug!(path = %path.display(), "Token saved");
        Ok(())
    }

    /// An access token is present, covers `scope`, and is not about to expire.
    pub fn is_valid(&self, scope: &str, now: DateTime<Utc>) -> bool {
        let Some(token) = &self.token else {
            return false;
        };
        if token.is_empty() {
            return false;
        }
        if !self.scopes.is_empty() && !self.scopes.iter().any(|s| s == scope) {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - TimeDelta::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    fn apply(&mut self, response: &BasicTokenResponse, now: DateTime<Utc>) {
        self.token = Some(response.access_token().secret().clone());
        if let Some(refresh) = response.refresh_token() {
            self.refresh_token = Some(refresh.secret().clone());
        }
        self.expiry = response
            .expires_in()
            .and_then(|d| TimeDelta::from_std(d).ok())
            .map(|delta| now + delta);
        if let Some(scopes) = response.scopes() {
            self.scopes = scopes.iter().map(|s| s.as_str().to_owned()).collect();
        }
    }
}

/// One section of `credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Read the `installed` (preferred) or `web` section.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TriageError::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)
            .map_err(|e| TriageError::Auth(format!("cannot parse client secrets: {e}")))?;
        file.installed.or(file.web).ok_or_else(|| {
            TriageError::Auth("client secrets file has neither an 'installed' nor a 'web' section".into())
        })
    }

    fn loopback_client(&self, redirect_uri: &str) -> Result<GoogleClient> {
        let client = oauth_client(&self.client_id, &self.client_secret, &self.auth_uri, &self.token_uri)?;
        let redirect = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| TriageError::Auth(format!("invalid redirect uri '{redirect_uri}': {e}")))?;
        Ok(client.set_redirect_uri(redirect))
    }

    /// Consent page URL for the loopback flow, with a fresh CSRF state and
    /// PKCE challenge. The verifier is needed again for the code exchange.
    pub fn consent_url(
        &self,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<(Url, CsrfToken, PkceCodeVerifier)> {
        let client = self.loopback_client(redirect_uri)?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state) = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_scope(Scope::new(scope.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        Ok((url, state, pkce_verifier))
    }
}

/// Google client with the authorization and token endpoints configured.
type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn oauth_client(
    client_id: &str,
    client_secret: &str,
    auth_uri: &str,
    token_uri: &str,
) -> Result<GoogleClient> {
    let auth_url = AuthUrl::new(auth_uri.to_string())
        .map_err(|e| TriageError::Auth(format!("invalid auth_uri '{auth_uri}': {e}")))?;
    let token_url = TokenUrl::new(token_uri.to_string())
        .map_err(|e| TriageError::Auth(format!("invalid token_uri '{token_uri}': {e}")))?;
    Ok(BasicClient::new(ClientId::new(client_id.to_string()))
        .set_client_secret(OAuthClientSecret::new(client_secret.to_string()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url))
}

/// HTTP client for the token endpoint. Redirects are not followed.
fn token_http_client() -> Result<Client> {
    Ok(Client::builder().redirect(Policy::none()).build()?)
}

/// Return a usable access token, refreshing or re-authorizing as needed.
///
/// Whatever token ends up being used is written back to `token_file`.
pub fn access_token(credentials_file: &Path, token_file: &Path) -> Result<String> {
    info!("Performing authentication");
    let now = Utc::now();

    let mut user = if token_file.exists() {
        match AuthorizedUser::load(token_file) {
            Ok(user) => {
                info!(path = %token_file.display(), "Token file found");
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable token file");
                None
            }
        }
    } else {
        None
    };

    if let Some(user) = &user {
        if user.is_valid(GMAIL_MODIFY_SCOPE, now) {
            info!("Authentication successful");
            return token_of(user);
        }
    }

    let http = token_http_client()?;
    let refreshed = match user.as_mut() {
        Some(u) if u.can_refresh() => {
            info!("Refreshing access token");
            match refresh(&http, u, now) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, falling back to consent flow");
                    false
                }
            }
        }
        _ => false,
    };

    let user = if refreshed {
        user.ok_or_else(|| TriageError::Auth("token disappeared during refresh".into()))?
    } else {
        let secret = ClientSecret::load(credentials_file)?;
        run_loopback_flow(&http, &secret)?
    };

    user.save(token_file)?;
    info!("Authentication successful");
    token_of(&user)
}

fn token_of(user: &AuthorizedUser) -> Result<String> {
    user.token
        .clone()
        .ok_or_else(|| TriageError::Auth("no access token available".into()))
}

fn refresh(http: &Client, user: &mut AuthorizedUser, now: DateTime<Utc>) -> Result<()> {
    let refresh_token = RefreshToken::new(user.refresh_token.clone().unwrap_or_default());
    let client = oauth_client(&user.client_id, &user.client_secret, DEFAULT_AUTH_URI, &user.token_uri)?;
    let response = client
        .exchange_refresh_token(&refresh_token)
        .request(http)
        .map_err(|e| TriageError::Auth(format!("token refresh failed: {}", token_error(&e))))?;
    user.apply(&response, now);
    Ok(())
}

fn token_error<RE: std::error::Error + 'static>(
    error: &RequestTokenError<RE, BasicErrorResponse>,
) -> String {
    match error {
        RequestTokenError::ServerResponse(response) => match response.error_description() {
            Some(description) => format!("{}: {description}", response.error()),
            None => response.error().to_string(),
        },
        RequestTokenError::Parse(e, body) => {
            format!("unexpected token response ({e}): {}", excerpt(&String::from_utf8_lossy(body)))
        }
        other => other.to_string(),
    }
}

/// Installed-app flow: send the user to the consent page and catch the
/// redirect on a one-shot local listener.
fn run_loopback_flow(http: &Client, secret: &ClientSecret) -> Result<AuthorizedUser> {
    let listener =
        TcpListener::bind("127.0.0.1:0").map_err(|e| TriageError::Auth(format!("cannot bind loopback listener: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| TriageError::Auth(format!("cannot read listener address: {e}")))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");
    let (url, state, pkce_verifier) = secret.consent_url(&redirect_uri, GMAIL_MODIFY_SCOPE)?;

    eprintln!("Please visit this URL to authorize this application:\n{url}");
    info!(port, "Waiting for the authorization redirect");

    let (mut stream, _) = listener
        .accept()
        .map_err(|e| TriageError::Auth(format!("loopback listener failed: {e}")))?;
    let mut request_line = String::new();
    BufReader::new(&stream)
        .read_line(&mut request_line)
        .map_err(|e| TriageError::Auth(format!("cannot read redirect request: {e}")))?;

    let outcome = parse_redirect(&request_line, &state);
    let page = match &outcome {
        Ok(_) => "The authentication flow has completed. You may close this window.",
        Err(_) => "Authentication failed. Check the terminal for details.",
    };
    let reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
        page.len()
    );
    if let Err(e) = stream.write_all(reply.as_bytes()) {
        debug!(error = %e, "Could not answer the browser");
    }
    let code = outcome?;

    let response = secret
        .loopback_client(&redirect_uri)?
        .exchange_code(code)
        .set_pkce_verifier(pkce_verifier)
        .request(http)
        .map_err(|e| TriageError::Auth(format!("code exchange failed: {}", token_error(&e))))?;

    let mut user = AuthorizedUser {
        token: None,
        refresh_token: None,
        token_uri: secret.token_uri.clone(),
        client_id: secret.client_id.clone(),
        client_secret: secret.client_secret.clone(),
        scopes: vec![GMAIL_MODIFY_SCOPE.to_string()],
        expiry: None,
    };
    user.apply(&response, Utc::now());
    Ok(user)
}

/// Pull the authorization code out of `GET /?code=...&state=... HTTP/1.1`.
fn parse_redirect(request_line: &str, expected_state: &CsrfToken) -> Result<AuthorizationCode> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| TriageError::Auth("malformed redirect request".into()))?;
    let url = Url::parse("http://127.0.0.1")
        .and_then(|base| base.join(target))
        .map_err(|e| TriageError::Auth(format!("malformed redirect target: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(TriageError::Auth(format!("authorization denied: {value}")));
            }
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state.secret().as_str()) {
        return Err(TriageError::Auth("state mismatch in authorization redirect".into()));
    }
    code.map(AuthorizationCode::new)
        .ok_or_else(|| TriageError::Auth("authorization redirect carried no code".into()))
}

pub(crate) fn excerpt(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::gmail::test_server::serve;
    use chrono::TimeZone;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields};
    use std::time::Duration;

    fn user(expiry: Option<DateTime<Utc>>) -> AuthorizedUser {
        AuthorizedUser {
            token: Some("ya29.token".into()),
            refresh_token: Some("1//refresh".into()),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: vec![GMAIL_MODIFY_SCOPE.into()],
            expiry,
        }
    }

    #[test]
    fn test_token_validity() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(user(None).is_valid(GMAIL_MODIFY_SCOPE, now));
        assert!(user(Some(now + TimeDelta::hours(1))).is_valid(GMAIL_MODIFY_SCOPE, now));
        assert!(!user(Some(now + TimeDelta::seconds(30))).is_valid(GMAIL_MODIFY_SCOPE, now));
        assert!(!user(Some(now - TimeDelta::hours(1))).is_valid(GMAIL_MODIFY_SCOPE, now));
        assert!(!user(None).is_valid("https://www.googleapis.com/auth/gmail.readonly", now));

        let mut no_token = user(None);
        no_token.token = None;
        assert!(!no_token.is_valid(GMAIL_MODIFY_SCOPE, now));
    }

    #[test]
    fn test_parse_python_style_token_file() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/gmail.modify"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2024-05-01T12:34:56.123456Z"
        }"#;
        let user: AuthorizedUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.token.as_deref(), Some("ya29.a0"));
        assert!(user.can_refresh());
        assert!(user.expiry.is_some());
    }

    #[test]
    fn test_token_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let original = user(Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        original.save(&path).unwrap();
        assert_eq!(AuthorizedUser::load(&path).unwrap(), original);
    }

    #[test]
    fn test_apply_token_response_keeps_refresh_token() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut response = BasicTokenResponse::new(
            AccessToken::new("new".into()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        response.set_expires_in(Some(&Duration::from_secs(3599)));

        let mut u = user(None);
        u.apply(&response, now);
        assert_eq!(u.token.as_deref(), Some("new"));
        assert_eq!(u.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(u.expiry, Some(now + TimeDelta::seconds(3599)));
        assert_eq!(u.scopes, vec![GMAIL_MODIFY_SCOPE.to_string()]);
    }

    #[test]
    fn test_refresh_against_token_endpoint() {
        let (base, server) = serve(vec![(
            200,
            r#"{"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer",
                "scope": "https://www.googleapis.com/auth/gmail.modify"}"#
                .into(),
        )]);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut u = user(Some(now - TimeDelta::hours(1)));
        u.token_uri = format!("{base}/token");

        refresh(&token_http_client().unwrap(), &mut u, now).unwrap();
        assert_eq!(u.token.as_deref(), Some("ya29.fresh"));
        assert_eq!(u.refresh_token.as_deref(), Some("1//refresh"));
        assert!(u.is_valid(GMAIL_MODIFY_SCOPE, now));

        let seen = server.join().unwrap();
        assert!(seen[0].request_line.starts_with("POST /token"));
        assert!(seen[0].body.contains("grant_type=refresh_token"));
        assert!(seen[0].body.contains("refresh_token=1%2F%2Frefresh"));
    }

    #[test]
    fn test_refresh_rejected_by_token_endpoint() {
        let (base, server) = serve(vec![(
            400,
            r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#
                .into(),
        )]);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut u = user(None);
        u.token_uri = format!("{base}/token");

        let err = refresh(&token_http_client().unwrap(), &mut u, now).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid_grant"), "{message}");
        assert!(message.contains("expired or revoked"), "{message}");
        assert_eq!(u.token.as_deref(), Some("ya29.token"));
        server.join().unwrap();
    }

    #[test]
    fn test_client_secrets_sections() {
        let installed = r#"{"installed": {"client_id": "a", "client_secret": "b",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]}}"#;
        assert_eq!(ClientSecret::from_json(installed).unwrap().client_id, "a");

        let web = r#"{"web": {"client_id": "w", "client_secret": "x"}}"#;
        let secret = ClientSecret::from_json(web).unwrap();
        assert_eq!(secret.client_id, "w");
        assert_eq!(secret.token_uri, DEFAULT_TOKEN_URI);

        assert!(ClientSecret::from_json("{}").is_err());
    }

    #[test]
    fn test_consent_url() {
        let secret = ClientSecret::from_json(r#"{"installed": {"client_id": "cid", "client_secret": "s"}}"#).unwrap();
        let (url, state, _verifier) = secret
            .consent_url("http://127.0.0.1:8080/", GMAIL_MODIFY_SCOPE)
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let has = |key: &str, value: &str| pairs.contains(&(key.to_string(), value.to_string()));
        assert!(has("client_id", "cid"));
        assert!(has("scope", GMAIL_MODIFY_SCOPE));
        assert!(has("redirect_uri", "http://127.0.0.1:8080/"));
        assert!(has("state", state.secret()));
        assert!(has("code_challenge_method", "S256"));
        assert!(has("access_type", "offline"));
        assert!(pairs.iter().any(|(k, _)| k == "code_challenge"));
    }

    #[test]
    fn test_consent_state_is_fresh_each_time() {
        let secret = ClientSecret::from_json(r#"{"installed": {"client_id": "cid", "client_secret": "s"}}"#).unwrap();
        let (_, first, _) = secret.consent_url("http://127.0.0.1:1/", GMAIL_MODIFY_SCOPE).unwrap();
        let (_, second, _) = secret.consent_url("http://127.0.0.1:1/", GMAIL_MODIFY_SCOPE).unwrap();
        assert_ne!(first.secret(), second.secret());
    }

    #[test]
    fn test_parse_redirect() {
        let state = CsrfToken::new("abc".into());
        let line = "GET /?state=abc&code=4%2F0AX&scope=x HTTP/1.1\r\n";
        assert_eq!(parse_redirect(line, &state).unwrap().secret(), "4/0AX");
        assert!(parse_redirect(line, &CsrfToken::new("other".into())).is_err());
        assert!(parse_redirect("GET /?error=access_denied&state=abc HTTP/1.1", &state).is_err());
        assert!(parse_redirect("GET /?state=abc HTTP/1.1", &state).is_err());
        assert!(parse_redirect("garbage", &state).is_err());
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short"), "short");
        let long = "x".repeat(300);
        assert_eq!(excerpt(&long).len(), 203);
    }
}
