use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use once_cell::sync::Lazy;
use rand::RngCore;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tiny_http::{Header, Method, Response, Server};
use tracing::{debug, info, warn};
use url::Url;

static HTML_SUCCESS: Lazy<String> = Lazy::new(|| {
    r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Lurk Sign-in Complete</title>
    <style>
      body {
        margin: 0;
        min-height: 100vh;
        display: flex;
        align-items: center;
        justify-content: center;
        background: #000000;
        color: #ffffff;
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif;
      }
      .card {
        background: #1a1a1a;
        border: 1px solid #333333;
        padding: 2.5rem 3rem;
        border-radius: 16px;
        max-width: 440px;
        text-align: center;
      }
      h1 {
        margin: 0 0 1rem;
        color: #ff4500;
      }
      p {
        margin: 0;
        line-height: 1.5;
        color: #888888;
      }
    </style>
  </head>
  <body>
    <main class="card">
      <h1>Signed in</h1>
      <p>Lurk can now load your home feed. Close this tab and return to the terminal.</p>
    </main>
  </body>
</html>"#
        .to_string()
});

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub scope: Vec<String>,
    pub user_agent: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scope: vec![
                "identity".into(),
                "read".into(),
                "mysubreddits".into(),
                "history".into(),
            ],
            user_agent: format!("lurk/{}", crate::VERSION),
            auth_url: "https://www.reddit.com/api/v1/authorize.compact".into(),
            token_url: "https://www.reddit.com/api/v1/access_token".into(),
            redirect_uri: "http://127.0.0.1:65010/lurk/callback".into(),
            timeout: Duration::from_secs(300),
        }
    }
}

pub struct Flow {
    cfg: Config,
    client: Client,
}

/// An authorization in progress: the URL to open in a browser plus the
/// loopback listener waiting for the redirect.
pub struct AuthorizationRequest {
    pub browser_url: String,
    pub redirect_uri: String,
    rx: Receiver<AuthResult>,
    shutdown: Sender<()>,
}

impl Drop for AuthorizationRequest {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

struct AuthResult {
    code: Option<String>,
    error: Option<anyhow::Error>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Flow {
    pub fn new(cfg: Config) -> Result<Self> {
        if cfg.client_id.trim().is_empty() {
            bail!("auth: client id is required");
        }
        if cfg.user_agent.trim().is_empty() {
            bail!("auth: user agent is required");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("auth: build http client")?;

        Ok(Self { cfg, client })
    }

    pub fn begin(&self) -> Result<AuthorizationRequest> {
        let state = random_string(32);
        let redirect = Url::parse(&self.cfg.redirect_uri).context("auth: parse redirect uri")?;

        let host = redirect.host_str().unwrap_or("127.0.0.1");
        let port = redirect.port().unwrap_or(0);
        let path = if redirect.path().is_empty() {
            "/"
        } else {
            redirect.path()
        };

        let listen_addr = format!("{}:{}", host, port);
        let server = Server::http(&listen_addr).map_err(|err| anyhow!("auth: listen: {}", err))?;
        let actual_addr = server.server_addr();
        let actual_redirect = Url::parse(&format!("http://{}{}", actual_addr, path))?;
        let auth_url = self.authorize_url(actual_redirect.as_str(), &state)?;
        debug!(redirect = %actual_redirect, "auth: waiting for redirect");

        let (result_tx, result_rx) = bounded::<AuthResult>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(250)) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(err) => {
                    let _ = result_tx.send(AuthResult {
                        code: None,
                        error: Some(anyhow!("auth: redirect listener failed: {}", err)),
                    });
                    break;
                }
            };
            match handle_redirect(request, &state, &result_tx) {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => {
                    let _ = result_tx.send(AuthResult {
                        code: None,
                        error: Some(err),
                    });
                    break;
                }
            }
        });

        Ok(AuthorizationRequest {
            browser_url: auth_url,
            redirect_uri: actual_redirect.to_string(),
            rx: result_rx,
            shutdown: shutdown_tx,
        })
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let mut auth = Url::parse(&self.cfg.auth_url).context("auth: parse authorize url")?;
        auth.query_pairs_mut()
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("response_type", "code")
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("duration", "permanent")
            .append_pair("scope", &self.cfg.scope.join(" "));
        Ok(auth.to_string())
    }

    /// Blocks until the browser is redirected back, then trades the code for tokens.
    pub fn complete(&self, authz: &AuthorizationRequest) -> Result<TokenGrant> {
        let code = self.wait_for_code(authz)?;
        self.exchange_code(&code, &authz.redirect_uri)
    }

    fn wait_for_code(&self, authz: &AuthorizationRequest) -> Result<String> {
        match authz.rx.recv_timeout(self.cfg.timeout) {
            Ok(AuthResult {
                code: Some(code),
                error: None,
            }) => Ok(code),
            Ok(AuthResult {
                error: Some(err), ..
            }) => Err(err),
            Ok(_) => Err(anyhow!("auth: authorization cancelled")),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!("auth: timed out waiting for redirect")),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("auth: redirect listener closed")),
        }
    }

    pub fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        if code.trim().is_empty() {
            bail!("auth: authorization code is empty");
        }
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let resp = self
            .client
            .post(&self.cfg.token_url)
            .header(USER_AGENT, self.cfg.user_agent.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .basic_auth(&self.cfg.client_id, Some(self.cfg.client_secret.as_str()))
            .form(&form)
            .send()
            .context("auth: token request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<TokenError>(&body) {
                bail!("auth: token request failed ({}): {}", status, err);
            }
            bail!("auth: token request failed ({}): {}", status, body);
        }

        let payload: TokenResponse = resp.json().context("auth: decode token response")?;
        if let Some(error) = payload.error.filter(|e| !e.is_empty()) {
            bail!("auth: token request rejected: {}", error);
        }
        if payload.access_token.is_empty() {
            bail!("auth: missing access token");
        }
        info!(
            scope = %payload.scope,
            has_refresh = !payload.refresh_token.is_empty(),
            "auth: code exchanged"
        );

        Ok(TokenGrant {
            access_token: payload.access_token,
            refresh_token: Some(payload.refresh_token).filter(|token| !token.is_empty()),
        })
    }
}

fn random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn handle_redirect(req: tiny_http::Request, state: &str, tx: &Sender<AuthResult>) -> Result<bool> {
    if req.method() != &Method::Get {
        let _ = req.respond(Response::from_string("method not allowed").with_status_code(405));
        return Ok(false);
    }

    let url = Url::parse(&format!("http://loopback{}", req.url()))?;
    let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
    if params.is_empty() {
        // favicon and other stray browser requests
        let _ = req.respond(Response::from_string("not found").with_status_code(404));
        return Ok(false);
    }

    if params.get("state").map(String::as_str) != Some(state) {
        warn!("auth: redirect state mismatch");
        let _ = req.respond(Response::from_string("state mismatch").with_status_code(400));
        tx.send(AuthResult {
            code: None,
            error: Some(anyhow!("authorization state mismatch")),
        })
        .ok();
        return Ok(true);
    }

    if let Some(error) = params.get("error") {
        let _ = req.respond(Response::from_string("authorization denied").with_status_code(401));
        tx.send(AuthResult {
            code: None,
            error: Some(anyhow!("authorization error: {}", error)),
        })
        .ok();
        return Ok(true);
    }

    let code = match params.get("code") {
        Some(code) if !code.is_empty() => code.clone(),
        _ => {
            let _ = req.respond(Response::from_string("code missing").with_status_code(400));
            tx.send(AuthResult {
                code: None,
                error: Some(anyhow!("authorization code missing")),
            })
            .ok();
            return Ok(true);
        }
    };

    let mut response = Response::from_string(HTML_SUCCESS.clone());
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
    tx.send(AuthResult {
        code: Some(code),
        error: None,
    })
    .ok();
    Ok(true)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default, rename = "error_description")]
    description: String,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error.is_empty() && self.description.is_empty() {
            return write!(f, "unknown token error");
        }
        if self.description.is_empty() {
            write!(f, "authorization error: {}", self.error)
        } else if self.error.is_empty() {
            write!(f, "authorization error: {}", self.description)
        } else {
            write!(
                f,
                "authorization error: {} ({})",
                self.error, self.description
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> Flow {
        Flow::new(Config {
            client_id: "abc123".into(),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn requires_client_id() {
        assert!(Flow::new(Config::default()).is_err());
    }

    #[test]
    fn authorize_url_requests_permanent_code() {
        let url = flow()
            .authorize_url("http://127.0.0.1:65010/lurk/callback", "xyz")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/api/v1/authorize.compact");
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "abc123");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["duration"], "permanent");
        assert_eq!(params["scope"], "identity read mysubreddits history");
    }

    #[test]
    fn random_state_is_url_safe() {
        let state = random_string(32);
        assert!(!state.is_empty());
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(state, random_string(32));
    }

    #[test]
    fn empty_code_is_rejected_before_any_request() {
        let err = flow().exchange_code("  ", "http://127.0.0.1/cb").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn token_grant_debug_redacts() {
        let grant = TokenGrant {
            access_token: "secret".into(),
            refresh_token: Some("also-secret".into()),
        };
        let rendered = format!("{grant:?}");
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn token_error_display() {
        let err = TokenError {
            error: "invalid_grant".into(),
            description: String::new(),
        };
        assert_eq!(err.to_string(), "authorization error: invalid_grant");
    }
}
