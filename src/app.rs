use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::auth;
use crate::config;
use crate::data::{FeedService, RedditFeedService};
use crate::logging;
use crate::reddit::{self, TokenProvider};
use crate::session;
use crate::storage::{self, SecretStore};
use crate::ui;

/// Everything the UI and the CLI flags share.
struct Services {
    cfg: config::Config,
    session: Arc<session::Manager>,
    feed: Arc<dyn FeedService>,
}

fn build_services() -> Result<Services> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let store: Arc<dyn SecretStore> = match storage::Store::open(storage::Options::default()) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "app: secure store unavailable, tokens kept in memory");
            Arc::new(storage::MemoryStore::new())
        }
    };

    let flow = match cfg.auth_config() {
        Some(auth_cfg) => match auth::Flow::new(auth_cfg) {
            Ok(flow) => Some(Arc::new(flow)),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "app: sign-in disabled");
                None
            }
        },
        None => None,
    };
    let session = Arc::new(session::Manager::new(store, flow));

    let client = reddit::Client::new(reddit::ClientConfig {
        user_agent: cfg.reddit.user_agent.clone(),
        page_size: Some(cfg.feed.page_size),
        ..Default::default()
    })
    .context("create reddit client")?;
    let tokens: Arc<dyn TokenProvider> = session.clone();
    let feed: Arc<dyn FeedService> =
        Arc::new(RedditFeedService::new(Arc::new(client), Some(tokens)));

    Ok(Services { cfg, session, feed })
}

pub fn run() -> Result<()> {
    let log_path = logging::init();
    info!(version = crate::VERSION, log = ?log_path, "lurk starting");

    let services = build_services()?;
    let display_path = friendly_path(config::default_path().as_ref());
    let status = if services.session.can_sign_in() {
        "Browsing r/popular. Press Tab to switch tabs, q to quit.".to_string()
    } else {
        format!(
            "Browsing r/popular. Add reddit.client_id to {} to enable sign-in.",
            display_path
        )
    };

    let options = ui::Options {
        status_message: status,
        feed_service: services.feed.clone(),
        session: services.session.clone(),
        communities: services.cfg.feed.communities.clone(),
        home_url: services.cfg.feed.home_url.clone(),
        viewer: services.cfg.viewer_config(),
        mpv: services.cfg.mpv_options(),
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()?;
    info!("lurk exiting");
    Ok(())
}

/// Runs the authorization flow without the terminal UI and stores the token.
pub fn login() -> Result<()> {
    logging::init();
    let services = build_services()?;
    if !services.session.can_sign_in() {
        let path = friendly_path(config::default_path().as_ref());
        anyhow::bail!("set reddit.client_id in {path} (or LURK_REDDIT__CLIENT_ID) first");
    }
    let authz = services.session.begin_login()?;
    println!("Open this URL to authorize lurk:\n\n  {}\n", authz.browser_url);
    if let Err(err) = webbrowser::open(&authz.browser_url) {
        println!("(could not open a browser automatically: {err})");
    }
    println!("Waiting for the redirect to {} …", authz.redirect_uri);
    services.session.complete_login(&authz)?;
    println!("Signed in.");
    Ok(())
}

pub fn logout() -> Result<()> {
    logging::init();
    let services = build_services()?;
    services.session.restore();
    services.session.sign_out()?;
    println!("Signed out.");
    Ok(())
}

/// Stores the Reddit app id (and optional secret) in the config file.
pub fn set_client_id(client_id: &str, client_secret: &str) -> Result<()> {
    let path = config::save_reddit_credentials(None, client_id, client_secret)?;
    println!("Saved Reddit app credentials to {}", friendly_path(Some(&path)));
    Ok(())
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/lurk/config.yaml".to_string()
    }
}
