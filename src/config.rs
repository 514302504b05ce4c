use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth;
use crate::video::MpvOptions;
use crate::viewer::ViewerConfig;

const DEFAULT_ENV_PREFIX: &str = "LURK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub viewer: ViewerSettings,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: default_user_agent(),
            scopes: default_scopes(),
            redirect_uri: default_redirect_uri(),
        }
    }
}

fn default_user_agent() -> String {
    format!("lurk/{} (terminal reddit reader)", crate::VERSION)
}

fn default_scopes() -> Vec<String> {
    vec![
        "identity".into(),
        "read".into(),
        "mysubreddits".into(),
        "history".into(),
    ]
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:65010/lurk/callback".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_communities")]
    pub communities: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Opened in the browser from the communities picker.
    #[serde(default = "default_home_url")]
    pub home_url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            communities: default_communities(),
            page_size: default_page_size(),
            home_url: default_home_url(),
        }
    }
}

fn default_communities() -> Vec<String> {
    vec![
        "ClaudeAI".into(),
        "ClaudeCode".into(),
        "codex".into(),
        "singularity".into(),
    ]
}

fn default_page_size() -> u32 {
    crate::reddit::PAGE_SIZE
}

fn default_home_url() -> String {
    "https://reddit.com/top/?sort=top&t=day".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerSettings {
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold: f64,
    #[serde(default = "default_dismiss_threshold")]
    pub dismiss_threshold: f64,
    #[serde(default = "default_page_duration", with = "humantime_serde")]
    pub page_duration: Duration,
    #[serde(default = "default_fade_duration", with = "humantime_serde")]
    pub fade_duration: Duration,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            swipe_threshold: default_swipe_threshold(),
            dismiss_threshold: default_dismiss_threshold(),
            page_duration: default_page_duration(),
            fade_duration: default_fade_duration(),
        }
    }
}

fn default_swipe_threshold() -> f64 {
    50.0
}

fn default_dismiss_threshold() -> f64 {
    100.0
}

fn default_page_duration() -> Duration {
    Duration::from_millis(250)
}

fn default_fade_duration() -> Duration {
    Duration::from_millis(200)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_mpv_command")]
    pub mpv_command: String,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_controls_timeout", with = "humantime_serde")]
    pub controls_timeout: Duration,
    #[serde(default = "default_skip_seconds")]
    pub skip_seconds: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mpv_command: default_mpv_command(),
            fullscreen: false,
            user_agent: None,
            controls_timeout: default_controls_timeout(),
            skip_seconds: default_skip_seconds(),
        }
    }
}

fn default_mpv_command() -> String {
    "mpv".into()
}

fn default_controls_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_skip_seconds() -> f64 {
    10.0
}

impl Config {
    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            swipe_threshold: self.viewer.swipe_threshold,
            dismiss_threshold: self.viewer.dismiss_threshold,
            page_duration: self.viewer.page_duration,
            fade_duration: self.viewer.fade_duration,
            controls_timeout: self.player.controls_timeout,
            skip_seconds: self.player.skip_seconds,
            ..ViewerConfig::default()
        }
    }

    pub fn mpv_options(&self) -> MpvOptions {
        MpvOptions {
            command: self.player.mpv_command.clone(),
            user_agent: self.player.user_agent.clone(),
            fullscreen: self.player.fullscreen,
            ..MpvOptions::default()
        }
    }

    /// `None` until a client id is configured.
    pub fn auth_config(&self) -> Option<auth::Config> {
        if self.reddit.client_id.trim().is_empty() {
            return None;
        }
        Some(auth::Config {
            client_id: self.reddit.client_id.clone(),
            client_secret: self.reddit.client_secret.clone(),
            scope: self.reddit.scopes.clone(),
            user_agent: self.reddit.user_agent.clone(),
            redirect_uri: self.reddit.redirect_uri.clone(),
            ..auth::Config::default()
        })
    }

    fn fill_blanks(&mut self) {
        if self.reddit.user_agent.trim().is_empty() {
            self.reddit.user_agent = default_user_agent();
        }
        if self.reddit.scopes.is_empty() {
            self.reddit.scopes = default_scopes();
        }
        if self.reddit.redirect_uri.trim().is_empty() {
            self.reddit.redirect_uri = default_redirect_uri();
        }
        if self.feed.page_size == 0 {
            self.feed.page_size = default_page_size();
        }
        if self.player.mpv_command.trim().is_empty() {
            self.player.mpv_command = default_mpv_command();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

/// Defaults, then the YAML file, then `LURK_*` environment overrides.
pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.clone().or_else(default_config_path);
    let mut cfg = match path {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "config: reading file");
            read_config_file(&path)?
        }
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);
    cfg.fill_blanks();
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.client_id" => cfg.reddit.client_id = value,
        "reddit.client_secret" => cfg.reddit.client_secret = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.redirect_uri" => cfg.reddit.redirect_uri = value,
        "reddit.scopes" => cfg.reddit.scopes = split_list(&value),
        "feed.communities" => cfg.feed.communities = split_list(&value),
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.home_url" => cfg.feed.home_url = value,
        "viewer.swipe_threshold" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.viewer.swipe_threshold = parsed;
            }
        }
        "viewer.dismiss_threshold" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.viewer.dismiss_threshold = parsed;
            }
        }
        "viewer.page_duration" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.viewer.page_duration = duration;
            }
        }
        "viewer.fade_duration" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.viewer.fade_duration = duration;
            }
        }
        "player.mpv_command" => cfg.player.mpv_command = value,
        "player.fullscreen" => {
            cfg.player.fullscreen = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "player.user_agent" => cfg.player.user_agent = Some(value),
        "player.controls_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.player.controls_timeout = duration;
            }
        }
        "player.skip_seconds" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.player.skip_seconds = parsed;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lurk").join("config.yaml"))
}

/// Writes the Reddit app credentials into the config file, keeping everything else.
pub fn save_reddit_credentials(
    path: Option<PathBuf>,
    client_id: &str,
    client_secret: &str,
) -> Result<PathBuf> {
    let client_id = client_id.trim();
    let client_secret = client_secret.trim();

    anyhow::ensure!(
        !client_id.is_empty(),
        "config: reddit.client_id is required"
    );

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.reddit.client_id = client_id.to_string();
    cfg.reddit.client_secret = client_secret.to_string();
    cfg.fill_blanks();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/lurk/config.yaml")),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated("LURKTEST_DEFAULTS")).unwrap();
        assert_eq!(cfg.reddit.redirect_uri, default_redirect_uri());
        assert_eq!(cfg.feed.communities.len(), 4);
        assert_eq!(cfg.player.controls_timeout, Duration::from_secs(2));
        let viewer = cfg.viewer_config();
        assert_eq!(viewer.swipe_threshold, 50.0);
        assert_eq!(viewer.dismiss_threshold, 100.0);
        assert!(cfg.auth_config().is_none());
    }

    #[test]
    fn file_values_and_humantime_durations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "reddit:\n  client_id: abc\nplayer:\n  controls_timeout: 1500ms\nfeed:\n  communities: [rust]\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("LURKTEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.player.controls_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.feed.communities, vec!["rust".to_string()]);
        assert_eq!(cfg.reddit.user_agent, default_user_agent());
        let auth = cfg.auth_config().unwrap();
        assert_eq!(auth.client_id, "abc");
    }

    #[test]
    fn save_credentials_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_reddit_credentials(Some(path.clone()), "client", "").unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.reddit.client_id, "client");
        assert_eq!(saved.reddit.scopes, default_scopes());
    }

    #[test]
    fn env_overrides() {
        env::set_var("LURKTEST_ENV_PLAYER__CONTROLS_TIMEOUT", "1s");
        env::set_var("LURKTEST_ENV_FEED__COMMUNITIES", "rust, linux");
        let cfg = load(isolated("LURKTEST_ENV")).unwrap();
        assert_eq!(cfg.player.controls_timeout, Duration::from_secs(1));
        assert_eq!(cfg.feed.communities, vec!["rust".to_string(), "linux".to_string()]);
        env::remove_var("LURKTEST_ENV_PLAYER__CONTROLS_TIMEOUT");
        env::remove_var("LURKTEST_ENV_FEED__COMMUNITIES");
    }
}
