//! mpv as the video viewer's player.
//!
//! The viewer keeps the transport controls in the terminal while mpv renders
//! into its own window. Commands and property reads go over mpv's JSON IPC.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::media::VideoSource;
use crate::viewer::{Playback, PlaybackStatus};

#[cfg(unix)]
const IPC_TIMEOUT: Duration = Duration::from_millis(200);
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub command: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub fullscreen: bool,
    pub extra_args: Vec<String>,
}

impl Default for MpvOptions {
    fn default() -> Self {
        Self {
            command: "mpv".into(),
            user_agent: None,
            referer: Some("https://www.reddit.com/".into()),
            fullscreen: false,
            extra_args: Vec::new(),
        }
    }
}

pub struct MpvPlayback {
    opts: MpvOptions,
    source: VideoSource,
    session: Option<Session>,
    ready: bool,
    failure: Option<String>,
    next_request: u64,
    position: Option<f64>,
    duration: Option<f64>,
}

struct Session {
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    handle: Option<thread::JoinHandle<()>>,
    ipc_path: Option<String>,
}

impl Session {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn stop_blocking(mut self) {
        let _ = self.kill_tx.send(());
        let _ = self.status_rx.recv();
        self.finalize();
    }
}

impl MpvPlayback {
    pub fn new(opts: MpvOptions, source: VideoSource) -> Self {
        Self {
            opts,
            source,
            session: None,
            ready: false,
            failure: None,
            next_request: 1,
            position: None,
            duration: None,
        }
    }

    fn spawn(&mut self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            bail!("video URL missing");
        }
        let ipc_path = unique_ipc_path();
        #[cfg(unix)]
        if let Some(path) = &ipc_path {
            cleanup_ipc_path(path);
        }
        let args = build_args(&self.opts, &self.source, ipc_path.as_deref());
        debug!(command = %self.opts.command, ?args, "mpv: spawn");

        let mut command = Command::new(&self.opts.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .with_context(|| format!("launch {} to play {}", self.opts.command, self.source.url))?;

        let (kill_tx, kill_rx) = bounded::<()>(1);
        let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);
        let ipc_cleanup = ipc_path.clone();
        let handle = thread::spawn(move || {
            let stderr_handle = child.stderr.take().map(|stderr| {
                thread::spawn(move || {
                    let reader = BufReader::new(stderr);
                    for line in reader.lines().map_while(Result::ok) {
                        debug!(%line, "mpv stderr");
                    }
                })
            });
            let result = loop {
                if kill_rx.try_recv().is_ok() {
                    let _ = child.kill();
                    break child.wait().context("wait for mpv after stop request");
                }
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) => thread::sleep(Duration::from_millis(30)),
                    Err(err) => break Err(anyhow!(err)).context("poll mpv status"),
                }
            };
            if let Some(handle) = stderr_handle {
                let _ = handle.join();
            }
            if let Some(path) = ipc_cleanup {
                cleanup_ipc_path(&path);
            }
            let _ = status_tx.send(result);
        });

        self.session = Some(Session {
            kill_tx,
            status_rx,
            handle: Some(handle),
            ipc_path,
        });
        Ok(())
    }

    fn ipc_path(&self) -> Result<&str> {
        self.session
            .as_ref()
            .and_then(|session| session.ipc_path.as_deref())
            .ok_or_else(|| anyhow!("video controls are not supported on this platform"))
    }

    fn command(&mut self, args: Value) -> Result<()> {
        let path = self.ipc_path()?.to_string();
        let request_id = self.next_request();
        let payload = json!({ "command": args, "request_id": request_id });
        let replies = exchange(&path, &[(request_id, payload)])?;
        replies.iter().try_for_each(check_reply)
    }

    /// Reads `time-pos` and `duration` over a single IPC connection.
    fn refresh_timeline(&mut self) -> Result<()> {
        let path = self.ipc_path()?.to_string();
        let requests: Vec<(u64, Value)> = ["time-pos", "duration"]
            .into_iter()
            .map(|name| {
                let request_id = self.next_request();
                let payload =
                    json!({ "command": ["get_property", name], "request_id": request_id });
                (request_id, payload)
            })
            .collect();
        let replies = exchange(&path, &requests)?;
        let value = |reply: &Value| {
            check_reply(reply)
                .ok()
                .and_then(|_| reply.get("data").and_then(Value::as_f64))
        };
        self.position = replies.first().and_then(value);
        self.duration = replies.get(1).and_then(value);
        Ok(())
    }

    fn next_request(&mut self) -> u64 {
        let id = self.next_request;
        self.next_request += 1;
        id
    }
}

impl Playback for MpvPlayback {
    fn play(&mut self) -> Result<()> {
        if self.session.is_none() {
            return self.spawn();
        }
        self.command(json!(["set_property", "pause", false]))
    }

    fn pause(&mut self) -> Result<()> {
        if self.session.is_none() || !self.ready {
            return Ok(());
        }
        self.command(json!(["set_property", "pause", true]))
    }

    fn seek_to(&mut self, seconds: f64) -> Result<()> {
        self.command(json!(["seek", seconds.max(0.0), "absolute"]))
    }

    fn status(&mut self) -> PlaybackStatus {
        if let Some(reason) = &self.failure {
            return PlaybackStatus::Failed(reason.clone());
        }
        let Some(session) = self.session.as_mut() else {
            return PlaybackStatus::Loading;
        };
        let exited = match session.status_rx.try_recv() {
            Ok(Ok(status)) => Some(format!("mpv exited ({status})")),
            Ok(Err(err)) => Some(format!("{err:#}")),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some("mpv session closed unexpectedly".into()),
        };
        if let Some(reason) = exited {
            session.finalize();
            self.session = None;
            self.failure = Some(reason.clone());
            return PlaybackStatus::Failed(reason);
        }
        if let Err(err) = self.refresh_timeline() {
            debug!(error = %format!("{err:#}"), "mpv: timeline unavailable");
        }
        if !self.ready && self.duration.is_some() {
            debug!("mpv: ready");
            self.ready = true;
        }
        if self.ready {
            PlaybackStatus::Ready
        } else {
            PlaybackStatus::Loading
        }
    }

    fn position(&mut self) -> Option<f64> {
        self.position
    }

    fn duration(&mut self) -> Option<f64> {
        self.duration
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("mpv: stop");
            session.stop_blocking();
        }
        self.ready = false;
        self.position = None;
        self.duration = None;
    }
}

impl Drop for MpvPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_args(opts: &MpvOptions, source: &VideoSource, ipc_path: Option<&str>) -> Vec<String> {
    let mut args = vec![source.url.clone()];
    if opts.fullscreen {
        args.push("--fullscreen".to_string());
    }
    args.push("--force-window=yes".to_string());
    args.push("--keep-open=no".to_string());
    args.push("--loop-file=inf".to_string());
    args.push("--really-quiet".to_string());
    args.push("--idle=no".to_string());
    args.push("--terminal=no".to_string());
    args.push("--input-terminal=no".to_string());
    args.push("--no-config".to_string());
    args.push("--ytdl=no".to_string());
    args.push("--osc=no".to_string());
    if let Some(path) = ipc_path {
        args.push(format!("--input-ipc-server={path}"));
    }
    if !source.label.is_empty() {
        args.push(format!("--force-media-title={}", source.label));
    }
    let ua = opts
        .user_agent
        .as_deref()
        .filter(|ua| !ua.trim().is_empty())
        .unwrap_or(DEFAULT_USER_AGENT);
    args.push(format!("--http-header-fields=User-Agent: {ua}"));
    if let Some(referer) = opts.referer.as_deref().filter(|r| !r.trim().is_empty()) {
        args.push(format!("--http-header-fields=Referer: {}", referer.trim()));
    }
    args.extend(opts.extra_args.iter().cloned());
    args
}

fn check_reply(reply: &Value) -> Result<()> {
    match reply.get("error").and_then(Value::as_str) {
        Some("success") | None => Ok(()),
        Some(other) => bail!("mpv: {other}"),
    }
}

/// Sends every command on one connection and returns the replies in request order.
fn exchange(path: &str, requests: &[(u64, Value)]) -> Result<Vec<Value>> {
    let mut payload = String::new();
    for (_, command) in requests {
        payload.push_str(&serde_json::to_string(command).context("serialize mpv command")?);
        payload.push('\n');
    }
    let ids: Vec<u64> = requests.iter().map(|(id, _)| *id).collect();
    let stream = connect(path)?;
    exchange_over(stream, &payload, &ids)
}

fn exchange_over<S: Read + Write>(
    mut stream: S,
    payload: &str,
    request_ids: &[u64],
) -> Result<Vec<Value>> {
    stream
        .write_all(payload.as_bytes())
        .context("write mpv IPC commands")?;
    stream.flush().ok();

    let mut replies: Vec<Option<Value>> = vec![None; request_ids.len()];
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line.context("read mpv IPC reply")?;
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let id = value.get("request_id").and_then(Value::as_u64);
        if let Some(slot) = request_ids.iter().position(|wanted| Some(*wanted) == id) {
            replies[slot] = Some(value);
        }
        if replies.iter().all(Option::is_some) {
            return Ok(replies.into_iter().flatten().collect());
        }
    }
    Err(anyhow!("mpv IPC closed before replies {request_ids:?}"))
}

#[cfg(unix)]
fn connect(path: &str) -> Result<UnixStream> {
    let stream =
        UnixStream::connect(path).with_context(|| format!("connect to mpv IPC socket {path}"))?;
    stream.set_read_timeout(Some(IPC_TIMEOUT)).ok();
    stream.set_write_timeout(Some(IPC_TIMEOUT)).ok();
    Ok(stream)
}

#[cfg(target_os = "windows")]
fn connect(path: &str) -> Result<fs::File> {
    fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("connect to mpv IPC named pipe {path}"))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn connect(_path: &str) -> Result<fs::File> {
    Err(anyhow!("video controls are not supported on this platform"))
}

#[cfg(any(unix, target_os = "windows"))]
fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "lurk-mpv-{}-{}.sock",
        std::process::id(),
        random_suffix()
    ));
    Some(path.to_string_lossy().to_string())
}

#[cfg(target_os = "windows")]
fn unique_ipc_path() -> Option<String> {
    Some(format!(
        r"\\.\pipe\lurk-mpv-{}-{}",
        std::process::id(),
        random_suffix()
    ))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(%path, error = %err, "mpv: remove ipc socket");
        }
    }
}

#[cfg(not(unix))]
fn cleanup_ipc_path(_path: &str) {}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct Duplex {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn source() -> VideoSource {
        VideoSource {
            url: "https://v.redd.it/x/DASH_720.mp4".into(),
            width: 1280,
            height: 720,
            duration: 12.0,
            label: "clip".into(),
        }
    }

    #[test]
    fn args_loop_and_expose_ipc() {
        let args = build_args(&MpvOptions::default(), &source(), Some("/tmp/lurk.sock"));
        assert_eq!(args[0], "https://v.redd.it/x/DASH_720.mp4");
        assert!(args.contains(&"--loop-file=inf".to_string()));
        assert!(args.contains(&"--input-ipc-server=/tmp/lurk.sock".to_string()));
        assert!(args.contains(&"--force-media-title=clip".to_string()));
        assert!(args
            .iter()
            .any(|arg| arg == "--http-header-fields=Referer: https://www.reddit.com/"));
    }

    #[test]
    fn reply_is_matched_by_request_id() {
        let input = concat!(
            "{\"event\":\"playback-restart\"}\n",
            "{\"data\":1.0,\"request_id\":3,\"error\":\"success\"}\n",
            "{\"data\":7.5,\"request_id\":4,\"error\":\"success\"}\n",
        );
        let stream = Duplex {
            input: Cursor::new(input.as_bytes().to_vec()),
            written: Vec::new(),
        };
        let replies = exchange_over(stream, "{}\n", &[4]).unwrap();
        assert_eq!(replies[0]["data"].as_f64(), Some(7.5));
    }

    #[test]
    fn timeline_replies_share_one_connection() {
        let input = concat!(
            "{\"data\":42.0,\"request_id\":8,\"error\":\"success\"}\n",
            "{\"event\":\"seek\"}\n",
            "{\"data\":3.5,\"request_id\":7,\"error\":\"success\"}\n",
        );
        let mut stream = Duplex {
            input: Cursor::new(input.as_bytes().to_vec()),
            written: Vec::new(),
        };
        let payload = "{\"request_id\":7}\n{\"request_id\":8}\n";
        let replies = exchange_over(&mut stream, payload, &[7, 8]).unwrap();
        assert_eq!(replies[0]["data"].as_f64(), Some(3.5));
        assert_eq!(replies[1]["data"].as_f64(), Some(42.0));
        assert_eq!(String::from_utf8(stream.written).unwrap(), payload);
    }

    #[test]
    fn error_replies_are_errors() {
        assert!(check_reply(&json!({"error": "success"})).is_ok());
        assert!(check_reply(&json!({"error": "property unavailable"})).is_err());
    }

    #[test]
    fn missing_binary_fails_to_play() {
        let mut playback = MpvPlayback::new(
            MpvOptions {
                command: "lurk-test-no-such-mpv".into(),
                ..MpvOptions::default()
            },
            source(),
        );
        assert!(playback.play().is_err());
        assert_eq!(playback.status(), PlaybackStatus::Loading);
    }
}
