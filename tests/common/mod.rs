use std::io::Read;
use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }

    pub fn query_has(&self, pair: &str) -> bool {
        self.url
            .split_once('?')
            .map(|(_, query)| query.split('&').any(|p| p == pair))
            .unwrap_or(false)
    }
}

/// Serves the given `(status, body)` replies in order and records every request.
pub fn serve(replies: Vec<(u16, String)>) -> (String, Receiver<Recorded>) {
    let server = Server::http("127.0.0.1:0").expect("bind mock server");
    let port = server
        .server_addr()
        .to_ip()
        .expect("mock server ip address")
        .port();
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for (status, body) in replies {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let mut content = String::new();
            let _ = request.as_reader().read_to_string(&mut content);
            let recorded = Recorded {
                method: request.method().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
                    .collect(),
                body: content,
            };
            let _ = tx.send(recorded);
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("content type header");
            let _ = request.respond(
                Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header),
            );
        }
    });
    (format!("http://127.0.0.1:{port}/"), rx)
}

pub fn listing(ids: &[&str], after: Option<&str>) -> String {
    let children = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "kind": "t3",
                "data": {
                    "id": id,
                    "name": format!("t3_{id}"),
                    "title": format!("Post {id}"),
                    "author": "someone",
                    "subreddit": "rust",
                    "subreddit_name_prefixed": "r/rust",
                    "score": 1500,
                    "num_comments": 12,
                    "created_utc": 1_700_000_000.0,
                    "permalink": format!("/r/rust/comments/{id}/post/"),
                    "is_self": true
                }
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({
        "kind": "Listing",
        "data": { "after": after, "before": null, "children": children }
    })
    .to_string()
}
