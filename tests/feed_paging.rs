mod common;

use std::sync::Arc;
use std::time::Duration;

use lurk::data::{FeedService, FeedSource, RedditFeedService};
use lurk::feed::FeedState;
use lurk::reddit::{Client, ClientConfig};

use common::{listing, serve};

fn service(base: &str) -> RedditFeedService {
    let client = Client::new(ClientConfig {
        user_agent: "lurk-test/0.1".into(),
        public_base_url: Some(base.to_string()),
        ..Default::default()
    })
    .unwrap();
    RedditFeedService::new(Arc::new(client), None)
}

#[test]
fn pages_append_until_the_cursor_runs_out() {
    let (base, requests) = serve(vec![
        (200, listing(&["a1", "a2"], None)),
        (200, listing(&["b1", "b2"], Some("t3_abc"))),
        (200, listing(&["c1"], None)),
    ]);
    let service = service(&base);
    let mut state = FeedState::new(FeedSource::subreddit("rust"));

    // first page without a cursor: nothing more to load
    let initial = state.begin_initial();
    let result = initial.run(&service);
    assert!(state.apply(&initial, result));
    assert!(state.begin_load_more().is_none());

    let refresh = state.begin_refresh();
    let result = refresh.run(&service);
    assert!(state.apply(&refresh, result));
    assert!(!state.is_refreshing());
    assert_eq!(state.after(), Some("t3_abc"));

    let more = state.begin_load_more().expect("cursor present");
    let result = more.run(&service);
    assert!(state.apply(&more, result));

    let ids: Vec<&str> = state.posts().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["b1", "b2", "c1"]);
    assert!(state.begin_load_more().is_none());

    let _ = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    let _ = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    let last = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(last.path(), "/r/rust/hot.json");
    assert!(last.query_has("after=t3_abc"));
    assert!(requests.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn initial_failure_is_visible_and_keeps_nothing() {
    let (base, _requests) = serve(vec![(503, "unavailable".into())]);
    let service = service(&base);
    let mut state = FeedState::new(FeedSource::popular());
    let request = state.begin_initial();
    let result = service.load(&request.source, None);
    assert!(state.apply(&request, result));
    assert!(!state.is_loading());
    assert!(state.posts().is_empty());
    assert!(state.error().unwrap_or_default().contains("503"));
}
