//! End-to-end tests against a live SSE endpoint.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use futures::{StreamExt as _, stream};
use serde_json::{Value, json};

use streamhub::StreamHub;

type FrameSpec = (Option<&'static str>, &'static str);

/// Serve the given frames once, then hold the stream open so the client does
/// not reconnect and replay them.
async fn spawn_server(frames: Vec<FrameSpec>) -> String {
    let app = Router::new().route(
        "/api/realtime/stream",
        get(move || {
            let frames = frames.clone();
            async move {
                let events = frames.into_iter().map(|(name, body)| {
                    let mut event = Event::default().data(body);
                    if let Some(name) = name {
                        event = event.event(name);
                    }
                    Ok::<_, Infallible>(event)
                });
                Sse::new(stream::iter(events).chain(stream::pending()))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/realtime/stream")
}

fn recorder(hub: &Arc<StreamHub>, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    // Registrations persist without the guard; these live for the whole test.
    let _sub = hub.on(event, move |payload: &Value| {
        sink.lock().unwrap().push(payload.clone());
    });
    seen
}

async fn wait_until(timeout_ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_frames_route_to_typed_channel_and_generic_handlers() {
    let url = spawn_server(vec![
        (
            Some("feed_events"),
            r#"{"type":"feed:new_post","post":{"id":42}}"#,
        ),
        (Some("feed_events"), r#"{"foo":1}"#),
        (Some("feed_events"), "not json"),
        (None, r#"{"hello":"world"}"#),
        (None, "plain text"),
    ])
    .await;

    let hub = Arc::new(StreamHub::default());
    let typed = recorder(&hub, "feed:new_post");
    let channel = recorder(&hub, "feed_events");
    let other_channel = recorder(&hub, "notif_events");
    let generic = recorder(&hub, "message");

    let handle = hub.connect_to(&url).expect("connect should succeed");
    assert_eq!(handle.url(), url);

    let delivered = wait_until(5_000, || {
        channel.lock().unwrap().len() == 2 && generic.lock().unwrap().len() == 2
    })
    .await;
    assert!(delivered, "frames were not delivered in time");

    let typed_payload = json!({"type": "feed:new_post", "post": {"id": 42}});
    assert_eq!(typed.lock().unwrap().as_slice(), &[typed_payload.clone()]);

    // Channel listeners see the typed frame and the untyped one; the
    // malformed frame is dropped on the channel path.
    assert_eq!(
        channel.lock().unwrap().as_slice(),
        &[typed_payload, json!({"foo": 1})]
    );
    assert!(other_channel.lock().unwrap().is_empty());

    // The untagged path parses JSON when it can and passes raw text through
    // when it cannot.
    assert_eq!(
        generic.lock().unwrap().as_slice(),
        &[json!({"hello": "world"}), json!("plain text")]
    );

    hub.close();
}

#[tokio::test]
async fn test_connect_is_idempotent_against_live_server() {
    let url = spawn_server(vec![(Some("feed_events"), r#"{"foo":1}"#)]).await;

    let hub = Arc::new(StreamHub::default());
    let first = hub.connect_to(&url).expect("connect should succeed");
    let second = hub.connect_to(&url).expect("repeat connect should succeed");
    assert_eq!(first, second);

    hub.close();
    let third = hub.connect_to(&url).expect("reconnect should succeed");
    assert_ne!(first.id(), third.id());
    hub.close();
}

#[tokio::test]
async fn test_observer_mirror_sees_transport_dispatches() {
    let url = spawn_server(vec![(
        Some("notif_events"),
        r#"{"type":"notif:new","notification":{"id":"ntf_1"}}"#,
    )])
    .await;

    let hub = Arc::new(StreamHub::default());
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let _sub = hub.on_any(move |event: &str, payload: &Value| {
        sink.lock().unwrap().push((event.to_string(), payload.clone()));
    });

    // No typed handler is registered at all; the mirror still fires.
    hub.connect_to(&url).expect("connect should succeed");

    let delivered = wait_until(5_000, || observed.lock().unwrap().len() == 2).await;
    assert!(delivered, "mirror dispatches were not observed in time");

    let observed = observed.lock().unwrap();
    assert_eq!(observed[0].0, "notif:new");
    assert_eq!(observed[1].0, "notif_events");
    assert_eq!(observed[0].1, observed[1].1);

    hub.close();
}
