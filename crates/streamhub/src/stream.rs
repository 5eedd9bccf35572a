//! SSE transport task with automatic reconnection.
//!
//! The task owns the long-lived `text/event-stream` request and feeds raw
//! frames into the hub's routing entry points. Reconnection lives entirely
//! here: the hub's registry and connection handle are untouched across
//! transport-level drops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use log::{debug, error, info, warn};
use reqwest::header;
use reqwest_eventsource::{Event, EventSource};

use streamhub_protocol::envelope::{Channel, GENERIC_EVENT};

use crate::config::{BackoffConfig, HubConfig};
use crate::error::{StreamError, StreamResult};
use crate::hub::{ConnectionHandle, StreamHub};

/// Validate the endpoint, build the HTTP client, and spawn the stream task.
///
/// Everything that can fail synchronously fails here, so `connect` can apply
/// its fail-soft contract before any task exists.
pub(crate) fn spawn(
    hub: Arc<StreamHub>,
    handle: ConnectionHandle,
    config: HubConfig,
) -> StreamResult<tokio::task::JoinHandle<()>> {
    let url = reqwest::Url::parse(handle.url()).map_err(|err| StreamError::InvalidUrl {
        url: handle.url().to_string(),
        reason: err.to_string(),
    })?;

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|err| StreamError::Runtime(err.to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.keepalive_timeout_secs * 2))
        .build()?;

    Ok(runtime.spawn(run(hub, client, url, config, handle)))
}

/// Stream frames until cancelled, reconnecting with backoff on drops.
async fn run(
    hub: Arc<StreamHub>,
    client: reqwest::Client,
    url: reqwest::Url,
    config: HubConfig,
    handle: ConnectionHandle,
) {
    let mut attempt = 0u32;

    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt, &config.backoff);
            debug!(
                "reconnecting event stream {} in {}ms (attempt {})",
                handle.id(),
                delay,
                attempt
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match stream_once(&hub, &client, &url, &config).await {
            Ok(()) => {
                attempt = 0;
                info!("event stream {} ended cleanly", handle.id());
            }
            Err(err) => {
                attempt += 1;
                warn!(
                    "event stream {} dropped (attempt {}): {:#}",
                    handle.id(),
                    attempt,
                    err
                );

                if attempt >= config.backoff.max_attempts {
                    error!(
                        "event stream {} exceeded {} reconnect attempts, giving up",
                        handle.id(),
                        config.backoff.max_attempts
                    );
                    break;
                }
            }
        }
    }
}

/// One connection attempt: open the stream and deliver frames until it drops.
async fn stream_once(
    hub: &Arc<StreamHub>,
    client: &reqwest::Client,
    url: &reqwest::Url,
    config: &HubConfig,
) -> Result<()> {
    let mut request = client
        .get(url.clone())
        .header(header::ACCEPT, "text/event-stream");
    if let Some(token) = &config.auth_token {
        request = request.bearer_auth(token);
    }

    let mut es = EventSource::new(request).context("building event stream request")?;

    while let Some(event) = es.next().await {
        match event {
            Ok(Event::Open) => debug!("event stream opened"),
            Ok(Event::Message(msg)) => deliver(hub, &msg.event, &msg.data),
            Err(err) => return Err(anyhow!("event stream error: {err}")),
        }
    }

    Ok(())
}

/// Hand a raw frame to the hub, keyed by its SSE event name.
///
/// Known channel tags take the channel decode path; the default `message`
/// name (or no name at all) is the untagged fallback path; anything else is
/// not a channel the hub attaches a decoder for and is dropped.
fn deliver(hub: &StreamHub, event_name: &str, body: &str) {
    if event_name.is_empty() || event_name == GENERIC_EVENT {
        hub.route_generic_frame(body);
    } else if Channel::parse(event_name).is_some() {
        hub.route_channel_frame(event_name, body);
    } else {
        debug!("ignoring frame on unknown channel {event_name}");
    }
}

/// Exponential backoff with up to 20% jitter.
fn backoff_delay(attempt: u32, backoff: &BackoffConfig) -> u64 {
    let base = backoff.base_ms as f64;
    let exp = 2.0_f64.powi(attempt.min(10) as i32);
    let delay = (base * exp) as u64;

    let jitter = (delay as f64 * 0.2 * rand::random::<f64>()) as u64;

    (delay + jitter).min(backoff.max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_backoff_delay_is_capped() {
        let backoff = BackoffConfig::default();
        for attempt in 1..=60 {
            let delay = backoff_delay(attempt, &backoff);
            assert!(delay >= backoff.base_ms);
            assert!(delay <= backoff.max_ms);
        }
    }

    #[test]
    fn test_backoff_delay_grows_with_attempts() {
        let backoff = BackoffConfig {
            base_ms: 100,
            max_ms: 1_000_000,
            max_attempts: 50,
        };
        // Jitter is at most 20%, so consecutive doublings always dominate it.
        assert!(backoff_delay(5, &backoff) > backoff_delay(1, &backoff));
    }

    #[test]
    fn test_deliver_routes_by_event_name() {
        let hub = Arc::new(StreamHub::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = hub.on_any(move |event: &str, payload: &serde_json::Value| {
            sink.lock().unwrap().push((event.to_string(), payload.clone()));
        });

        deliver(&hub, "feed_events", r#"{"type":"feed:new_post","post":{}}"#);
        deliver(&hub, "message", r#"{"a":1}"#);
        deliver(&hub, "", "plain text");
        deliver(&hub, "presence_events", r#"{"b":2}"#);

        let seen = seen.lock().unwrap();
        let names: Vec<&str> = seen.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(
            names,
            vec!["feed:new_post", "feed_events", "message", "message"]
        );
        assert_eq!(seen[3].1, json!("plain text"));
    }
}
