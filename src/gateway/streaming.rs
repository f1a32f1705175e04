//! Server-Sent Events delivery.
//!
//! Every stream carries one terminal payload and then ends. Headers go out
//! as soon as the response is built; keep-alive comments fill the time until
//! the payload is ready.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;

use crate::protocol::ChatCompletionChunk;

/// Terminal marker of an OpenAI-style stream
pub const DONE_MARKER: &str = "[DONE]";

fn encode<T: Serialize>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|e| {
        serde_json::json!({"error": {"message": e.to_string(), "type": "server_error"}})
            .to_string()
    })
}

fn finite_sse(
    events: Vec<Event>,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = stream! {
        for event in events {
            yield Ok(event);
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("ping"))
}

/// Named event carrying `payload` as JSON
pub fn named_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default().event(name).data(encode(payload))
}

/// One named event carrying `payload`
pub fn single_event_response<T: Serialize>(
    name: &str,
    payload: &T,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>> + use<T>> {
    finite_sse(vec![named_event(name, payload)], keep_alive)
}

/// Stream keep-alives until `pending` resolves, then its event.
///
/// Dropping the response, e.g. on client disconnect, drops `pending`.
pub fn deferred_event_response<F>(
    pending: F,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>
where
    F: Future<Output = Event> + Send + 'static,
{
    let stream = stream! {
        yield Ok(pending.await);
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("ping"))
}

/// The whole completion as one chunk, followed by `data: [DONE]`
pub fn chat_stream_response(
    chunk: ChatCompletionChunk,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = vec![
        Event::default().data(encode(&chunk)),
        Event::default().data(DONE_MARKER),
    ];
    finite_sse(events, keep_alive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use serde_json::json;

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn named_event_is_written_once() {
        let sse = single_event_response("result", &json!({"success": true}), Duration::from_secs(15));
        let text = body_text(sse.into_response()).await;
        assert_eq!(text.matches("event: result").count(), 1);
        assert!(text.contains(r#"data: {"success":true}"#));
    }

    #[tokio::test]
    async fn keep_alive_precedes_deferred_event() {
        let pending = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            named_event("result", &json!({"success": true}))
        };
        let sse = deferred_event_response(pending, Duration::from_millis(20));
        let text = body_text(sse.into_response()).await;

        let ping = text.find("ping").unwrap();
        let result = text.find("event: result").unwrap();
        assert!(ping < result, "keep-alive missing before payload: {text}");
        assert_eq!(text.matches("event: result").count(), 1);
    }

    #[tokio::test]
    async fn chat_stream_ends_with_done() {
        use crate::protocol::{ChatCompletion, CompletionPayload};

        let chunk = ChatCompletion::new(None, CompletionPayload::Tools(vec![])).into_chunk();
        let text = body_text(chat_stream_response(chunk, Duration::from_secs(15)).into_response()).await;
        let events: Vec<&str> = text.split("\n\n").filter(|e| !e.is_empty()).collect();
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("chat.completion.chunk"));
        assert_eq!(events[1], "data: [DONE]");
    }
}
