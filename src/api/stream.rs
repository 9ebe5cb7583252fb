use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use axum::body::{Body, Bytes};
use futures::stream::{Stream, StreamExt};

use super::document::encode_document;
use crate::database::ResultCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Streaming,
    Closed,
}

/// Renders a result cursor as one JSON array, a document per chunk.
///
/// The opening bracket goes out before the first document is read, so by the
/// time anything can fail the response status is already committed. From
/// then on a bad document is logged and skipped, and a store failure ends
/// the body early. The cursor is closed when the array is finished, when the
/// store fails, or when this stream is dropped.
pub struct JsonArrayStream {
    cursor: ResultCursor,
    state: StreamState,
    written: usize,
    skipped: usize,
    started_at: Instant,
}

impl JsonArrayStream {
    pub fn new(cursor: ResultCursor, started_at: Instant) -> Self {
        Self {
            cursor,
            state: StreamState::NotStarted,
            written: 0,
            skipped: 0,
            started_at,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn into_body(self) -> Body {
        Body::from_stream(self)
    }

    fn finish(&mut self) {
        self.cursor.close();
        self.state = StreamState::Closed;
    }
}

impl Stream for JsonArrayStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match this.state {
                StreamState::NotStarted => {
                    this.state = StreamState::Streaming;
                    return Poll::Ready(Some(Ok(Bytes::from_static(b"["))));
                }
                StreamState::Closed => return Poll::Ready(None),
                StreamState::Streaming => match ready!(this.cursor.poll_next_unpin(cx)) {
                    Some(Ok(document)) => match encode_document(document) {
                        Ok(Some(encoded)) => {
                            let mut chunk = Vec::with_capacity(encoded.len() + 1);
                            if this.written > 0 {
                                chunk.push(b',');
                            }
                            chunk.extend_from_slice(&encoded);
                            this.written += 1;
                            return Poll::Ready(Some(Ok(Bytes::from(chunk))));
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            this.skipped += 1;
                            tracing::warn!("Skipping document that failed to serialize: {}", e);
                            continue;
                        }
                    },
                    Some(Err(e)) => {
                        tracing::error!(
                            "Device data stream aborted after [{}] documents: {}",
                            this.written,
                            e
                        );
                        this.finish();
                        return Poll::Ready(Some(Err(std::io::Error::other(e))));
                    }
                    None => {
                        this.finish();
                        tracing::info!(
                            "completed in [{:.5}]secs, streamed [{}] documents, skipped [{}]",
                            this.started_at.elapsed().as_secs_f64(),
                            this.written,
                            this.skipped
                        );
                        return Poll::Ready(Some(Ok(Bytes::from_static(b"]"))));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreError;
    use crate::testing::ReleaseProbe;
    use futures::stream;
    use serde_json::{json, Value};

    async fn render(stream: &mut JsonArrayStream) -> (String, Option<std::io::Error>) {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(e) => return (String::from_utf8(out).unwrap(), Some(e)),
            }
        }
        (String::from_utf8(out).unwrap(), None)
    }

    #[tokio::test]
    async fn empty_cursor_renders_empty_array() {
        let mut stream = JsonArrayStream::new(ResultCursor::from_documents(vec![]), Instant::now());
        assert_eq!(stream.state(), StreamState::NotStarted);

        let (body, err) = render(&mut stream).await;
        assert_eq!(body, "[]");
        assert!(err.is_none());
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[tokio::test]
    async fn documents_are_comma_separated() {
        let cursor = ResultCursor::from_documents(vec![
            json!({ "type": "cbg", "_id": "1" }),
            json!({}),
            json!({ "type": "smbg" }),
        ]);
        let (body, _) = render(&mut JsonArrayStream::new(cursor, Instant::now())).await;
        assert_eq!(body, r#"[{"type":"cbg"},{"type":"smbg"}]"#);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bad_document_is_skipped_and_cursor_released_once() {
        let probe = ReleaseProbe::new();
        let cursor = probe.cursor(vec![json!("not an object"), json!({ "type": "cbg" }), json!(7)]);
        let mut stream = JsonArrayStream::new(cursor, Instant::now());

        let (body, err) = render(&mut stream).await;
        assert_eq!(body, r#"[{"type":"cbg"}]"#);
        assert!(err.is_none());
        assert_eq!(probe.releases(), 1);

        drop(stream);
        assert_eq!(probe.releases(), 1);
    }

    #[tokio::test]
    async fn store_failure_truncates_and_releases() {
        let probe = ReleaseProbe::new();
        let documents = stream::iter(vec![
            Ok(json!({ "type": "cbg" })),
            Err(StoreError::QueryError("connection reset".to_string())),
            Ok(json!({ "type": "smbg" })),
        ]);
        let cursor = probe.wrap(documents.boxed());
        let mut stream = JsonArrayStream::new(cursor, Instant::now());

        let (body, err) = render(&mut stream).await;
        assert_eq!(body, r#"[{"type":"cbg"}"#);
        assert!(err.is_some());
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(probe.releases(), 1);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_mid_stream_releases_cursor() {
        let probe = ReleaseProbe::new();
        let cursor = probe.cursor(vec![json!({ "a": 1 }), json!({ "b": 2 })]);
        let mut stream = JsonArrayStream::new(cursor, Instant::now());

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"["));
        assert_eq!(stream.state(), StreamState::Streaming);
        drop(stream);
        assert_eq!(probe.releases(), 1);
    }
}
