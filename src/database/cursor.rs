use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use super::StoreError;

pub type DocumentStream = BoxStream<'static, Result<Value, StoreError>>;

/// Forward-only stream of raw documents from one query.
///
/// Holds whatever store resources back the query (a pooled connection for
/// Postgres) until `close` is called or the cursor is dropped, whichever
/// comes first.
pub struct ResultCursor {
    inner: Option<DocumentStream>,
}

impl ResultCursor {
    pub fn new(stream: DocumentStream) -> Self {
        Self { inner: Some(stream) }
    }

    pub fn from_documents(documents: Vec<Value>) -> Self {
        Self::new(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the underlying resources. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        match self.inner.take() {
            Some(stream) => {
                drop(stream);
                tracing::debug!("Result cursor closed");
                true
            }
            None => false,
        }
    }
}

impl Stream for ResultCursor {
    type Item = Result<Value, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ReleaseProbe;
    use serde_json::json;

    #[tokio::test]
    async fn yields_documents_in_order() {
        let mut cursor = ResultCursor::from_documents(vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(cursor.next().await.unwrap().unwrap(), json!({"a": 1}));
        assert_eq!(cursor.next().await.unwrap().unwrap(), json!({"b": 2}));
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_once() {
        let probe = ReleaseProbe::new();
        let mut cursor = probe.cursor(vec![json!({"a": 1}), json!({"b": 2})]);

        assert!(cursor.next().await.is_some());
        assert!(cursor.close());
        assert!(!cursor.close());
        assert!(cursor.next().await.is_none());
        drop(cursor);

        assert_eq!(probe.releases(), 1);
    }

    #[tokio::test]
    async fn drop_releases_unconsumed_cursor() {
        let probe = ReleaseProbe::new();
        let cursor = probe.cursor(vec![json!({"a": 1})]);
        assert_eq!(probe.releases(), 0);
        drop(cursor);
        assert_eq!(probe.releases(), 1);
    }
}
