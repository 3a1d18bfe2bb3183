//! Built-in in-process handlers shipped with the daemon.
//!
//! Edit commits themselves happen in the dispatcher's pipeline step; these
//! handlers cover the document bookkeeping around them (open/close flags)
//! and the debugging endpoint that echoes the authoritative buffer text.
//! They register for the configured default language, which under the
//! orphan resolver means every path.

use std::sync::Arc;

use junction_documents::DocumentStore;
use junction_host::{EndpointResponse, Handler, HandlerError, RequestEnvelope};

/// Marks a document open, introducing the path when it is new.
pub(crate) struct OpenDocumentHandler {
    store: Arc<DocumentStore>,
}

impl OpenDocumentHandler {
    pub(crate) fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }
}

impl Handler for OpenDocumentHandler {
    fn handle(&self, request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
        if self.store.get(&request.path).is_none() {
            // An open notification with no payload introduces an empty
            // document; the usual case carries text, which the pipeline has
            // already committed before this handler ran.
            self.store.put_full(&request.path, String::new());
        }
        self.store
            .mark_open(&request.path, true)
            .map_err(|error| HandlerError::failed(error.to_string()))?;
        Ok(EndpointResponse::Ack)
    }
}

/// Marks a document closed; closing an untracked path is a quiet no-op.
pub(crate) struct CloseDocumentHandler {
    store: Arc<DocumentStore>,
}

impl CloseDocumentHandler {
    pub(crate) fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }
}

impl Handler for CloseDocumentHandler {
    fn handle(&self, request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
        if self.store.get(&request.path).is_some() {
            self.store
                .mark_open(&request.path, false)
                .map_err(|error| HandlerError::failed(error.to_string()))?;
        }
        Ok(EndpointResponse::Ack)
    }
}

/// Echoes the store's current text for the request path.
pub(crate) struct DocumentTextHandler {
    store: Arc<DocumentStore>,
}

impl DocumentTextHandler {
    pub(crate) fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }
}

impl Handler for DocumentTextHandler {
    fn handle(&self, request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
        Ok(EndpointResponse::Text {
            text: self.store.get(&request.path).map(|snapshot| snapshot.text),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use junction_config::IndexBase;

    use super::*;

    fn store() -> Arc<DocumentStore> {
        Arc::new(DocumentStore::new(IndexBase::Zero))
    }

    #[test]
    fn open_introduces_unknown_paths() {
        let store = store();
        let handler = OpenDocumentHandler::new(Arc::clone(&store));

        let response = handler
            .handle(&RequestEnvelope::new("open-document", "/ws/new.cs"))
            .expect("open succeeds");
        assert_eq!(response, EndpointResponse::Ack);

        let snapshot = store.get(Path::new("/ws/new.cs")).expect("tracked");
        assert!(snapshot.open);
        assert!(snapshot.text.is_empty());
    }

    #[test]
    fn open_keeps_previously_committed_text() {
        let store = store();
        store.put_full(Path::new("/ws/a.cs"), "class A{}");
        let handler = OpenDocumentHandler::new(Arc::clone(&store));

        handler
            .handle(&RequestEnvelope::new("open-document", "/ws/a.cs"))
            .expect("open succeeds");

        let snapshot = store.get(Path::new("/ws/a.cs")).expect("tracked");
        assert!(snapshot.open);
        assert_eq!(snapshot.text, "class A{}");
    }

    #[test]
    fn close_clears_the_open_flag_and_tolerates_unknown_paths() {
        let store = store();
        store.put_full(Path::new("/ws/a.cs"), "x");
        store.mark_open(Path::new("/ws/a.cs"), true).expect("open");

        let handler = CloseDocumentHandler::new(Arc::clone(&store));
        handler
            .handle(&RequestEnvelope::new("close-document", "/ws/a.cs"))
            .expect("close succeeds");
        assert!(!store.get(Path::new("/ws/a.cs")).expect("tracked").open);

        handler
            .handle(&RequestEnvelope::new("close-document", "/ws/never-seen.cs"))
            .expect("closing an untracked path is a no-op");
    }

    #[test]
    fn document_text_reports_tracked_and_untracked_paths() {
        let store = store();
        store.put_full(Path::new("/ws/a.cs"), "class A{}");
        let handler = DocumentTextHandler::new(store);

        let tracked = handler
            .handle(&RequestEnvelope::new("document-text", "/ws/a.cs"))
            .expect("tracked path");
        assert_eq!(
            tracked,
            EndpointResponse::Text {
                text: Some("class A{}".to_owned())
            }
        );

        let untracked = handler
            .handle(&RequestEnvelope::new("document-text", "/ws/other.cs"))
            .expect("untracked path");
        assert_eq!(untracked, EndpointResponse::Text { text: None });
    }
}
