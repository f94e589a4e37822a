use serde::{Deserialize, Serialize};

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::document::{CollectionRef, Document, DocumentRef};
use crate::ApiError;

/// Origin of a change event (local vs. remote).
///
/// Carries optional trace context so a slot update can be correlated with the
/// snapshot delivery that caused it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Change initiated by this client
    Local {
        /// Span ID (16 hex chars) linking this change to the originating operation
        operation_id: Option<String>,
        /// Trace ID (32 hex chars) for distributed tracing
        trace_id: Option<String>,
    },
    /// Change received from the remote document store
    Remote {
        /// Span ID (16 hex chars) linking this change to the originating operation
        operation_id: Option<String>,
        /// Trace ID (32 hex chars) for distributed tracing
        trace_id: Option<String>,
    },
}

impl ChangeOrigin {
    /// Create Local origin with trace context extracted from the current span
    pub fn local_with_current_span() -> Self {
        let (operation_id, trace_id) = Self::extract_trace_context_from_current_span();
        Self::Local {
            operation_id,
            trace_id,
        }
    }

    /// Create Remote origin with trace context extracted from the current span
    pub fn remote_with_current_span() -> Self {
        let (operation_id, trace_id) = Self::extract_trace_context_from_current_span();
        Self::Remote {
            operation_id,
            trace_id,
        }
    }

    /// Remote origin without any trace context
    pub fn remote() -> Self {
        Self::Remote {
            operation_id: None,
            trace_id: None,
        }
    }

    /// Extract (operation_id, trace_id) from the current span.
    ///
    /// Prefers a valid OpenTelemetry context (set via `set_parent`), falling
    /// back to the tracing span id.
    fn extract_trace_context_from_current_span() -> (Option<String>, Option<String>) {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let span = tracing::Span::current();

        if span.is_none() {
            return (None, None);
        }

        let otel_ctx = span.context();
        let span_ref = otel_ctx.span();
        let span_ctx = span_ref.span_context();

        if span_ctx.is_valid() {
            let trace_id = format!("{:032x}", span_ctx.trace_id());
            let operation_id = span
                .id()
                .map(|id| format!("{:016x}", id.into_u64()))
                .unwrap_or_else(|| format!("{:016x}", span_ctx.span_id()));

            return (Some(operation_id), Some(trace_id));
        }

        if let Some(id) = span.id() {
            let operation_id = format!("{:016x}", id.into_u64());
            let trace_id = format!("{:032x}", id.into_u64());
            return (Some(operation_id), Some(trace_id));
        }

        (None, None)
    }

    pub fn trace_id(&self) -> Option<&str> {
        match self {
            Self::Local { trace_id, .. } | Self::Remote { trace_id, .. } => trace_id.as_deref(),
        }
    }

    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Self::Local { operation_id, .. } | Self::Remote { operation_id, .. } => {
                operation_id.as_deref()
            }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

/// Change notification event.
///
/// For a single watched document the stream opens with `Created` (current
/// state), followed by `Updated` for every later write and `Deleted` if the
/// document is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Change<T> {
    Created { data: T, origin: ChangeOrigin },
    Updated {
        id: String,
        data: T,
        origin: ChangeOrigin,
    },
    Deleted { id: String, origin: ChangeOrigin },
}

impl<T> Change<T> {
    pub fn origin(&self) -> &ChangeOrigin {
        match self {
            Change::Created { origin, .. }
            | Change::Updated { origin, .. }
            | Change::Deleted { origin, .. } => origin,
        }
    }
}

/// Type alias for Change<Document>
pub type DocumentChange = Change<Document>;

/// Batched changes for one watched document
pub type DocumentStream =
    Pin<Box<dyn Stream<Item = Result<Vec<DocumentChange>, ApiError>> + Send>>;

/// Remote document store client.
///
/// The store is treated as already configured: implementations own their
/// connection settings and credentials. Building references is pure path
/// construction; only `get_document` and `watch_document` perform I/O.
///
/// # Watch contract
///
/// `watch_document` returns a stream whose first item is either
/// `Ok(vec![Change::Created { .. }])` with the current document, or an
/// `Err` (e.g. `ApiError::DocumentNotFound`). Later items carry `Updated` and
/// `Deleted` changes in the order the store observed them. Dropping the stream
/// unsubscribes.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait DocumentStore: Send + Sync {
    /// Resolve a collection handle
    fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef::new(name)
    }

    /// Fetch a document once. `Ok(None)` when it does not exist.
    async fn get_document(&self, reference: &DocumentRef) -> Result<Option<Document>, ApiError>;

    /// Subscribe to snapshots of a single document.
    async fn watch_document(&self, reference: &DocumentRef) -> DocumentStream;
}
