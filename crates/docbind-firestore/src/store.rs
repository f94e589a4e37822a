//! DocumentStore over the Firestore REST API
//!
//! Watching polls the document at the configured interval and emits a change
//! only when its `updateTime` moves, it appears, or it disappears.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use docbind_api::{
    ApiError, Change, ChangeOrigin, Document, DocumentChange, DocumentRef, DocumentStore,
    DocumentStream,
};

use super::client::FirestoreClient;
use super::config::FirestoreConfig;

pub struct FirestoreDocumentStore {
    client: Arc<FirestoreClient>,
    poll_interval: Duration,
}

impl FirestoreDocumentStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, ApiError> {
        let poll_interval = config.poll_interval();
        let client = FirestoreClient::new(config)?;
        Ok(Self::from_client(Arc::new(client), poll_interval))
    }

    pub fn from_client(client: Arc<FirestoreClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }
}

/// What the last poll saw
#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Nothing,
    Missing,
    Present { update_time: Option<String> },
}

struct DocumentPoller {
    client: Arc<FirestoreClient>,
    reference: DocumentRef,
    interval: Duration,
    polled: bool,
    seen: Seen,
}

type PollItem = Result<Vec<DocumentChange>, ApiError>;

impl DocumentPoller {
    /// Poll until there is something to emit
    async fn next_item(&mut self) -> PollItem {
        loop {
            if self.polled {
                tokio::time::sleep(self.interval).await;
            }
            if let Some(item) = self.poll().await {
                return item;
            }
        }
    }

    #[tracing::instrument(name = "firestore.poll", skip(self), fields(path = %self.reference))]
    async fn poll(&mut self) -> Option<PollItem> {
        let first = !self.polled;
        self.polled = true;

        let fetched = match self.client.get_document(&self.reference).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("[FirestoreDocumentStore] Poll of {} failed: {}", self.reference, e);
                return Some(Err(e));
            }
        };

        match fetched {
            Some(raw) => {
                let update_time = raw.update_time.clone();
                let data: Document = raw.into_document(self.reference.clone());
                let change = match &self.seen {
                    Seen::Present { update_time: last } if *last == update_time => return None,
                    Seen::Present { .. } => Change::Updated {
                        id: self.reference.id().to_string(),
                        data,
                        origin: ChangeOrigin::remote_with_current_span(),
                    },
                    Seen::Nothing | Seen::Missing => Change::Created {
                        data,
                        origin: ChangeOrigin::remote_with_current_span(),
                    },
                };
                debug!(
                    "[FirestoreDocumentStore] {} changed (updateTime={:?})",
                    self.reference, update_time
                );
                self.seen = Seen::Present { update_time };
                Some(Ok(vec![change]))
            }
            None => match self.seen {
                Seen::Present { .. } => {
                    info!("[FirestoreDocumentStore] {} was deleted", self.reference);
                    self.seen = Seen::Missing;
                    Some(Ok(vec![Change::Deleted {
                        id: self.reference.id().to_string(),
                        origin: ChangeOrigin::remote_with_current_span(),
                    }]))
                }
                _ if first => {
                    self.seen = Seen::Missing;
                    Some(Err(ApiError::DocumentNotFound {
                        path: self.reference.path(),
                    }))
                }
                _ => None,
            },
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn get_document(&self, reference: &DocumentRef) -> Result<Option<Document>, ApiError> {
        let fetched = self.client.get_document(reference).await?;
        Ok(fetched.map(|raw| raw.into_document(reference.clone())))
    }

    async fn watch_document(&self, reference: &DocumentRef) -> DocumentStream {
        info!(
            "[FirestoreDocumentStore] Watching {} every {:?}",
            reference, self.poll_interval
        );
        let poller = DocumentPoller {
            client: Arc::clone(&self.client),
            reference: reference.clone(),
            interval: self.poll_interval,
            polled: false,
            seen: Seen::Nothing,
        };

        Box::pin(futures::stream::unfold(poller, |mut poller| async move {
            let item = poller.next_item().await;
            Some((item, poller))
        }))
    }
}
