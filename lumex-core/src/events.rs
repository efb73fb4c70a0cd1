//! Catalog change events published to subscribers.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use lumex_model::{ContainerKey, ImageId, ImageRef, ResetChanges};

/// Metadata stamped on every published event.
#[derive(Clone, Debug)]
pub struct EventMeta {
    /// Correlates events flowing from one originating change.
    pub correlation_id: Uuid,
    /// Wall-clock publish time.
    pub occurred_at: DateTime<Utc>,
}

impl EventMeta {
    /// Creates metadata, minting a correlation id when none is supplied.
    pub fn new(correlation_id: Option<Uuid>) -> Self {
        Self {
            correlation_id: correlation_id.unwrap_or_else(Uuid::now_v7),
            occurred_at: Utc::now(),
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new(None)
    }
}

/// One catalog mutation, published after it took effect.
#[derive(Clone, Debug)]
pub enum CatalogEvent {
    /// An image was discovered or re-scanned.
    ImageUpserted {
        /// The ref as it now appears in the index.
        image: ImageRef,
    },
    /// An indexed image disappeared from disk.
    ImageRemoved {
        /// Identity of the removed image.
        id: ImageId,
        /// Normalized path it was indexed under.
        path: String,
    },
    /// An indexed image moved, keeping its identity.
    ImageRenamed {
        /// Identity of the moved image, unchanged by the move.
        id: ImageId,
        /// Previous normalized path.
        from: String,
        /// New normalized path.
        to: String,
    },
    /// A container was dropped from the index.
    ContainerRemoved {
        /// Key of the removed container.
        key: ContainerKey,
    },
    /// A rule reset completed, with everything it deleted.
    RulesReset {
        /// Deletions the reset performed.
        changes: ResetChanges,
    },
}

/// An event plus its metadata, as received by subscribers.
#[derive(Clone, Debug)]
pub struct CatalogEventEnvelope {
    /// Publish metadata.
    pub meta: EventMeta,
    /// The event payload.
    pub event: CatalogEvent,
}

/// In-process broadcast bus for catalog events.
///
/// Slow subscribers that fall more than the channel capacity behind
/// lose the oldest events, per broadcast channel semantics.
#[derive(Clone, Debug)]
pub struct EngineEventBus {
    tx: broadcast::Sender<CatalogEventEnvelope>,
}

impl EngineEventBus {
    /// Creates a bus retaining up to `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEventEnvelope> {
        self.tx.subscribe()
    }

    /// Publishes one event. Lack of subscribers is not an error.
    pub(crate) fn publish(&self, event: CatalogEvent) {
        let envelope = CatalogEventEnvelope {
            meta: EventMeta::new(None),
            event,
        };
        let _ = self.tx.send(envelope);
    }
}

impl Default for EngineEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
