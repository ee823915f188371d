// ── Publisher seam ──
//
// The runner hands each tick's updates to a `Publisher`, in the order the
// collector produced them. What happens next (a message bus, stdout, a
// test channel) is the publisher's business.

use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::model::{EntityUpdate, SourceIdentity};

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, source: &SourceIdentity, updates: Vec<EntityUpdate>) -> Result<(), CoreError>;
}

/// One tick's output.
#[derive(Debug, Clone)]
pub struct PublishBatch {
    pub source: SourceIdentity,
    pub updates: Vec<EntityUpdate>,
    pub collected_at: SystemTime,
}

/// Forwards batches into a bounded channel. A single consumer on the other
/// end keeps output from concurrent collectors from interleaving.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<PublishBatch>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishBatch>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(&self, source: &SourceIdentity, updates: Vec<EntityUpdate>) -> Result<(), CoreError> {
        let batch = PublishBatch {
            source: source.clone(),
            updates,
            collected_at: SystemTime::now(),
        };
        self.tx.send(batch).await.map_err(|_| CoreError::Publish {
            message: "publish channel closed".into(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::EntityDescriptor;

    #[tokio::test]
    async fn batches_arrive_in_order() {
        let (publisher, mut rx) = ChannelPublisher::new(4);
        let source = SourceIdentity::new("tower", "docker");
        let updates = vec![
            EntityUpdate::binary(EntityDescriptor::new("a"), true, "a"),
            EntityUpdate::binary(EntityDescriptor::new("b"), false, "b"),
        ];
        publisher.publish(&source, updates).await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.source, source);
        let suffixes: Vec<_> = batch.updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();
        assert_eq!(suffixes, ["a", "b"]);
    }

    #[tokio::test]
    async fn closed_channel_is_a_publish_error() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);
        let err = publisher
            .publish(&SourceIdentity::new("tower", "system"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Publish { .. }));
    }
}
