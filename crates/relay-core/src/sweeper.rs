//! Background removal of messages whose sender asked for auto-delete.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{messaging::port::DeliveryPort, propagate::Propagator, store::Store, Result};

#[derive(Clone)]
pub struct AutoDeleteSweeper {
    inner: Arc<SweeperInner>,
}

struct SweeperInner {
    store: Arc<dyn Store>,
    propagator: Propagator,
    interval: Duration,
    state: tokio::sync::Mutex<SweeperState>,
}

#[derive(Default)]
struct SweeperState {
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl AutoDeleteSweeper {
    pub fn new(store: Arc<dyn Store>, delivery: Arc<dyn DeliveryPort>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(SweeperInner {
                propagator: Propagator::new(store.clone(), delivery),
                store,
                interval,
                state: tokio::sync::Mutex::new(SweeperState::default()),
            }),
        }
    }

    /// Spawn the sweep loop. A running loop is replaced.
    pub async fn start(&self) {
        self.stop().await;

        let cancel = CancellationToken::new();
        let sweeper = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { sweeper.run(token).await });

        let mut st = self.inner.state.lock().await;
        st.handle = Some(handle);
        st.cancel = Some(cancel);
        info!(interval_secs = self.inner.interval.as_secs(), "auto-delete sweeper started");
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(tok) = st.cancel.take() {
            tok.cancel();
        }
        st.handle.take();
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.inner.interval) => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        warn!("auto-delete sweep failed: {e}");
                    }
                }
            }
        }
        debug!("auto-delete sweeper stopped");
    }

    /// Delete every expired message everywhere. Returns how many were swept.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.inner.store.expired_messages(now).await?;
        for logical in &expired {
            self.inner.propagator.delete_everywhere(*logical, None).await?;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "auto-deleted expired messages");
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessageId, ParticipantPatch, Role, UserId},
        fanout::FanOut,
        messaging::types::{Content, InboundMessage},
        testing::{FakeDelivery, MemoryStore},
    };

    #[tokio::test]
    async fn sweep_removes_only_expired_messages() {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(FakeDelivery::new());
        let fanout = FanOut::new(store.clone(), delivery.clone(), None);
        let sweeper = AutoDeleteSweeper::new(store.clone(), delivery.clone(), Duration::from_secs(60));

        store.activate(UserId(1), Role::Ordinary).await;
        store
            .update_participant(
                UserId(1),
                &ParticipantPatch {
                    autodelete_minutes: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let a = store.get_participant(UserId(1)).await.unwrap().unwrap();
        let b = store.activate(UserId(2), Role::Ordinary).await;

        let send = |sender: UserId, id: i32| InboundMessage {
            sender,
            message_id: MessageId(id),
            content: Content::Text {
                text: "short lived".to_string(),
            },
            reply_to: None,
            sender_name: None,
        };
        let expiring = fanout.distribute(&send(a.id, 10), &a).await.unwrap().logical;
        let lasting = fanout.distribute(&send(b.id, 11), &b).await.unwrap().logical;

        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + chrono::Duration::minutes(6);
        assert_eq!(sweeper.sweep_once(later).await.unwrap(), 1);
        assert!(store.get_logical_message(expiring).await.unwrap().is_none());
        assert!(store.get_logical_message(lasting).await.unwrap().is_some());
        assert_eq!(delivery.deletes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(FakeDelivery::new());
        let sweeper = AutoDeleteSweeper::new(store, delivery, Duration::from_secs(60));

        sweeper.start().await;
        tokio::time::sleep(Duration::from_secs(130)).await;
        sweeper.stop().await;
        assert!(sweeper.inner.state.lock().await.handle.is_none());
    }
}
