//! At-most-once-per-key dispatch of feed records.
//!
//! Records arrive in feed order (newest first) and are processed oldest
//! first. A record enters `dispatchedRecords` only after delivery succeeded,
//! so a crash between delivery and the next save can cause one duplicate
//! notification but never a silently skipped record.

use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use super::notify::Notifier;
use crate::state::{RecordSnapshot, StateStore, SyncState};
use crate::types::PersistMode;

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub persist: PersistMode,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    /// Already in `dispatchedRecords`.
    pub skipped: usize,
    /// Delivery failed; retried next run.
    pub failed: usize,
    /// Delivered but without a key, so it will be delivered again.
    pub unkeyed: usize,
    /// Would have been delivered (dry run).
    pub pending: usize,
    pub interrupted: bool,
}

pub struct Dispatcher<'a> {
    notifier: &'a Notifier,
    store: &'a dyn StateStore,
    options: DispatchOptions,
    shutdown: CancellationToken,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        notifier: &'a Notifier,
        store: &'a dyn StateStore,
        options: DispatchOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            notifier,
            store,
            options,
            shutdown,
        }
    }

    /// Deliver every record of `feed_records` not yet in `state`.
    ///
    /// A delivery failure is logged and counted; only a failed state save
    /// aborts the batch.
    pub async fn run(
        &self,
        feed_records: Vec<RecordSnapshot>,
        state: &mut SyncState,
    ) -> Result<DispatchSummary, SyncError> {
        let mut summary = DispatchSummary::default();

        for record in feed_records.into_iter().rev() {
            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, leaving remaining records for the next run");
                summary.interrupted = true;
                break;
            }
            if state.is_dispatched(&record.key) {
                tracing::debug!("Record {} already dispatched", record.key);
                summary.skipped += 1;
                continue;
            }
            if self.options.dry_run {
                tracing::info!(
                    "[DRY RUN] Would deliver record {} by {} ({})",
                    record.key,
                    record.author,
                    record.timestamp
                );
                summary.pending += 1;
                continue;
            }

            if let Err(e) = self.notifier.notify(&record).await {
                tracing::warn!(
                    "Delivery of record {} failed, will retry next run: {}",
                    record.key,
                    e
                );
                summary.failed += 1;
                continue;
            }

            let key = record.key.clone();
            if !state.mark_dispatched(record) {
                tracing::warn!("Delivered a record without a key; it cannot be remembered");
                summary.unkeyed += 1;
                continue;
            }
            summary.delivered += 1;
            if self.options.persist == PersistMode::Record {
                self.store.save(state).await?;
                tracing::debug!("Persisted state after record {}", key);
            }
        }

        if self.options.persist == PersistMode::Batch && summary.delivered > 0 {
            self.store.save(state).await?;
        }

        tracing::info!(
            delivered = summary.delivered,
            skipped = summary.skipped,
            failed = summary.failed,
            "Dispatch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{CollaboratorError, Deliverer, OutboundMessage, Summarizer};
    use crate::state::StateError;
    use crate::sync::notify::NotifySettings;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records deliveries; fails any whose body contains "FAIL".
    #[derive(Default)]
    struct Recorder {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Summarizer for Recorder {
        async fn summarize(&self, text: &str) -> Result<String, CollaboratorError> {
            Ok(text.to_string())
        }
        async fn translate(&self, text: &str, _: &str) -> Result<String, CollaboratorError> {
            Ok(text.to_string())
        }
    }

    #[async_trait]
    impl Deliverer for Recorder {
        async fn deliver(&self, m: &OutboundMessage) -> Result<(), CollaboratorError> {
            if m.html_body.contains("FAIL") {
                return Err(CollaboratorError::NotConfigured("test deliverer"));
            }
            self.delivered.lock().unwrap().push(m.html_body.clone());
            Ok(())
        }
    }

    /// Counts saves instead of writing anything.
    #[derive(Default)]
    struct CountingStore {
        saves: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl StateStore for CountingStore {
        async fn load(&self) -> Result<SyncState, StateError> {
            Ok(SyncState::default())
        }
        async fn save(&self, state: &SyncState) -> Result<(), StateError> {
            self.saves.lock().unwrap().push(state.dispatched_records.len());
            Ok(())
        }
    }

    fn record(key: &str, body: &str) -> RecordSnapshot {
        RecordSnapshot {
            key: key.into(),
            body: body.into(),
            rich_body: body.into(),
            ..Default::default()
        }
    }

    fn notifier(recorder: &Arc<Recorder>) -> Notifier {
        Notifier::new(recorder.clone(), recorder.clone(), NotifySettings::default())
    }

    #[tokio::test]
    async fn test_oldest_first_and_known_skipped() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        state.mark_dispatched(record("2", "old"));

        // Feed order is newest first.
        let feed = vec![record("4", "newest"), record("3", "newer"), record("2", "old")];
        let summary = Dispatcher::new(&n, &store, DispatchOptions::default(), CancellationToken::new())
            .run(feed, &mut state)
            .await
            .unwrap();

        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.skipped, 1);
        let delivered = recorder.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].contains("newer"));
        assert!(delivered[1].contains("newest"));
        // Record mode saves after each delivery.
        assert_eq!(*store.saves.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_second_run_delivers_nothing() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        let feed = vec![record("9", "hello")];
        let d = Dispatcher::new(&n, &store, DispatchOptions::default(), CancellationToken::new());

        d.run(feed.clone(), &mut state).await.unwrap();
        let again = d.run(feed, &mut state).await.unwrap();

        assert_eq!(again.delivered, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(recorder.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_not_marked() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        let feed = vec![record("6", "fine"), record("5", "FAIL")];

        let summary = Dispatcher::new(&n, &store, DispatchOptions::default(), CancellationToken::new())
            .run(feed, &mut state)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.delivered, 1);
        assert!(!state.is_dispatched("5"));
        assert!(state.is_dispatched("6"));
    }

    #[tokio::test]
    async fn test_batch_mode_saves_once() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        let options = DispatchOptions {
            persist: PersistMode::Batch,
            dry_run: false,
        };
        let feed = vec![record("2", "b"), record("1", "a")];

        Dispatcher::new(&n, &store, options, CancellationToken::new())
            .run(feed, &mut state)
            .await
            .unwrap();
        assert_eq!(*store.saves.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        let options = DispatchOptions {
            persist: PersistMode::Record,
            dry_run: true,
        };

        let summary = Dispatcher::new(&n, &store, options, CancellationToken::new())
            .run(vec![record("1", "a")], &mut state)
            .await
            .unwrap();
        assert_eq!(summary.pending, 1);
        assert!(recorder.delivered.lock().unwrap().is_empty());
        assert!(store.saves.lock().unwrap().is_empty());
        assert!(state.dispatched_records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_key_is_delivered_every_time() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        let d = Dispatcher::new(&n, &store, DispatchOptions::default(), CancellationToken::new());

        let first = d.run(vec![record("", "anon")], &mut state).await.unwrap();
        let second = d.run(vec![record("", "anon")], &mut state).await.unwrap();
        assert_eq!(first.unkeyed, 1);
        assert_eq!(second.unkeyed, 1);
        assert_eq!(recorder.delivered.lock().unwrap().len(), 2);
        assert!(state.dispatched_records.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_next_record() {
        let recorder = Arc::new(Recorder::default());
        let n = notifier(&recorder);
        let store = CountingStore::default();
        let mut state = SyncState::default();
        let token = CancellationToken::new();
        token.cancel();

        let summary = Dispatcher::new(&n, &store, DispatchOptions::default(), token)
            .run(vec![record("1", "a")], &mut state)
            .await
            .unwrap();
        assert!(summary.interrupted);
        assert!(recorder.delivered.lock().unwrap().is_empty());
    }
}
