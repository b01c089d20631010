//! Run orchestration: album acquisition and feed dispatch on top of the
//! portal, downloader and state store.

pub mod albums;
pub mod dispatch;
pub mod error;
pub mod notify;

pub use self::albums::{AlbumAcquirer, AlbumOptions, AlbumOutcome, AlbumSummary};
pub use self::dispatch::{DispatchOptions, DispatchSummary, Dispatcher};
pub use self::error::SyncError;
pub use self::notify::{Notifier, NotifySettings};

use crate::feed::FeedExtractor;
use crate::state::SyncState;

/// Extract the course feed and dispatch every record not seen before.
pub async fn sync_feed(
    extractor: &FeedExtractor,
    dispatcher: &Dispatcher<'_>,
    state: &mut SyncState,
) -> Result<DispatchSummary, SyncError> {
    SyncError::check_root_id(&state.root_id)?;
    let records = {
        let known: &SyncState = state;
        extractor
            .extract(&known.root_id, |key| known.is_dispatched(key))
            .await?
    };
    dispatcher.run(records, state).await
}
