use thiserror::Error;

use crate::portal::PortalError;
use crate::session::SessionError;
use crate::state::StateError;

/// Errors surfaced by a sync run. Per-item failures (one medium, one
/// attachment, one delivery) never reach this type; they are logged and
/// counted where they happen.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error("No course id known: pass --root-id or use a session file that carries one")]
    MissingRootId,

    #[error("Course id '{0}' in the state document is not a plain path segment")]
    InvalidRootId(String),
}

impl SyncError {
    /// The recorded root id, if it is usable as a directory name.
    pub(crate) fn check_root_id(root_id: &str) -> Result<&str, SyncError> {
        if root_id.is_empty() {
            return Err(SyncError::MissingRootId);
        }
        if !crate::state::is_plain_root_id(root_id) {
            return Err(SyncError::InvalidRootId(root_id.to_string()));
        }
        Ok(root_id)
    }
}

impl SyncError {
    /// Whether the run must stop. Only a rejected session or a broken state
    /// document qualify; everything else affects a single unit of work.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::State(_)
            | SyncError::Session(_)
            | SyncError::MissingRootId
            | SyncError::InvalidRootId(_) => true,
            SyncError::Portal(e) => e.is_fatal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        let portal = SyncError::Portal(PortalError::HttpStatus {
            status: 500,
            url: "u".into(),
        });
        assert!(!portal.is_fatal());

        let rejected = SyncError::Portal(PortalError::Unauthorized {
            status: 401,
            url: "u".into(),
        });
        assert!(rejected.is_fatal());

        let locked = SyncError::State(StateError::Locked {
            path: "/tmp/state.lock".into(),
        });
        assert!(locked.is_fatal());
        assert!(SyncError::MissingRootId.is_fatal());
        assert!(SyncError::InvalidRootId("..".into()).is_fatal());
    }

    #[test]
    fn test_check_root_id() {
        assert!(matches!(SyncError::check_root_id(""), Err(SyncError::MissingRootId)));
        assert!(matches!(
            SyncError::check_root_id("../x"),
            Err(SyncError::InvalidRootId(_))
        ));
        assert_eq!(SyncError::check_root_id("88").unwrap(), "88");
    }
}
