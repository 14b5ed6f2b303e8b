//! Tracker API double that records every call.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{AccountId, TrackerId};
use crate::error::{GatewayError, Result};
use crate::port::{TrackerApi, TrackerSpec};

/// Records created and removed trackers; ids are `trk-1`, `trk-2`, ...
#[derive(Debug, Default)]
pub struct RecordingTrackerApi {
    created: Mutex<Vec<(AccountId, TrackerSpec, TrackerId)>>,
    removed: Mutex<Vec<(AccountId, TrackerId)>>,
    next: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingTrackerApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn created(&self) -> Vec<(AccountId, TrackerSpec, TrackerId)> {
        self.created.lock().clone()
    }

    #[must_use]
    pub fn removed(&self) -> Vec<(AccountId, TrackerId)> {
        self.removed.lock().clone()
    }

    fn check(&self, action: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                action: action.into(),
                reason: "tracker service unavailable".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl TrackerApi for RecordingTrackerApi {
    async fn create_tracker(&self, account: &AccountId, spec: &TrackerSpec) -> Result<TrackerId> {
        self.check("create_tracker")?;
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let id = TrackerId::new(format!("trk-{n}"));
        self.created
            .lock()
            .push((account.clone(), spec.clone(), id.clone()));
        Ok(id)
    }

    async fn remove_tracker(&self, account: &AccountId, tracker: &TrackerId) -> Result<()> {
        self.check("remove_tracker")?;
        self.removed.lock().push((account.clone(), tracker.clone()));
        Ok(())
    }
}
