//! Tracks the subset of the kstat chain that matches a reader's filter.
//!
//! The registry reports a chain-generation id that changes whenever a
//! statistic is added or removed. The tracker walks the chain only when that
//! id changes, and then rebuilds its list from scratch.

use tracing::{debug, trace};

use crate::error::KstatError;
use crate::filter::Filter;
use crate::source::{ChainId, Descriptor, KstatSource};

/// Where the tracker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No chain walk has succeeded yet.
    Uninitialized,
    /// The tracked list reflects generation `chain_id`.
    Tracking { chain_id: ChainId },
}

/// Outcome of a successful [`ChainTracker::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The chain id was unchanged; nothing was walked.
    Unchanged,
    /// The tracked list was rebuilt.
    Rebuilt,
}

/// Cached, filtered view of the kstat chain.
///
/// Owns the source; closing the tracker drops it.
#[derive(Debug)]
pub struct ChainTracker<S> {
    source: Option<S>,
    filter: Filter,
    state: TrackerState,
    tracked: Vec<Descriptor>,
}

impl<S: KstatSource> ChainTracker<S> {
    pub fn new(source: S, filter: Filter) -> Self {
        Self {
            source: Some(source),
            filter,
            state: TrackerState::Uninitialized,
            tracked: Vec::new(),
        }
    }

    /// Brings the tracked list up to date with the registry.
    ///
    /// On failure the previous list and state are kept, so the next
    /// successful refresh starts from a consistent point.
    pub fn refresh(&mut self) -> Result<Refresh, KstatError> {
        let source = self.source.as_mut().ok_or(KstatError::AlreadyClosed)?;
        let chain_id = source.chain_id().map_err(KstatError::ChainUpdateFailed)?;

        if self.state == (TrackerState::Tracking { chain_id }) {
            trace!(chain_id, "kstat chain unchanged");
            return Ok(Refresh::Unchanged);
        }

        let chain = source.chain().map_err(KstatError::ChainUpdateFailed)?;
        let chain_len = chain.len();
        self.tracked = chain
            .into_iter()
            .filter(|d| self.filter.matches(d))
            .collect();
        self.state = TrackerState::Tracking { chain_id };

        debug!(
            chain_id,
            chain_len,
            tracked = self.tracked.len(),
            filter = %self.filter,
            "Rebuilt tracked kstats"
        );
        Ok(Refresh::Rebuilt)
    }

    /// Releases the source. Irreversible.
    pub fn close(&mut self) -> Result<(), KstatError> {
        let source = self.source.take().ok_or(KstatError::AlreadyClosed)?;
        drop(source);
        self.tracked.clear();
        self.state = TrackerState::Uninitialized;
        debug!(filter = %self.filter, "Closed kstat chain tracker");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Descriptors matching the filter, in chain order.
    pub fn tracked(&self) -> &[Descriptor] {
        &self.tracked
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    /// Splits the tracker into its source and tracked list for a read pass.
    pub fn parts_mut(&mut self) -> Result<(&mut S, &[Descriptor]), KstatError> {
        let source = self.source.as_mut().ok_or(KstatError::AlreadyClosed)?;
        Ok((source, &self.tracked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::NamedBuilder;
    use crate::source::mock::MockKstat;

    fn names(tracker: &ChainTracker<MockKstat>) -> Vec<String> {
        tracker
            .tracked()
            .iter()
            .map(|d| format!("{}:{}:{}", d.module, d.instance, d.name))
            .collect()
    }

    #[test]
    fn test_initial_refresh_tracks_matching() {
        let mut tracker =
            ChainTracker::new(MockKstat::typical_system(), Filter::any().module("cpu"));
        assert_eq!(tracker.state(), TrackerState::Uninitialized);
        assert!(tracker.tracked().is_empty());

        assert_eq!(tracker.refresh().unwrap(), Refresh::Rebuilt);
        assert_eq!(
            names(&tracker),
            vec!["cpu:0:sys", "cpu:0:vm", "cpu:1:sys", "cpu:1:vm"]
        );
        assert!(matches!(tracker.state(), TrackerState::Tracking { .. }));
    }

    #[test]
    fn test_unchanged_chain_skips_walk() {
        let mut tracker = ChainTracker::new(MockKstat::typical_system(), Filter::any());
        tracker.refresh().unwrap();
        let before = tracker.tracked().to_vec();

        assert_eq!(tracker.refresh().unwrap(), Refresh::Unchanged);
        assert_eq!(tracker.refresh().unwrap(), Refresh::Unchanged);
        assert_eq!(tracker.tracked(), before.as_slice());
        assert_eq!(tracker.source().unwrap().chain_walks(), 1);
    }

    #[test]
    fn test_generation_change_rebuilds() {
        let mut mock = MockKstat::new();
        mock.add_named("cpu", "misc", "sys", 0, NamedBuilder::new().u32("a", 1));
        mock.add_named("cpu", "misc", "sys", 1, NamedBuilder::new().u32("a", 1));
        let mut tracker = ChainTracker::new(mock, Filter::any().name("sys"));
        tracker.refresh().unwrap();
        assert_eq!(names(&tracker), vec!["cpu:0:sys", "cpu:1:sys"]);

        let (source, _) = tracker.parts_mut().unwrap();
        source.remove("cpu", 0, "sys");
        source.add_named("cpu", "misc", "sys", 2, NamedBuilder::new().u32("a", 1));
        source.add_named("cpu", "misc", "vm", 2, NamedBuilder::new().u32("a", 1));

        assert_eq!(tracker.refresh().unwrap(), Refresh::Rebuilt);
        assert_eq!(names(&tracker), vec!["cpu:1:sys", "cpu:2:sys"]);
        assert_eq!(tracker.source().unwrap().chain_walks(), 2);
    }

    #[test]
    fn test_chain_update_failure_keeps_state() {
        let mut tracker = ChainTracker::new(MockKstat::typical_system(), Filter::any());
        tracker.refresh().unwrap();
        let state = tracker.state();
        let tracked = tracker.tracked().to_vec();

        let (source, _) = tracker.parts_mut().unwrap();
        source.fail_next_chain_update(12);
        source.remove("cpu", 0, "sys");

        let err = tracker.refresh().unwrap_err();
        assert!(matches!(err, KstatError::ChainUpdateFailed(_)));
        assert_eq!(err.raw_os_error(), Some(12));
        assert_eq!(tracker.state(), state);
        assert_eq!(tracker.tracked(), tracked.as_slice());

        assert_eq!(tracker.refresh().unwrap(), Refresh::Rebuilt);
        assert_eq!(tracker.tracked().len(), tracked.len() - 1);
    }

    #[test]
    fn test_close() {
        let mut tracker = ChainTracker::new(MockKstat::typical_system(), Filter::any());
        tracker.refresh().unwrap();

        tracker.close().unwrap();
        assert!(tracker.is_closed());
        assert!(tracker.tracked().is_empty());
        assert!(matches!(tracker.close(), Err(KstatError::AlreadyClosed)));
        assert!(matches!(tracker.refresh(), Err(KstatError::AlreadyClosed)));
        assert!(tracker.parts_mut().is_err());
    }

    #[test]
    fn test_filter_matching_nothing() {
        let mut tracker =
            ChainTracker::new(MockKstat::typical_system(), Filter::any().module("zfs"));
        assert_eq!(tracker.refresh().unwrap(), Refresh::Rebuilt);
        assert!(tracker.tracked().is_empty());
    }
}
