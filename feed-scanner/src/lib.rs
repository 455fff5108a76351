//! Scans the rendered feed, classifies each post once and hides the ones
//! whose scores cross a topic threshold.
//!
//! [`ScanLoop`] drives the cycle; the host page is reached only through
//! [`HostDocument`], so any tree that can answer the few selectors the
//! extractor needs can be scanned.

pub mod document;
pub mod extractor;
pub mod liveness;
pub mod rate_limiter;
pub mod scan_loop;
pub mod visibility;

pub use document::{FeedSnapshot, HostDocument, Selector, SnapshotDocument, SnapshotNode};
pub use extractor::{permalink, post_id_from_href, FeedMarkers, PostExtractor};
pub use liveness::{schedule_reload, spawn_liveness_watchdog, AlwaysAlive, LivenessFlag, LivenessProbe};
pub use rate_limiter::{IntervalGuard, Throttle};
pub use scan_loop::{CycleOutcome, CycleReport, PostOutcome, ScanContext, ScanLoop, ScoreSource};
pub use visibility::{decide, Decision, HideReport, TriggeredRule, VisibilityEngine, VisibilityOutcome};
