//! Word counts and speaking-time estimates.
//!
//! Statistics are computed from a [`ProjectSnapshot`], optionally on a worker thread. Results
//! carry the snapshot version and are only merged back while that version is still current.

use crate::annotation::{Annotation, AnnotationId};
use crate::document::Document;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::snapshot::ProjectSnapshot;
use crate::theme::ThemeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Spoken words of an annotation: words of its spans minus struck-through words.
pub fn annotation_words(document: &Document, annotation: &Annotation) -> usize {
    document.word_count_excluding(&annotation.spans, &annotation.strikethrough)
}

/// Speaking time for a word count.
pub fn estimate_duration(words: usize, words_per_minute: u32) -> Duration {
    if words_per_minute == 0 {
        return Duration::ZERO;
    }
    let seconds = (words as f64 / f64::from(words_per_minute) * 60.0).round();
    Duration::from_secs(seconds as u64)
}

/// Format a duration as `"{m}m:{ss}s"`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}m:{:02}s", total / 60, total % 60)
}

/// Aggregates of the storyboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryboardStats {
    /// Annotation entries.
    pub entries: usize,
    /// Divider entries.
    pub dividers: usize,
    /// Spoken words.
    pub words: usize,
    /// Estimated speaking time in seconds.
    pub seconds: u64,
    /// Entries per primary theme.
    pub per_theme: BTreeMap<ThemeId, usize>,
}

/// Statistics of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Snapshot version the report was computed from.
    pub version: u64,
    /// Storyboard aggregates.
    pub storyboard: StoryboardStats,
    /// Spoken words per annotation.
    pub per_annotation: BTreeMap<AnnotationId, usize>,
    /// Number of annotations.
    pub total_annotations: usize,
}

impl StatsReport {
    /// Compute a report synchronously.
    pub fn compute(snapshot: &ProjectSnapshot, words_per_minute: u32) -> Self {
        let document = snapshot.document();
        let per_annotation: BTreeMap<AnnotationId, usize> = snapshot
            .annotations()
            .iter()
            .map(|a| (a.id, annotation_words(document, a)))
            .collect();

        let mut storyboard = StoryboardStats::default();
        for entry in snapshot.storyboard().entries() {
            let Some(id) = entry.annotation() else {
                storyboard.dividers += 1;
                continue;
            };
            let Some(annotation) = snapshot.annotation(id) else {
                continue;
            };
            storyboard.entries += 1;
            storyboard.words += per_annotation.get(&id).copied().unwrap_or_default();
            *storyboard.per_theme.entry(annotation.meta.theme).or_default() += 1;
        }
        storyboard.seconds = estimate_duration(storyboard.words, words_per_minute).as_secs();

        Self {
            version: snapshot.version(),
            storyboard,
            total_annotations: per_annotation.len(),
            per_annotation,
        }
    }

    /// Estimated speaking time of the storyboard.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.storyboard.seconds)
    }
}

/// A statistics computation running on a worker thread.
#[derive(Debug)]
pub struct StatsJob {
    version: u64,
    handle: JoinHandle<StatsReport>,
}

impl StatsJob {
    /// Version of the snapshot being processed.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check if the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the report.
    pub fn join(self) -> EngineResult<StatsReport> {
        self.handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stats worker panicked".to_string());
            EngineError::Worker(message)
        })
    }
}

/// Compute statistics of a snapshot on a worker thread.
pub fn spawn_stats(snapshot: Arc<ProjectSnapshot>, words_per_minute: u32) -> StatsJob {
    let version = snapshot.version();
    let handle = std::thread::spawn(move || StatsReport::compute(&snapshot, words_per_minute));
    StatsJob { version, handle }
}

impl Engine {
    /// Compute statistics of the current state on a worker thread.
    pub fn spawn_stats(&self) -> StatsJob {
        spawn_stats(self.snapshot().shared(), self.config.words_per_minute)
    }

    /// Accept a report if it was computed from the current version. Stale reports are dropped.
    pub fn merge_stats(&mut self, report: StatsReport) -> bool {
        if self.has_changed_since(report.version) {
            log::debug!(
                "event=stats_merge module=stats status=stale report_version={} version={}",
                report.version,
                self.version()
            );
            return false;
        }
        self.stats = Some(report);
        true
    }

    /// The last merged report, if it is still current.
    pub fn stats(&self) -> Option<&StatsReport> {
        self.stats.as_ref().filter(|r| r.version == self.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_estimate_and_format() {
        assert_eq!(estimate_duration(200, 200), Duration::from_secs(60));
        assert_eq!(estimate_duration(250, 200), Duration::from_secs(75));
        assert_eq!(estimate_duration(10, 0), Duration::ZERO);
        assert_eq!(format_duration(Duration::from_secs(75)), "1m:15s");
        assert_eq!(format_duration(Duration::from_secs(5)), "0m:05s");
    }
}
