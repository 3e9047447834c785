//! Second dedup pass, on event titles.

use uuid::Uuid;

use smokescreen_common::config::ClusteringSettings;

use crate::clustering::EventDescriptor;
use crate::similarity::token_similarity;

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Descriptors to persist as new events.
    pub kept: Vec<EventDescriptor>,
    /// New descriptors folded into another new descriptor.
    pub merged: usize,
    /// Existing events that already cover a new descriptor, with the
    /// descriptor's article indices.
    pub matched_existing: Vec<(Uuid, Vec<usize>)>,
}

pub struct EventMerger {
    threshold: f64,
}

impl Default for EventMerger {
    fn default() -> Self {
        Self::new(&ClusteringSettings::default())
    }
}

impl EventMerger {
    pub fn new(settings: &ClusteringSettings) -> Self {
        Self {
            threshold: settings.merge_similarity,
        }
    }

    fn same_event(&self, a: &str, b: &str) -> bool {
        token_similarity(a, b) >= self.threshold
    }

    /// Merge near-duplicate descriptors with each other, then drop any that
    /// match an already-persisted event title. `existing` is `(id, title)`.
    pub fn merge(
        &self,
        descriptors: Vec<EventDescriptor>,
        existing: &[(Uuid, String)],
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut groups: Vec<EventDescriptor> = Vec::new();

        for descriptor in descriptors {
            match groups
                .iter_mut()
                .find(|g| self.same_event(&g.title, &descriptor.title))
            {
                Some(group) => {
                    absorb(group, descriptor);
                    outcome.merged += 1;
                }
                None => groups.push(descriptor),
            }
        }

        for group in groups {
            match existing
                .iter()
                .find(|(_, title)| self.same_event(title, &group.title))
            {
                Some((id, _)) => outcome.matched_existing.push((*id, group.article_indices)),
                None => outcome.kept.push(group),
            }
        }

        outcome
    }
}

/// Fold `other` into `group`: indices are unioned and metadata comes from
/// whichever side is more confident.
fn absorb(group: &mut EventDescriptor, other: EventDescriptor) {
    let mut indices = group.article_indices.clone();
    indices.extend(&other.article_indices);
    indices.sort_unstable();
    indices.dedup();

    if other.confidence > group.confidence {
        *group = other;
    }
    group.article_indices = indices;
}
