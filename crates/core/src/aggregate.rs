//! Roll node states up into section and roadmap progress.

use crate::model::{ProgressRecord, ProgressTree, Section};

/// Completion counts for a section (or the whole roadmap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionProgress {
    pub completed_nodes: usize,
    pub total_nodes: usize,
    pub percentage: u8,
}

impl SectionProgress {
    #[must_use]
    pub fn new(completed_nodes: usize, total_nodes: usize) -> Self {
        Self {
            completed_nodes,
            total_nodes,
            percentage: percentage(completed_nodes, total_nodes),
        }
    }
}

/// `round(completed / total * 100)`, half-up, with `total == 0` giving 0.
#[must_use]
pub fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    let rounded = (completed * 100 + total / 2) / total;
    u8::try_from(rounded).unwrap_or(100)
}

/// Only completed nodes count; in-progress nodes add nothing.
#[must_use]
pub fn section_progress(section: &Section) -> SectionProgress {
    let completed = section
        .nodes()
        .iter()
        .filter(|n| n.state().is_completed())
        .count();
    SectionProgress::new(completed, section.nodes().len())
}

/// Index of the section the learner should continue with.
///
/// The first section that is in progress and not completed, else the first
/// section. `None` only for an empty tree.
#[must_use]
pub fn current_section(tree: &ProgressTree) -> Option<usize> {
    let sections = tree.sections();
    if sections.is_empty() {
        return None;
    }
    sections
        .iter()
        .position(|s| s.is_in_progress() && !s.is_completed())
        .or(Some(0))
}

/// Record with the latest `last_accessed_at`; ties keep the earlier entry.
#[must_use]
pub fn most_recent(records: &[ProgressRecord]) -> Option<&ProgressRecord> {
    records.iter().fold(None, |best: Option<&ProgressRecord>, r| match best {
        Some(b) if b.last_accessed_at >= r.last_accessed_at => Some(b),
        _ => Some(r),
    })
}

/// Everything a dashboard shows for one roadmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadmapOverview {
    pub sections: Vec<SectionProgress>,
    pub overall: SectionProgress,
    pub current_section: Option<usize>,
}

#[must_use]
pub fn overview(tree: &ProgressTree) -> RoadmapOverview {
    let sections: Vec<SectionProgress> = tree.sections().iter().map(section_progress).collect();
    let completed = sections.iter().map(|s| s.completed_nodes).sum();
    let total = sections.iter().map(|s| s.total_nodes).sum();
    RoadmapOverview {
        sections,
        overall: SectionProgress::new(completed, total),
        current_section: current_section(tree),
    }
}
