//! Similarity signals between a target section and a candidate report.

use crate::engine::candidates::CandidatePair;
use crate::engine::types::{Report, Section};

/// A candidate pair with its similarity signals attached.
#[derive(Debug, Clone, Copy)]
pub struct ScoredPair {
    pub section_idx: usize,
    pub report_idx: usize,
    /// 1.0 when the pair shares a course id, else 0.0.
    pub course_match: f64,
    /// Square root of instructor-set Jaccard similarity.
    pub instructor_sim: f64,
    /// Square root of academic-career-set Jaccard similarity.
    pub career_sim: f64,
    /// 1.0 when the pair shares a subject id, else 0.0.
    pub subject_match: f64,
}

/// Count of common elements between two sorted id slices.
fn intersection_size(a: &[i32], b: &[i32]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// Square-root Jaccard similarity over two sorted id sets.
///
/// The square root dampens the penalty of small overlaps without saturating
/// near 1. Empty unions score 0.
pub fn sqrt_jaccard(a: &[i32], b: &[i32]) -> f64 {
    let intersection = intersection_size(a, b);
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    (intersection as f64 / union as f64).sqrt()
}

/// Whether two sorted id sets share any element.
pub fn intersects(a: &[i32], b: &[i32]) -> bool {
    intersection_size(a, b) > 0
}

/// Attach similarity signals to every candidate pair, preserving order.
pub fn score_pairs(
    pairs: &[CandidatePair],
    sections: &[Section],
    reports: &[Report],
) -> Vec<ScoredPair> {
    pairs
        .iter()
        .map(|pair| {
            let section = &sections[pair.section_idx];
            let report = &reports[pair.report_idx];
            ScoredPair {
                section_idx: pair.section_idx,
                report_idx: pair.report_idx,
                course_match: if pair.course_match { 1.0 } else { 0.0 },
                instructor_sim: sqrt_jaccard(&section.instructor_ids, &report.instructor_ids),
                career_sim: sqrt_jaccard(&section.career_ids, &report.career_ids),
                subject_match: if intersects(&section.subject_ids, &report.subject_ids) {
                    1.0
                } else {
                    0.0
                },
            }
        })
        .collect()
}
