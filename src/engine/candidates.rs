//! Candidate pair generation: which historical reports are worth scoring
//! against which target sections.
//!
//! A report is eligible for a time group when it falls inside the lookback
//! window and does not postdate the target quarter. Candidate pairs are the
//! union of course-id overlap and instructor-id overlap; everything else is
//! never considered.

use std::collections::{BTreeMap, HashMap};

use crate::engine::types::{Report, Section, TimeGroup};

/// A (section, report) pair selected for scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePair {
    pub section_idx: usize,
    pub report_idx: usize,
    /// Whether the pair shares at least one course id.
    pub course_match: bool,
    /// Number of intersecting instructor ids.
    pub shared_instructors: usize,
}

/// Indices of reports eligible for the target time group, in input order.
///
/// Eligibility: `years_ago ∈ [0, max_years]`, and same-year reports must not
/// come from a quarter after the target's.
pub fn eligible_reports(reports: &[Report], target: TimeGroup, max_years: i32) -> Vec<usize> {
    reports
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let years_ago = target.start_year - r.start_year;
            if years_ago < 0 || years_ago > max_years {
                return false;
            }
            years_ago > 0 || r.quarter.ord() <= target.quarter.ord()
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Enumerate candidate pairs between target sections and eligible reports.
///
/// Pairs are emitted grouped by section (in input order) and ordered by
/// report index within each section, so downstream reductions are stable.
pub fn generate_candidates(
    sections: &[Section],
    reports: &[Report],
    eligible: &[usize],
) -> Vec<CandidatePair> {
    // Inverted indexes over the eligible reports only.
    let mut by_course: HashMap<i32, Vec<usize>> = HashMap::new();
    let mut by_instructor: HashMap<i32, Vec<usize>> = HashMap::new();
    for &report_idx in eligible {
        let report = &reports[report_idx];
        for &course_id in &report.course_ids {
            by_course.entry(course_id).or_default().push(report_idx);
        }
        for &instructor_id in &report.instructor_ids {
            by_instructor
                .entry(instructor_id)
                .or_default()
                .push(report_idx);
        }
    }

    let mut pairs = Vec::new();
    for (section_idx, section) in sections.iter().enumerate() {
        // BTreeMap keeps the per-section pair order stable by report index.
        let mut matched: BTreeMap<usize, (bool, usize)> = BTreeMap::new();

        for course_id in &section.course_ids {
            if let Some(report_idxs) = by_course.get(course_id) {
                for &report_idx in report_idxs {
                    matched.entry(report_idx).or_insert((false, 0)).0 = true;
                }
            }
        }
        for instructor_id in &section.instructor_ids {
            if let Some(report_idxs) = by_instructor.get(instructor_id) {
                for &report_idx in report_idxs {
                    matched.entry(report_idx).or_insert((false, 0)).1 += 1;
                }
            }
        }

        pairs.extend(
            matched
                .into_iter()
                .map(|(report_idx, (course_match, shared_instructors))| CandidatePair {
                    section_idx,
                    report_idx,
                    course_match,
                    shared_instructors,
                }),
        );
    }
    pairs
}
