//! Hierarchical priors: what a typical evaluation looks like for a section's
//! (subjects, careers) cohort, before any section-specific evidence.
//!
//! Three backoff levels, each shrunk toward its parent with weight `m`:
//! career cohort, then subject cohort, then the (subject x career)
//! interaction. Weighted means use time-decayed response counts, so the
//! prior reflects recent norms more than ancient ones.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::engine::params::QuestionParams;
use crate::engine::similarity::intersects;
use crate::engine::types::{Report, ReportQuestion, Section, TimeGroup};

/// Canonical cohort identity for prior lookup.
///
/// Built from sorted id lists so that sections with identical cohorts in a
/// different order share one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriorKey {
    pub subjects: Vec<i32>,
    pub careers: Vec<i32>,
}

impl PriorKey {
    pub fn for_section(section: &Section) -> Self {
        let mut subjects = section.subject_ids.clone();
        let mut careers = section.career_ids.clone();
        subjects.sort_unstable();
        subjects.dedup();
        careers.sort_unstable();
        careers.dedup();
        PriorKey { subjects, careers }
    }
}

/// A resolved prior for one (cohort, question).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    /// Normalized prior mean in `[0, 1]`.
    pub prior: f64,
    /// Whether any subject-level evidence backed this prior.
    pub subject_informed: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct WeightedSum {
    n: f64,
    sum: f64,
}

impl WeightedSum {
    fn add(&mut self, n: f64, mean: f64) {
        self.n += n;
        self.sum += n * mean;
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0.0).then(|| self.sum / self.n)
    }
}

/// Compute priors for every (cohort, question) needed by the given sections.
///
/// Questions with `m = None` are skipped entirely. Reports are folded in
/// eligibility order (ascending report id), so results are deterministic.
pub fn compute_priors(
    sections: &[Section],
    reports: &[Report],
    eligible: &[usize],
    questions_by_report: &HashMap<i32, Vec<ReportQuestion>>,
    params_by_question: &HashMap<i32, &QuestionParams>,
    target: TimeGroup,
) -> BTreeMap<(PriorKey, i32), Prior> {
    let keys: BTreeSet<PriorKey> = sections.iter().map(PriorKey::for_section).collect();

    let question_ids: BTreeSet<i32> = params_by_question
        .iter()
        .filter(|(_, p)| p.m.is_some())
        .map(|(&qid, _)| qid)
        .collect();

    let mut priors = BTreeMap::new();

    for &question_id in &question_ids {
        let params = params_by_question[&question_id];
        let Some(m) = params.m else { continue };

        // Per-report decayed evidence for this question, in report order.
        let evidence: Vec<(usize, f64, f64)> = eligible
            .iter()
            .filter_map(|&report_idx| {
                let report = &reports[report_idx];
                let rq = questions_by_report
                    .get(&report.report_id)?
                    .iter()
                    .find(|rq| rq.question_id == question_id)?;
                let years_ago = target.start_year - report.start_year;
                let decayed_n = rq.n * params.decay.powi(years_ago);
                Some((report_idx, decayed_n, rq.normalized_mean))
            })
            .collect();

        let mut global = WeightedSum::default();
        for &(_, n, mean) in &evidence {
            global.add(n, mean);
        }
        let Some(global_mean) = global.mean() else {
            // No evidence anywhere for this question in the time group.
            continue;
        };

        for key in &keys {
            let mut career = WeightedSum::default();
            let mut subject = WeightedSum::default();
            let mut both = WeightedSum::default();

            for &(report_idx, n, mean) in &evidence {
                let report = &reports[report_idx];
                let career_overlap = intersects(&report.career_ids, &key.careers);
                let subject_overlap = intersects(&report.subject_ids, &key.subjects);
                if career_overlap {
                    career.add(n, mean);
                }
                if subject_overlap {
                    subject.add(n, mean);
                }
                if career_overlap && subject_overlap {
                    both.add(n, mean);
                }
            }

            // Level 3: career cohort, falling back to the time group's
            // overall mean when the section has no careers (or none match).
            let prior_3 = career.mean().unwrap_or(global_mean);
            // Levels 2 and 1 shrink toward their parent; an empty level
            // reduces to the parent exactly.
            let prior_2 = (subject.sum + m * prior_3) / (subject.n + m);
            let prior = (both.sum + m * prior_2) / (both.n + m);

            priors.insert(
                (key.clone(), question_id),
                Prior {
                    prior,
                    subject_informed: subject.n > 0.0 || both.n > 0.0,
                },
            );
        }
    }

    priors
}
