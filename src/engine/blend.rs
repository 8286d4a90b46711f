//! Evidence blending: fold scored pairs into per-(section, question)
//! observed means and effective sample sizes.
//!
//! Three relevance components (course, instructor, interaction) are weighted
//! by time-decayed response counts, then log-dampened so no single large
//! past section dominates the blend.

use std::collections::{BTreeMap, HashMap};

use crate::engine::params::QuestionParams;
use crate::engine::similarity::ScoredPair;
use crate::engine::types::{Report, ReportQuestion, Section, TimeGroup};

/// Observed blend for one (section, question) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendedRow {
    pub section_id: i32,
    pub question_id: i32,
    /// Dampened effective sample size across all three components.
    pub total_effective_n: f64,
    /// Observed blended mean in `[0, 1]`.
    pub blended_avg: f64,
    pub is_course_informed: bool,
    pub is_instructor_informed: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct ComponentSums {
    n: f64,
    n_mu: f64,
}

impl ComponentSums {
    fn add(&mut self, n: f64, mean: f64) {
        self.n += n;
        self.n_mu += n * mean;
    }

    fn mean(&self) -> f64 {
        if self.n > 0.0 { self.n_mu / self.n } else { 0.0 }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    course: ComponentSums,
    instructor: ComponentSums,
    interaction: ComponentSums,
}

/// Logarithmic dampening of an effective sample size; `k == 0` disables.
pub fn dampen(k: f64, n: f64) -> f64 {
    if k > 0.0 {
        (k * n + 1.0).ln() / (k + 1.0).ln()
    } else {
        n
    }
}

/// Blend all scored pairs into per-(section, question) observed rows.
///
/// `questions_by_report` must hold each report's rows sorted by question id,
/// and `scored` must be grouped by section with ascending report order
/// (the candidate generator guarantees this); reductions then happen in a
/// stable order and outputs are deterministic.
pub fn blend(
    scored: &[ScoredPair],
    sections: &[Section],
    reports: &[Report],
    questions_by_report: &HashMap<i32, Vec<ReportQuestion>>,
    params_by_question: &HashMap<i32, &QuestionParams>,
    target: TimeGroup,
) -> Vec<BlendedRow> {
    let mut groups: BTreeMap<(i32, i32), Accumulator> = BTreeMap::new();

    for pair in scored {
        let section = &sections[pair.section_idx];
        let report = &reports[pair.report_idx];
        let years_ago = target.start_year - report.start_year;

        let Some(report_questions) = questions_by_report.get(&report.report_id) else {
            continue;
        };

        for rq in report_questions {
            let Some(params) = params_by_question.get(&rq.question_id) else {
                continue;
            };

            let boost = (1.0 + params.w_career * pair.career_sim)
                * (1.0 + params.w_subject * pair.subject_match);
            let r_course = params.base_course * pair.course_match * boost;
            let r_instructor = params.base_instructor * pair.instructor_sim * boost;
            let r_interaction =
                params.base_interaction * pair.course_match * pair.instructor_sim * boost;

            if r_course == 0.0 && r_instructor == 0.0 && r_interaction == 0.0 {
                continue;
            }

            let decayed_n = rq.n * params.decay.powi(years_ago);

            let acc = groups
                .entry((section.section_id, rq.question_id))
                .or_default();
            acc.course.add(r_course * decayed_n, rq.normalized_mean);
            acc.instructor
                .add(r_instructor * decayed_n, rq.normalized_mean);
            acc.interaction
                .add(r_interaction * decayed_n, rq.normalized_mean);
        }
    }

    groups
        .into_iter()
        .map(|((section_id, question_id), acc)| {
            let k = params_by_question
                .get(&question_id)
                .map(|p| p.dampening_k)
                .unwrap_or(0.0);

            // Course and instructor evidence is dampened; the interaction
            // component is already the product of two matches and stays raw.
            let dn_course = dampen(k, acc.course.n);
            let dn_instructor = dampen(k, acc.instructor.n);
            let dn_interaction = acc.interaction.n;

            let total_effective_n = dn_course + dn_instructor + dn_interaction;
            let blended_avg = if total_effective_n > 0.0 {
                (dn_course * acc.course.mean()
                    + dn_instructor * acc.instructor.mean()
                    + dn_interaction * acc.interaction.mean())
                    / total_effective_n
            } else {
                0.0
            };

            BlendedRow {
                section_id,
                question_id,
                total_effective_n,
                blended_avg,
                is_course_informed: dn_course > 0.0,
                is_instructor_informed: dn_instructor > 0.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Quarter;

    fn target() -> TimeGroup {
        TimeGroup {
            start_year: 2024,
            quarter: Quarter::Winter,
        }
    }

    fn section(section_id: i32) -> Section {
        Section {
            section_id,
            course_id: 1,
            quarter: Quarter::Winter,
            course_ids: vec![1],
            instructor_ids: vec![100],
            career_ids: vec![1],
            subject_ids: vec![7],
        }
    }

    fn report(report_id: i32, start_year: i32) -> Report {
        Report {
            report_id,
            start_year,
            quarter: Quarter::Autumn,
            responded: 10,
            total: 10,
            course_ids: vec![1],
            instructor_ids: vec![100],
            career_ids: vec![1],
            subject_ids: vec![7],
        }
    }

    fn pair(report_idx: usize, course_match: f64, instructor_sim: f64) -> ScoredPair {
        ScoredPair {
            section_idx: 0,
            report_idx,
            course_match,
            instructor_sim,
            career_sim: 0.0,
            subject_match: 0.0,
        }
    }

    fn rq(report_id: i32, n: f64, mean: f64) -> (i32, Vec<ReportQuestion>) {
        (
            report_id,
            vec![ReportQuestion {
                report_id,
                question_id: 1,
                n,
                normalized_mean: mean,
            }],
        )
    }

    #[test]
    fn test_dampen_is_identity_when_disabled() {
        assert_eq!(dampen(0.0, 37.5), 37.5);
    }

    #[test]
    fn test_dampen_is_sublinear_and_anchored() {
        // n=0 maps to 0 and n=1 maps to 1 for any k.
        assert_eq!(dampen(2.0, 0.0), 0.0);
        assert!((dampen(2.0, 1.0) - 1.0).abs() < 1e-12);
        assert!(dampen(2.0, 100.0) < 100.0);
    }

    #[test]
    fn test_exact_match_blends_to_report_mean() {
        let params = QuestionParams::default();
        let params_by_question = HashMap::from([(1, &params)]);
        let questions_by_report = HashMap::from([rq(5, 10.0, 1.0)]);
        let rows = blend(
            &[pair(0, 1.0, 1.0)],
            &[section(42)],
            &[report(5, 2023)],
            &questions_by_report,
            &params_by_question,
            target(),
        );
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.section_id, 42);
        assert!(row.is_course_informed);
        assert!(row.is_instructor_informed);
        // Every component sees the same single mean.
        assert!((row.blended_avg - 1.0).abs() < 1e-12);
        assert!(row.total_effective_n > 0.0);
    }

    #[test]
    fn test_zero_relevance_rows_are_dropped() {
        // No course match and no instructor overlap: nothing survives.
        let params = QuestionParams::default();
        let params_by_question = HashMap::from([(1, &params)]);
        let questions_by_report = HashMap::from([rq(5, 10.0, 1.0)]);
        let rows = blend(
            &[pair(0, 0.0, 0.0)],
            &[section(42)],
            &[report(5, 2023)],
            &questions_by_report,
            &params_by_question,
            target(),
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn test_instructor_only_pair_sets_only_instructor_flag() {
        let params = QuestionParams::default();
        let params_by_question = HashMap::from([(1, &params)]);
        let questions_by_report = HashMap::from([rq(5, 10.0, 0.8)]);
        let rows = blend(
            &[pair(0, 0.0, 1.0)],
            &[section(42)],
            &[report(5, 2023)],
            &questions_by_report,
            &params_by_question,
            target(),
        );
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_course_informed);
        assert!(rows[0].is_instructor_informed);
        assert!((rows[0].blended_avg - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_time_decay_favors_recent_reports() {
        let params = QuestionParams {
            decay: 0.5,
            ..QuestionParams::default()
        };
        let params_by_question = HashMap::from([(1, &params)]);
        // Same n, recent report mean 1.0 vs four-year-old mean 0.5: the
        // recent report carries 2^4 = 16x the decayed weight.
        let mut questions_by_report = HashMap::new();
        questions_by_report.extend([rq(5, 10.0, 1.0), rq(6, 10.0, 0.5)]);
        let rows = blend(
            &[pair(0, 1.0, 1.0), pair(1, 1.0, 1.0)],
            &[section(42)],
            &[report(5, 2024), report(6, 2020)],
            &questions_by_report,
            &params_by_question,
            target(),
        );
        assert_eq!(rows.len(), 1);
        let blended = rows[0].blended_avg;
        assert!(blended > 0.94 && blended < 1.0, "blended={blended}");
    }

    #[test]
    fn test_boost_multiplies_relevance_not_mean() {
        let boosted = QuestionParams {
            w_career: 1.0,
            w_subject: 1.0,
            ..QuestionParams::default()
        };
        let params_by_question = HashMap::from([(1, &boosted)]);
        let questions_by_report = HashMap::from([rq(5, 10.0, 0.6)]);
        let full_boost = ScoredPair {
            career_sim: 1.0,
            subject_match: 1.0,
            ..pair(0, 1.0, 1.0)
        };
        let rows = blend(
            &[full_boost],
            &[section(42)],
            &[report(5, 2023)],
            &questions_by_report,
            &params_by_question,
            target(),
        );
        // The mean is unchanged; only the effective sample size grows.
        assert!((rows[0].blended_avg - 0.6).abs() < 1e-12);
    }
}
