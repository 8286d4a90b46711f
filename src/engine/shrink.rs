//! Shrinkage and assembly: fuse observed blends with hierarchical priors and
//! rescale to each question's original response range.

use std::collections::{BTreeMap, HashMap};

use crate::engine::blend::BlendedRow;
use crate::engine::params::QuestionParams;
use crate::engine::priors::{Prior, PriorKey};
use crate::engine::types::{QuestionScale, Section, SmartAverageRow};
use crate::error::{EngineError, Result};

/// Fuse observed and prior evidence into the final output rows.
///
/// Questions with priors disabled emit only where observed evidence exists.
/// Questions with priors emit for every section whose row is informative in
/// at least one sense (course, instructor, or subject). Output is sorted by
/// `(section_id, question_id)`.
pub fn assemble(
    blended: &[BlendedRow],
    sections: &[Section],
    priors: &BTreeMap<(PriorKey, i32), Prior>,
    scales_by_question: &HashMap<i32, &QuestionScale>,
    params_by_question: &HashMap<i32, &QuestionParams>,
    time_group: &str,
) -> Result<Vec<SmartAverageRow>> {
    let observed: HashMap<(i32, i32), &BlendedRow> = blended
        .iter()
        .map(|row| ((row.section_id, row.question_id), row))
        .collect();

    let mut section_order: Vec<&Section> = sections.iter().collect();
    section_order.sort_by_key(|s| s.section_id);

    let mut question_ids: Vec<i32> = scales_by_question.keys().copied().collect();
    question_ids.sort_unstable();

    let mut out = Vec::new();
    for section in section_order {
        let key = PriorKey::for_section(section);
        for &question_id in &question_ids {
            let scale = scales_by_question[&question_id];
            let Some(params) = params_by_question.get(&question_id) else {
                continue;
            };
            let row = observed.get(&(section.section_id, question_id));

            let (normalized, is_course_informed, is_instructor_informed) = match params.m {
                None => {
                    // Observed-only: no evidence, no row.
                    let Some(row) = row else { continue };
                    (
                        row.blended_avg,
                        row.is_course_informed,
                        row.is_instructor_informed,
                    )
                }
                Some(m) => {
                    let (total, avg, course, instructor) = match row {
                        Some(row) => (
                            row.total_effective_n,
                            row.blended_avg,
                            row.is_course_informed,
                            row.is_instructor_informed,
                        ),
                        None => (0.0, 0.0, false, false),
                    };
                    let prior = priors
                        .get(&(key.clone(), question_id))
                        .copied()
                        .unwrap_or(Prior {
                            prior: 0.0,
                            subject_informed: false,
                        });
                    if !course && !instructor && !prior.subject_informed {
                        continue;
                    }
                    let normalized = (total * avg + m * prior.prior) / (total + m);
                    (normalized, course, instructor)
                }
            };

            let smart_average = normalized * scale.width() + scale.w_min;
            if !smart_average.is_finite() {
                return Err(EngineError::Computation {
                    time_group: time_group.to_string(),
                    question_id,
                    message: format!(
                        "non-finite smart average for section {}",
                        section.section_id
                    ),
                });
            }

            out.push(SmartAverageRow {
                section_id: section.section_id,
                question_id,
                smart_average,
                is_course_informed,
                is_instructor_informed,
            });
        }
    }

    Ok(out)
}
