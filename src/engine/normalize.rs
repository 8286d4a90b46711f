//! Report normalization: raw response distributions to `[0, 1]` means.
//!
//! Normalization uses the question's global scale rather than per-report
//! observed extremes, so sparse or lopsided distributions stay comparable
//! across reports.

use std::collections::HashMap;

use tracing::debug;

use crate::engine::types::{QuestionScale, ReportQuestion, ReportQuestionRaw};
use crate::error::{EngineError, Result};

/// Convert each raw (report, question) distribution to a normalized mean.
///
/// Rows with an empty distribution (`n == 0`) are skipped. A scale with
/// `w_max < w_min` is a computation error; a degenerate scale
/// (`w_max == w_min`) normalizes to 0.
pub fn normalize_report_questions(
    raw: &[ReportQuestionRaw],
    scales: &HashMap<i32, QuestionScale>,
) -> Result<Vec<ReportQuestion>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;

    for row in raw {
        let Some(scale) = scales.get(&row.question_id) else {
            // Responses for a question the scale frame doesn't know about;
            // nothing to normalize against.
            skipped += 1;
            continue;
        };
        if scale.w_max < scale.w_min {
            return Err(EngineError::Computation {
                time_group: "(normalization)".to_string(),
                question_id: row.question_id,
                message: format!(
                    "scale is inverted: w_min={} w_max={}",
                    scale.w_min, scale.w_max
                ),
            });
        }

        let n: f64 = row.frequencies.iter().map(|&f| f as f64).sum();
        if n == 0.0 {
            skipped += 1;
            continue;
        }

        let weighted: f64 = row
            .weights
            .iter()
            .zip(&row.frequencies)
            .map(|(&w, &f)| w * f as f64)
            .sum();
        let raw_mean = weighted / n;

        let normalized_mean = if scale.width() > 0.0 {
            (raw_mean - scale.w_min) / scale.width()
        } else {
            0.0
        };

        if !normalized_mean.is_finite() {
            return Err(EngineError::Computation {
                time_group: "(normalization)".to_string(),
                question_id: row.question_id,
                message: format!("non-finite normalized mean for report {}", row.report_id),
            });
        }

        out.push(ReportQuestion {
            report_id: row.report_id,
            question_id: row.question_id,
            n,
            normalized_mean,
        });
    }

    if skipped > 0 {
        debug!(skipped, "skipped report questions with no usable responses");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(question_id: i32, w_min: f64, w_max: f64) -> (i32, QuestionScale) {
        (
            question_id,
            QuestionScale {
                question_id,
                question_text: format!("question {question_id}"),
                w_min,
                w_max,
            },
        )
    }

    #[test]
    fn test_normalizes_against_global_scale() {
        let scales = HashMap::from([scale(1, 1.0, 5.0)]);
        let raw = vec![ReportQuestionRaw {
            report_id: 10,
            question_id: 1,
            weights: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            frequencies: vec![0, 0, 0, 0, 10],
        }];
        let rows = normalize_report_questions(&raw, &scales).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].n, 10.0);
        assert_eq!(rows[0].normalized_mean, 1.0);
    }

    #[test]
    fn test_mixed_distribution() {
        let scales = HashMap::from([scale(1, 1.0, 5.0)]);
        let raw = vec![ReportQuestionRaw {
            report_id: 10,
            question_id: 1,
            weights: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            frequencies: vec![2, 0, 0, 0, 2],
        }];
        let rows = normalize_report_questions(&raw, &scales).unwrap();
        // raw mean 3.0 on a 1..5 scale
        assert_eq!(rows[0].normalized_mean, 0.5);
    }

    #[test]
    fn test_empty_distribution_is_skipped() {
        let scales = HashMap::from([scale(1, 1.0, 5.0)]);
        let raw = vec![ReportQuestionRaw {
            report_id: 10,
            question_id: 1,
            weights: vec![1.0, 2.0],
            frequencies: vec![0, 0],
        }];
        let rows = normalize_report_questions(&raw, &scales).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_degenerate_scale_normalizes_to_zero() {
        let scales = HashMap::from([scale(1, 3.0, 3.0)]);
        let raw = vec![ReportQuestionRaw {
            report_id: 10,
            question_id: 1,
            weights: vec![3.0],
            frequencies: vec![5],
        }];
        let rows = normalize_report_questions(&raw, &scales).unwrap();
        assert_eq!(rows[0].normalized_mean, 0.0);
    }

    #[test]
    fn test_inverted_scale_is_an_error() {
        let scales = HashMap::from([scale(1, 5.0, 1.0)]);
        let raw = vec![ReportQuestionRaw {
            report_id: 10,
            question_id: 1,
            weights: vec![3.0],
            frequencies: vec![5],
        }];
        assert!(matches!(
            normalize_report_questions(&raw, &scales),
            Err(EngineError::Computation { question_id: 1, .. })
        ));
    }
}
