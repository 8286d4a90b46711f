//! The smart-average scoring pipeline.
//!
//! For each target time group: enumerate candidate (section, report) pairs,
//! score similarities, blend time-decayed evidence, compute hierarchical
//! priors, shrink, and rescale. Pure over the ingested frames; persistence
//! lives in `crate::data`.

pub mod blend;
pub mod candidates;
pub mod normalize;
pub mod params;
pub mod priors;
pub mod shrink;
pub mod similarity;
pub mod types;

use std::collections::HashMap;

use tracing::debug;

use crate::engine::params::{ParamRegistry, QuestionParams};
use crate::engine::types::{
    QuestionScale, Report, ReportQuestion, Section, SmartAverageRow, TimeGroup,
};
use crate::error::Result;

/// Ingested input frames, shared by every time group of a run.
pub struct Frames {
    /// Target-year sections across all quarters.
    pub sections: Vec<Section>,
    /// Historical reports inside the lookback window, sorted by report id.
    pub reports: Vec<Report>,
    /// Normalized per-(report, question) aggregates.
    pub report_questions: Vec<ReportQuestion>,
    /// Global question scales.
    pub scales: Vec<QuestionScale>,
}

/// Output of scoring one time group.
pub struct TimeGroupOutput {
    /// Final rows, sorted by `(section_id, question_id)`.
    pub rows: Vec<SmartAverageRow>,
    /// Every section that was a scoring target, whether or not it produced
    /// rows. The persister deletes stale rows for all of them.
    pub scored_section_ids: Vec<i32>,
}

/// Score every section of one `(year, quarter)` time group.
pub fn score_time_group(
    frames: &Frames,
    target: TimeGroup,
    registry: &ParamRegistry,
    max_years: i32,
) -> Result<TimeGroupOutput> {
    let sections: Vec<Section> = frames
        .sections
        .iter()
        .filter(|s| s.quarter == target.quarter)
        .cloned()
        .collect();

    let mut scored_section_ids: Vec<i32> = sections.iter().map(|s| s.section_id).collect();
    scored_section_ids.sort_unstable();
    scored_section_ids.dedup();

    if sections.is_empty() {
        debug!(%target, "no target sections; nothing to score");
        return Ok(TimeGroupOutput {
            rows: Vec::new(),
            scored_section_ids,
        });
    }

    let eligible = candidates::eligible_reports(&frames.reports, target, max_years);
    if eligible.is_empty() {
        debug!(%target, "no eligible reports in lookback window");
        return Ok(TimeGroupOutput {
            rows: Vec::new(),
            scored_section_ids,
        });
    }

    let scales_by_question: HashMap<i32, &QuestionScale> = frames
        .scales
        .iter()
        .map(|s| (s.question_id, s))
        .collect();
    let params_by_question: HashMap<i32, &QuestionParams> = frames
        .scales
        .iter()
        .map(|s| (s.question_id, registry.resolve(&s.question_text)))
        .collect();

    // Per-report question rows, sorted by question id for stable reductions.
    let mut questions_by_report: HashMap<i32, Vec<ReportQuestion>> = HashMap::new();
    for rq in &frames.report_questions {
        questions_by_report
            .entry(rq.report_id)
            .or_default()
            .push(rq.clone());
    }
    for rows in questions_by_report.values_mut() {
        rows.sort_by_key(|rq| rq.question_id);
    }

    let pairs = candidates::generate_candidates(&sections, &frames.reports, &eligible);
    debug!(%target, candidates = pairs.len(), "candidates built");

    let scored = similarity::score_pairs(&pairs, &sections, &frames.reports);
    debug!(%target, scored = scored.len(), "similarities scored");

    let blended = blend::blend(
        &scored,
        &sections,
        &frames.reports,
        &questions_by_report,
        &params_by_question,
        target,
    );
    debug!(%target, blended = blended.len(), "evidence blended");

    let priors = priors::compute_priors(
        &sections,
        &frames.reports,
        &eligible,
        &questions_by_report,
        &params_by_question,
        target,
    );
    debug!(%target, priors = priors.len(), "priors computed");

    let rows = shrink::assemble(
        &blended,
        &sections,
        &priors,
        &scales_by_question,
        &params_by_question,
        &target.to_string(),
    )?;
    debug!(%target, rows = rows.len(), "shrunk and assembled");

    Ok(TimeGroupOutput {
        rows,
        scored_section_ids,
    })
}
