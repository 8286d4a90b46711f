//! Ingestion of the normalized inputs into typed in-memory frames.
//!
//! Identity sets are expanded out of the relational schema with
//! `array_agg(DISTINCT ...)` and canonicalized (sorted, deduplicated) on the
//! way in. All queries order by primary key so downstream reductions see a
//! stable row order.

use sqlx::PgPool;
use tracing::debug;

use crate::engine::types::{
    Quarter, QuestionScale, Report, ReportQuestionRaw, Section, canonicalize_ids,
    parse_year_start,
};
use crate::error::{EngineError, Result};

/// Global response scale per question, derived from all observed weights.
pub async fn load_question_scales(pool: &PgPool) -> Result<Vec<QuestionScale>> {
    let rows = sqlx::query_as::<_, (i32, String, f64, f64)>(
        r#"
        SELECT q.question_id, q.question_text,
               MIN(r.weight)::float8 AS w_min,
               MAX(r.weight)::float8 AS w_max
        FROM questions q
        JOIN responses r ON r.question_id = q.question_id
        GROUP BY q.question_id, q.question_text
        ORDER BY q.question_id
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::ingestion("loading question scales", e))?;

    let scales = rows
        .into_iter()
        .map(|(question_id, question_text, w_min, w_max)| QuestionScale {
            question_id,
            question_text,
            w_min,
            w_max,
        })
        .collect::<Vec<_>>();
    debug!(questions = scales.len(), "loaded question scales");
    Ok(scales)
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    report_id: i32,
    year: String,
    term_quarter: String,
    responded: i32,
    total: i32,
    course_ids: Vec<i32>,
    instructor_ids: Vec<i32>,
    career_ids: Vec<i32>,
    subject_ids: Vec<i32>,
}

/// Reports within the lookback window, with identity sets resolved through
/// the sections they cover.
pub async fn load_reports(pool: &PgPool, min_year: i32, max_year: i32) -> Result<Vec<Report>> {
    let rows = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT r.report_id, r.year, r.term_quarter, r.responded, r.total,
               COALESCE(array_agg(DISTINCT co.course_id)
                        FILTER (WHERE co.course_id IS NOT NULL), '{}') AS course_ids,
               COALESCE(array_agg(DISTINCT si.instructor_id)
                        FILTER (WHERE si.instructor_id IS NOT NULL), '{}') AS instructor_ids,
               COALESCE(array_agg(DISTINCT co.academic_career_id)
                        FILTER (WHERE co.academic_career_id IS NOT NULL), '{}') AS career_ids,
               COALESCE(array_agg(DISTINCT co.subject_id)
                        FILTER (WHERE co.subject_id IS NOT NULL), '{}') AS subject_ids
        FROM reports r
        JOIN report_sections rs ON rs.report_id = r.report_id
        JOIN sections s ON s.section_id = rs.section_id
        JOIN course_offerings co ON co.id = s.course_offering_id
        LEFT JOIN schedules sc ON sc.section_id = s.section_id
        LEFT JOIN schedule_instructors si ON si.schedule_id = sc.id
        WHERE split_part(r.year, '-', 1)::int BETWEEN $1 AND $2
        GROUP BY r.report_id, r.year, r.term_quarter, r.responded, r.total
        ORDER BY r.report_id
        "#,
    )
    .bind(min_year)
    .bind(max_year)
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::ingestion("loading reports", e))?;

    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        let start_year = parse_year_start(&row.year).ok_or_else(|| {
            EngineError::ingestion(
                "parsing report year",
                anyhow::anyhow!("report {} has malformed year {:?}", row.report_id, row.year),
            )
        })?;
        let quarter = Quarter::parse(&row.term_quarter).ok_or_else(|| {
            EngineError::ingestion(
                "parsing report quarter",
                anyhow::anyhow!(
                    "report {} has unrecognized quarter {:?}",
                    row.report_id,
                    row.term_quarter
                ),
            )
        })?;

        let mut report = Report {
            report_id: row.report_id,
            start_year,
            quarter,
            responded: row.responded,
            total: row.total,
            course_ids: row.course_ids,
            instructor_ids: row.instructor_ids,
            career_ids: row.career_ids,
            subject_ids: row.subject_ids,
        };
        canonicalize_ids(&mut report.course_ids);
        canonicalize_ids(&mut report.instructor_ids);
        canonicalize_ids(&mut report.career_ids);
        canonicalize_ids(&mut report.subject_ids);
        reports.push(report);
    }
    debug!(reports = reports.len(), min_year, max_year, "loaded reports");
    Ok(reports)
}

#[derive(sqlx::FromRow)]
struct ReportQuestionRow {
    report_id: i32,
    question_id: i32,
    weights: Vec<f64>,
    frequencies: Vec<i32>,
}

/// Raw response distributions for every (report, question) in the window.
///
/// Non-finite weights violate the input contract and abort ingestion.
pub async fn load_report_questions(
    pool: &PgPool,
    min_year: i32,
    max_year: i32,
) -> Result<Vec<ReportQuestionRaw>> {
    let rows = sqlx::query_as::<_, ReportQuestionRow>(
        r#"
        SELECT res.report_id, res.question_id,
               array_agg(res.weight::float8 ORDER BY res.weight) AS weights,
               array_agg(res.frequency ORDER BY res.weight) AS frequencies
        FROM responses res
        JOIN reports r ON r.report_id = res.report_id
        WHERE split_part(r.year, '-', 1)::int BETWEEN $1 AND $2
        GROUP BY res.report_id, res.question_id
        ORDER BY res.report_id, res.question_id
        "#,
    )
    .bind(min_year)
    .bind(max_year)
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::ingestion("loading report questions", e))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.weights.iter().any(|w| !w.is_finite()) {
            return Err(EngineError::ingestion(
                "validating response weights",
                anyhow::anyhow!(
                    "non-finite weight in report {} question {}",
                    row.report_id,
                    row.question_id
                ),
            ));
        }
        out.push(ReportQuestionRaw {
            report_id: row.report_id,
            question_id: row.question_id,
            weights: row.weights,
            frequencies: row.frequencies,
        });
    }
    debug!(rows = out.len(), "loaded report question distributions");
    Ok(out)
}

#[derive(sqlx::FromRow)]
struct SectionRow {
    section_id: i32,
    course_id: i32,
    term_quarter: String,
    instructor_ids: Vec<i32>,
    career_ids: Vec<i32>,
    subject_ids: Vec<i32>,
}

/// Target sections for the given academic year.
///
/// Subject and career sets are unioned across all offerings of the section's
/// course in the target year, so joint-listed courses share cohorts.
/// Cancelled and non-principal sections are not scoring targets.
pub async fn load_target_sections(pool: &PgPool, year: &str) -> Result<Vec<Section>> {
    let rows = sqlx::query_as::<_, SectionRow>(
        r#"
        WITH course_sets AS (
            SELECT co.course_id,
                   COALESCE(array_agg(DISTINCT co.subject_id)
                            FILTER (WHERE co.subject_id IS NOT NULL), '{}') AS subject_ids,
                   COALESCE(array_agg(DISTINCT co.academic_career_id)
                            FILTER (WHERE co.academic_career_id IS NOT NULL), '{}') AS career_ids
            FROM course_offerings co
            WHERE co.year = $1
            GROUP BY co.course_id
        )
        SELECT s.section_id, co.course_id, s.term_quarter,
               COALESCE(array_agg(DISTINCT si.instructor_id)
                        FILTER (WHERE si.instructor_id IS NOT NULL), '{}') AS instructor_ids,
               cs.career_ids, cs.subject_ids
        FROM sections s
        JOIN course_offerings co ON co.id = s.course_offering_id AND co.year = $1
        JOIN course_sets cs ON cs.course_id = co.course_id
        LEFT JOIN schedules sc ON sc.section_id = s.section_id
        LEFT JOIN schedule_instructors si ON si.schedule_id = sc.id
        WHERE s.cancelled = FALSE AND s.is_principal = TRUE
        GROUP BY s.section_id, co.course_id, s.term_quarter, cs.career_ids, cs.subject_ids
        ORDER BY s.section_id
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::ingestion("loading target sections", e))?;

    let mut sections = Vec::with_capacity(rows.len());
    for row in rows {
        let quarter = Quarter::parse(&row.term_quarter).ok_or_else(|| {
            EngineError::ingestion(
                "parsing section quarter",
                anyhow::anyhow!(
                    "section {} has unrecognized quarter {:?}",
                    row.section_id,
                    row.term_quarter
                ),
            )
        })?;
        let mut section = Section {
            section_id: row.section_id,
            course_id: row.course_id,
            quarter,
            course_ids: vec![row.course_id],
            instructor_ids: row.instructor_ids,
            career_ids: row.career_ids,
            subject_ids: row.subject_ids,
        };
        canonicalize_ids(&mut section.instructor_ids);
        canonicalize_ids(&mut section.career_ids);
        canonicalize_ids(&mut section.subject_ids);
        sections.push(section);
    }
    debug!(sections = sections.len(), year, "loaded target sections");
    Ok(sections)
}
