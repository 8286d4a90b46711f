//! Idempotent persistence of smart averages.
//!
//! Each time group's output is written as a sequence of chunked three-way
//! merges: matched rows are updated, new rows inserted, and rows for scored
//! sections that this run did not produce are deleted. Chunk boundaries are
//! aligned to section boundaries so the delete predicate is always safe, and
//! each chunk commits in its own transaction to keep transactions bounded.

use std::ops::Range;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::types::SmartAverageRow;
use crate::error::{EngineError, Result};

/// One persistence unit: a contiguous run of sections and their output rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Every scored section in this chunk, rows or not. Stale rows for all
    /// of them are deleted.
    pub section_ids: Vec<i32>,
    /// Index range into the sorted output rows.
    pub rows: Range<usize>,
}

/// Partition sorted output rows into at most `chunk_count` section-aligned
/// chunks.
///
/// `rows` must be sorted by `(section_id, question_id)` and
/// `scored_section_ids` sorted ascending, covering every row's section.
/// Scored sections without rows are carried along so their stale rows are
/// still deleted. Cut points are approximate row-count targets advanced
/// forward to the next section boundary.
pub fn plan_chunks(
    rows: &[SmartAverageRow],
    scored_section_ids: &[i32],
    chunk_count: usize,
) -> Vec<Chunk> {
    if scored_section_ids.is_empty() {
        return Vec::new();
    }
    let chunk_count = chunk_count.max(1);
    let target = rows.len().div_ceil(chunk_count).max(1);

    let mut chunks = Vec::new();
    let mut section_ids = Vec::new();
    let mut start = 0usize;
    let mut pos = 0usize;

    for &section_id in scored_section_ids {
        section_ids.push(section_id);
        while pos < rows.len() && rows[pos].section_id == section_id {
            pos += 1;
        }
        if pos - start >= target && chunks.len() + 1 < chunk_count {
            chunks.push(Chunk {
                section_ids: std::mem::take(&mut section_ids),
                rows: start..pos,
            });
            start = pos;
        }
    }
    if !section_ids.is_empty() {
        chunks.push(Chunk {
            section_ids,
            rows: start..pos,
        });
    }
    chunks
}

/// Merge one time group's output into the evaluations table.
///
/// Chunks run sequentially; cancellation is honored between chunks, leaving
/// already-committed chunks in place. Returns the number of rows upserted.
pub async fn persist_time_group(
    pool: &PgPool,
    rows: &[SmartAverageRow],
    scored_section_ids: &[i32],
    chunk_count: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    let chunks = plan_chunks(rows, scored_section_ids, chunk_count);
    let mut written = 0u64;

    for (index, chunk) in chunks.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(
                committed_chunks = index,
                total_chunks = chunks.len(),
                "persistence cancelled between chunks"
            );
            break;
        }
        written += merge_chunk(pool, &rows[chunk.rows.clone()], &chunk.section_ids).await?;
        debug!(
            chunk = index + 1,
            total_chunks = chunks.len(),
            sections = chunk.section_ids.len(),
            rows = chunk.rows.len(),
            "merged chunk"
        );
    }
    Ok(written)
}

/// Upsert a chunk's rows and delete stale rows for its sections, in one
/// transaction.
async fn merge_chunk(pool: &PgPool, rows: &[SmartAverageRow], section_ids: &[i32]) -> Result<u64> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| EngineError::persistence("beginning chunk transaction", e))?;

    let row_section_ids: Vec<i32> = rows.iter().map(|r| r.section_id).collect();
    let row_question_ids: Vec<i32> = rows.iter().map(|r| r.question_id).collect();

    let mut written = 0u64;
    if !rows.is_empty() {
        let smart_averages: Vec<f32> = rows.iter().map(|r| r.smart_average as f32).collect();
        let course_informed: Vec<bool> = rows.iter().map(|r| r.is_course_informed).collect();
        let instructor_informed: Vec<bool> =
            rows.iter().map(|r| r.is_instructor_informed).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO evaluation_smart_averages (
                section_id, question_id, smart_average,
                is_course_informed, is_instructor_informed
            )
            SELECT * FROM UNNEST(
                $1::int4[], $2::int4[], $3::real[], $4::bool[], $5::bool[]
            )
            ON CONFLICT (section_id, question_id)
            DO UPDATE SET
                smart_average = EXCLUDED.smart_average,
                is_course_informed = EXCLUDED.is_course_informed,
                is_instructor_informed = EXCLUDED.is_instructor_informed
            "#,
        )
        .bind(&row_section_ids)
        .bind(&row_question_ids)
        .bind(&smart_averages)
        .bind(&course_informed)
        .bind(&instructor_informed)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::persistence("merging smart averages", e))?;
        written = result.rows_affected();
    }

    // Rows for this chunk's sections that this run did not produce are stale.
    sqlx::query(
        r#"
        DELETE FROM evaluation_smart_averages t
        WHERE t.section_id = ANY($1::int4[])
          AND NOT EXISTS (
              SELECT 1
              FROM UNNEST($2::int4[], $3::int4[]) AS k(section_id, question_id)
              WHERE k.section_id = t.section_id
                AND k.question_id = t.question_id
          )
        "#,
    )
    .bind(section_ids)
    .bind(&row_section_ids)
    .bind(&row_question_ids)
    .execute(&mut *tx)
    .await
    .map_err(|e| EngineError::persistence("deleting stale smart averages", e))?;

    tx.commit()
        .await
        .map_err(|e| EngineError::persistence("committing chunk transaction", e))?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(section_id: i32, question_id: i32) -> SmartAverageRow {
        SmartAverageRow {
            section_id,
            question_id,
            smart_average: 4.0,
            is_course_informed: true,
            is_instructor_informed: false,
        }
    }

    fn rows_for(sections: &[(i32, usize)]) -> Vec<SmartAverageRow> {
        let mut rows = Vec::new();
        for &(section_id, count) in sections {
            for question_id in 0..count as i32 {
                rows.push(row(section_id, question_id));
            }
        }
        rows
    }

    #[test]
    fn test_sections_are_never_split_across_chunks() {
        let rows = rows_for(&[(1, 5), (2, 5), (3, 5), (4, 5)]);
        let chunks = plan_chunks(&rows, &[1, 2, 3, 4], 3);

        assert!(chunks.len() <= 3);
        for chunk in &chunks {
            let chunk_rows = &rows[chunk.rows.clone()];
            for r in chunk_rows {
                assert!(chunk.section_ids.contains(&r.section_id));
            }
        }
        // Chunks partition both the rows and the sections.
        let total_rows: usize = chunks.iter().map(|c| c.rows.len()).sum();
        assert_eq!(total_rows, rows.len());
        let all_sections: Vec<i32> = chunks.iter().flat_map(|c| c.section_ids.clone()).collect();
        assert_eq!(all_sections, [1, 2, 3, 4]);
    }

    #[test]
    fn test_single_chunk_when_count_is_one() {
        let rows = rows_for(&[(1, 2), (2, 2)]);
        let chunks = plan_chunks(&rows, &[1, 2], 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].rows, 0..4);
    }

    #[test]
    fn test_rowless_sections_are_still_chunked_for_deletion() {
        let rows = rows_for(&[(2, 3)]);
        let chunks = plan_chunks(&rows, &[1, 2, 3], 4);
        let all_sections: Vec<i32> = chunks.iter().flat_map(|c| c.section_ids.clone()).collect();
        assert_eq!(all_sections, [1, 2, 3]);
        let total_rows: usize = chunks.iter().map(|c| c.rows.len()).sum();
        assert_eq!(total_rows, 3);
    }

    #[test]
    fn test_no_sections_no_chunks() {
        assert!(plan_chunks(&[], &[], 16).is_empty());
    }

    #[test]
    fn test_empty_rows_yield_one_delete_only_chunk() {
        let chunks = plan_chunks(&[], &[7, 8], 16);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_ids, [7, 8]);
        assert!(chunks[0].rows.is_empty());
    }

    #[test]
    fn test_one_oversized_section_does_not_starve_the_rest() {
        let rows = rows_for(&[(1, 100), (2, 1), (3, 1)]);
        let chunks = plan_chunks(&rows, &[1, 2, 3], 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_ids, [1]);
        assert_eq!(chunks[1].section_ids, [2, 3]);
    }
}
