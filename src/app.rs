//! Application wiring: configuration, database pool, and the batch run loop.

use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Args;
use crate::config::Config;
use crate::data::{ingest, persist};
use crate::engine::params::ParamRegistry;
use crate::engine::types::{Quarter, TimeGroup, parse_year_start};
use crate::engine::{Frames, normalize, score_time_group};
use crate::error::{EngineError, Result};

/// Totals across every time group of a run.
#[derive(Debug, Default)]
pub struct RunTotals {
    pub sections: usize,
    pub rows_written: u64,
}

/// Main application struct containing all necessary components
pub struct App {
    db_pool: sqlx::PgPool,
    cancel: CancellationToken,
}

impl App {
    /// Create a new App instance with the database pool established and
    /// migrations applied.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(4))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 4,
            acquire_timeout = "4s",
            "database pool established"
        );

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;

        // Cooperative cancellation: Ctrl-C stops the run between time groups
        // and between persistence chunks.
        let cancel = CancellationToken::new();
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing current chunk then stopping");
                signal_token.cancel();
            }
        });

        Ok(App { db_pool, cancel })
    }

    /// Run the batch: ingest once, then score and persist each time group.
    pub async fn run(&self, args: &Args) -> Result<RunTotals> {
        let start_year = parse_year_start(&args.year).ok_or_else(|| {
            EngineError::Config(format!(
                "--year must look like 2024-2025, got {:?}",
                args.year
            ))
        })?;

        let mut quarters = args
            .quarters
            .iter()
            .map(|q| {
                Quarter::parse(q)
                    .ok_or_else(|| EngineError::Config(format!("unrecognized quarter {q:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        quarters.sort_by_key(|q| q.ord());
        quarters.dedup();

        let max_years = args.max_years;
        if max_years < 0 {
            return Err(EngineError::Config(format!(
                "--max-years must be non-negative, got {max_years}"
            )));
        }
        let chunk_count = args.chunks.max(1);

        let ingest_start = Instant::now();
        let frames = self.load_frames(&args.year, start_year, max_years).await?;
        info!(
            sections = frames.sections.len(),
            reports = frames.reports.len(),
            report_questions = frames.report_questions.len(),
            questions = frames.scales.len(),
            elapsed_s = ingest_start.elapsed().as_secs_f64(),
            "ingested input frames"
        );

        let registry = ParamRegistry::standard();
        let mut totals = RunTotals::default();

        for quarter in quarters {
            if self.cancel.is_cancelled() {
                warn!("run cancelled; remaining time groups skipped");
                break;
            }

            let target = TimeGroup {
                start_year,
                quarter,
            };
            let group_start = Instant::now();

            let output = score_time_group(&frames, target, &registry, max_years)?;

            let rows_written = if args.dry_run {
                info!(
                    time_group = %target,
                    sections = output.scored_section_ids.len(),
                    rows = output.rows.len(),
                    "dry run; skipping persistence"
                );
                0
            } else {
                persist::persist_time_group(
                    &self.db_pool,
                    &output.rows,
                    &output.scored_section_ids,
                    chunk_count,
                    &self.cancel,
                )
                .await?
            };

            info!(
                time_group = %target,
                sections = output.scored_section_ids.len(),
                rows_written,
                elapsed_s = group_start.elapsed().as_secs_f64(),
                "scored time group"
            );
            totals.sections += output.scored_section_ids.len();
            totals.rows_written += rows_written;
        }

        Ok(totals)
    }

    /// Ingest and normalize the input frames for the run.
    async fn load_frames(
        &self,
        year: &str,
        start_year: i32,
        max_years: i32,
    ) -> Result<Frames> {
        let min_year = start_year - max_years;

        let scales = ingest::load_question_scales(&self.db_pool).await?;
        let reports = ingest::load_reports(&self.db_pool, min_year, start_year).await?;
        let raw = ingest::load_report_questions(&self.db_pool, min_year, start_year).await?;
        let sections = ingest::load_target_sections(&self.db_pool, year).await?;

        let scales_by_question = scales
            .iter()
            .map(|s| (s.question_id, s.clone()))
            .collect();
        let report_questions = normalize::normalize_report_questions(&raw, &scales_by_question)?;

        Ok(Frames {
            sections,
            reports,
            report_questions,
            scales,
        })
    }
}
