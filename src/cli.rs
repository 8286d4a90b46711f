use clap::Parser;

/// Smart-average batch driver
///
/// Computes per-section, per-question smart averages for a target academic
/// year by blending historical evaluation evidence, then upserts the results
/// into the evaluations table.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target academic year, e.g. 2024-2025
    #[arg(long)]
    pub year: String,

    /// Quarters to score, comma-separated
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "Autumn,Winter,Spring,Summer"
    )]
    pub quarters: Vec<String>,

    /// Lookback window in years (target year inclusive)
    #[arg(long, default_value_t = 4)]
    pub max_years: i32,

    /// Number of persistence chunks per time group (minimum 1)
    #[arg(long, default_value_t = 16)]
    pub chunks: usize,

    /// Compute and log everything but skip all writes
    #[arg(long)]
    pub dry_run: bool,

    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

#[cfg(debug_assertions)]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Pretty;
#[cfg(not(debug_assertions))]
const DEFAULT_TRACING_FORMAT: TracingFormat = TracingFormat::Json;

fn default_tracing_format() -> TracingFormat {
    DEFAULT_TRACING_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quarters_cover_all_four() {
        let args = Args::parse_from(["smartavg", "--year", "2024-2025"]);
        assert_eq!(args.quarters, ["Autumn", "Winter", "Spring", "Summer"]);
        assert_eq!(args.max_years, 4);
        assert_eq!(args.chunks, 16);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_quarters_split_on_commas() {
        let args = Args::parse_from([
            "smartavg",
            "--year",
            "2024-2025",
            "--quarters",
            "Autumn,Spring",
        ]);
        assert_eq!(args.quarters, ["Autumn", "Spring"]);
    }
}
