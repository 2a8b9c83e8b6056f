use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{controller::DEFAULT_INCIDENT_WINDOW_DAYS, jobs::GenomicJob};

#[derive(Parser)]
#[command(name = "genopipe", about = "Genomic sample manifest pipeline")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone)]
pub struct Config {
    #[arg(long, env = "GENOPIPE_DB_URL")]
    pub db_url: String,
    /// Root directory the bucket names resolve under.
    #[arg(long, env = "GENOPIPE_BUCKET_ROOT", default_value = "buckets")]
    pub bucket_root: PathBuf,
    #[arg(
        long,
        env = "GENOPIPE_INCIDENT_WINDOW_DAYS",
        default_value_t = DEFAULT_INCIDENT_WINDOW_DAYS
    )]
    pub incident_window_days: i64,
    /// When set, logs go to daily-rolled JSON files here instead of stderr.
    #[arg(long, env = "GENOPIPE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest one manifest file from a bucket.
    Ingest {
        #[arg(long)]
        job: GenomicJob,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        file_path: String,
        /// Skip opening an AW1 feedback record (reingestion runs).
        #[arg(long)]
        skip_feedback: bool,
    },
    /// Pull newly eligible participants into the workflow and emit AW0.
    NewParticipants {
        #[arg(long)]
        bucket: String,
    },
    /// Generate an outbound manifest (gem-a1-manifest, aw3-array-manifest,
    /// aw3-wgs-manifest).
    Generate {
        #[arg(long)]
        job: GenomicJob,
        #[arg(long)]
        bucket: String,
    },
    /// Run a reconciliation sweep (reconcile-gc-data-files,
    /// reconcile-report-states).
    Reconcile {
        #[arg(long)]
        job: GenomicJob,
    },
    /// Execute one queued task from its JSON wire payload.
    DispatchTask {
        #[arg(long)]
        payload: String,
    },
}
