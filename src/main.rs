use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use damagelens::{
    collaborators::LogNotifier,
    config::ConfigStore,
    models::{DamageType, LabelInput, Severity, TrainingConfig, TrainingJobType},
    scheduler::JobKind,
    training::TriggerOutcome,
    utils::logging,
    Collaborators, DamageLens,
};

#[derive(Parser)]
#[command(name = "damagelens")]
#[command(about = "Compare before/after vehicle photos for new damage and manage the review loop")]
#[command(version)]
struct Cli {
    /// JSON configuration file. Missing file means defaults.
    #[arg(long, env = "DAMAGELENS_CONFIG", default_value = "damagelens.json", global = true)]
    config: PathBuf,

    /// Overrides the configured SQLite database path.
    #[arg(long, env = "DAMAGELENS_DB", global = true)]
    db: Option<PathBuf>,

    /// Force debug logging.
    #[arg(long, env = "DAMAGELENS_DEBUG", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one before/after pair through the pipeline and print the record.
    Detect {
        #[arg(long)]
        before: PathBuf,
        #[arg(long)]
        after: PathBuf,
    },

    /// Submit a reviewer label for a flagged detection.
    Label(LabelArgs),

    /// Start a training job (single-flight).
    Train {
        #[arg(long, value_enum, default_value_t = JobTypeArg::Manual)]
        job_type: JobTypeArg,
        /// Block until the job finishes and print it.
        #[arg(long)]
        wait: bool,
    },

    /// List unresolved review items, most uncertain first.
    Reviews {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List recent evaluations of the active model version.
    Metrics {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Run one scheduled job immediately.
    RunJob {
        #[arg(value_enum)]
        job: JobArg,
    },

    /// Run the scheduler until interrupted.
    Serve,
}

#[derive(Debug, Clone, Args)]
struct LabelArgs {
    /// Detection id the label belongs to.
    #[arg(long)]
    detection: String,

    /// Whether the reviewer saw new damage.
    #[arg(long, action = clap::ArgAction::Set)]
    is_damage: bool,

    #[arg(long, value_enum)]
    damage_type: Option<DamageTypeArg>,

    #[arg(long, value_enum)]
    severity: Option<SeverityArg>,

    /// Reviewer confidence in [0, 1].
    #[arg(long)]
    confidence: Option<f64>,

    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobTypeArg {
    Manual,
    Nightly,
    Emergency,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobArg {
    Nightly,
    Triage,
    Audit,
    Retention,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DamageTypeArg {
    Scratch,
    Dent,
    PaintDamage,
    Unknown,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeverityArg {
    None,
    Low,
    Medium,
    High,
}

impl From<DamageTypeArg> for DamageType {
    fn from(arg: DamageTypeArg) -> Self {
        match arg {
            DamageTypeArg::Scratch => DamageType::Scratch,
            DamageTypeArg::Dent => DamageType::Dent,
            DamageTypeArg::PaintDamage => DamageType::PaintDamage,
            DamageTypeArg::Unknown => DamageType::Unknown,
        }
    }
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::None => Severity::None,
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::High => Severity::High,
        }
    }
}

impl From<JobArg> for JobKind {
    fn from(arg: JobArg) -> Self {
        match arg {
            JobArg::Nightly => JobKind::NightlyTraining,
            JobArg::Triage => JobKind::ReviewTriage,
            JobArg::Audit => JobKind::PerformanceAudit,
            JobArg::Retention => JobKind::Retention,
        }
    }
}

impl JobTypeArg {
    fn job(self) -> (TrainingJobType, TrainingConfig) {
        match self {
            JobTypeArg::Manual => (TrainingJobType::ManualFineTune, TrainingConfig::manual()),
            JobTypeArg::Nightly => (TrainingJobType::NightlyTraining, TrainingConfig::nightly()),
            JobTypeArg::Emergency => (
                TrainingJobType::EmergencyRetraining,
                TrainingConfig::emergency(),
            ),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let store = ConfigStore::new(cli.config.clone())?;
    let mut config = store.current();
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let lens = DamageLens::open(
        config,
        Collaborators {
            notifier: Some(Arc::new(LogNotifier)),
            ..Collaborators::default()
        },
    )
    .await?;

    match cli.command {
        Commands::Detect { before, after } => {
            let before = std::fs::read(&before)
                .with_context(|| format!("failed to read {}", before.display()))?;
            let after = std::fs::read(&after)
                .with_context(|| format!("failed to read {}", after.display()))?;
            let record = lens.detect(&before, &after).await?;
            print_json(&record)?;
        }
        Commands::Label(args) => {
            let input = LabelInput {
                is_damage: args.is_damage,
                damage_type: args.damage_type.map(Into::into),
                severity: args.severity.map(Into::into),
                confidence: args.confidence,
                notes: args.notes,
                ..LabelInput::default()
            };
            let label = lens.submit_label(&args.detection, input).await?;
            print_json(&label)?;
        }
        Commands::Train { job_type, wait } => {
            let (job_type, config) = job_type.job();
            match lens.trigger_training(job_type, config).await? {
                TriggerOutcome::Rejected { existing_job_id } => {
                    bail!("training job {existing_job_id} is already active")
                }
                TriggerOutcome::Accepted { job_id } if wait => {
                    let job = lens.training().wait_for(&job_id).await?;
                    print_json(&job)?;
                }
                TriggerOutcome::Accepted { job_id } => println!("{job_id}"),
            }
        }
        Commands::Reviews { limit } => {
            print_json(&lens.pending_reviews(limit).await?)?;
        }
        Commands::Metrics { limit } => {
            print_json(&lens.model_metrics(limit).await?)?;
        }
        Commands::RunJob { job } => {
            let kind = JobKind::from(job);
            match lens.run_job_now(kind).await {
                Some(report) => println!("{report:?}"),
                None => bail!("{} did not complete, see log", kind.name()),
            }
        }
        Commands::Serve => {
            if !lens.config().scheduler.enabled {
                bail!("scheduler is disabled in {}", store.path().display());
            }
            lens.start_scheduler().await?;
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            log::info!("shutting down");
            lens.stop_scheduler().await?;
        }
    }

    Ok(())
}
