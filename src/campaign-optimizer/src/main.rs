//! Campaign Optimizer: trains and serves a tabular Q-learning policy for
//! email-campaign targeting.

use campaign_api::ApiServer;
use campaign_core::config::{AppConfig, RewardPolicyKind};
use campaign_core::TrainingTable;
use campaign_reporting::evaluation::write_fold_report;
use campaign_reporting::{AudienceReportBuilder, PolicyEvaluator};
use campaign_rl_engine::{
    artifact, OutcomeTable, PolicyEngine, PolicySnapshot, QLearningTrainer, StateSpace,
};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-optimizer")]
#[command(about = "Tabular Q-learning policy engine for email campaign targeting")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "CAMPAIGN_OPTIMIZER_CONFIG")]
    config: Option<PathBuf>,

    /// Aggregated training table (overrides config)
    #[arg(long, global = true)]
    data: Option<String>,

    /// Policy artifact path (overrides config)
    #[arg(long, global = true)]
    artifact: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a policy on the aggregated table and write the artifact
    Train {
        /// Number of episodes (overrides config)
        #[arg(long)]
        iterations: Option<usize>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Reward policy (overrides config)
        #[arg(long, value_enum)]
        reward: Option<RewardArg>,
    },
    /// Serve the policy over HTTP
    Serve {
        /// Node identifier (overrides config)
        #[arg(long, env = "CAMPAIGN_OPTIMIZER__NODE_ID")]
        node_id: Option<String>,

        /// HTTP port (overrides config)
        #[arg(long, env = "CAMPAIGN_OPTIMIZER__API__HTTP_PORT")]
        http_port: Option<u16>,

        /// Reload the artifact from disk every N seconds
        #[arg(long)]
        reload_interval_secs: Option<u64>,
    },
    /// Evaluate the policy against a holdout table
    Evaluate {
        /// Holdout table in the training-table format
        #[arg(long)]
        holdout: PathBuf,

        /// Rows to sample from the holdout table
        #[arg(long, default_value_t = 100)]
        samples: usize,

        /// Name of this run in the text report
        #[arg(long, default_value = "holdout")]
        fold: String,

        /// Write a plain-text fold report here
        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the audience report for an email subject
    Audience {
        #[arg(long)]
        subject_id: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RewardArg {
    Tiered,
    Proportional,
}

impl From<RewardArg> for RewardPolicyKind {
    fn from(arg: RewardArg) -> Self {
        match arg {
            RewardArg::Tiered => RewardPolicyKind::Tiered,
            RewardArg::Proportional => RewardPolicyKind::Proportional,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_optimizer=info,campaign_rl_engine=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Train {
            iterations,
            seed,
            reward,
        } => {
            let mut config = config;
            if let Some(iterations) = iterations {
                config.training.iterations = iterations;
            }
            if seed.is_some() {
                config.training.seed = seed;
            }
            if let Some(reward) = reward {
                config.reward.kind = reward.into();
            }
            config.validate()?;
            tokio::task::spawn_blocking(move || train(&config)).await??;
        }
        Command::Serve {
            node_id,
            http_port,
            reload_interval_secs,
        } => {
            let mut config = config;
            if let Some(node_id) = node_id {
                config.node_id = node_id;
            }
            if let Some(port) = http_port {
                config.api.http_port = port;
            }
            serve(config, reload_interval_secs).await?;
        }
        Command::Evaluate {
            holdout,
            samples,
            fold,
            report,
            seed,
        } => {
            tokio::task::spawn_blocking(move || {
                evaluate(&config, &holdout, samples, fold, report.as_deref(), seed)
            })
            .await??;
        }
        Command::Audience { subject_id } => {
            tokio::task::spawn_blocking(move || audience(&config, subject_id)).await??;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(Some(path.as_path()))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(data) = &cli.data {
        config.data.training_table = data.clone();
    }
    if let Some(artifact) = &cli.artifact {
        config.data.policy_artifact = artifact.clone();
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        training_table = %config.data.training_table,
        policy_artifact = %config.data.policy_artifact,
        reward = ?config.reward.kind,
        layout = ?config.reward.action_layout,
        "Configuration loaded"
    );
    Ok(config)
}

fn train(config: &AppConfig) -> anyhow::Result<()> {
    let table = TrainingTable::load(&config.data.training_table)?;
    let cardinalities = table.cardinalities()?;
    let space = StateSpace::new(cardinalities);
    info!(
        cardinalities = ?cardinalities.as_array(),
        total_states = space.total_states(),
        "Discovered state space"
    );

    let outcomes = OutcomeTable::build(&table, &space, config.data.sent_counting)?;
    let trainer = QLearningTrainer::new(config.training.clone(), config.reward.clone());
    let trained = trainer.train(&space, &outcomes)?;

    artifact::save(
        Path::new(&config.data.policy_artifact),
        &trained.q_table,
        &trained.metadata,
    )?;
    println!("{}", serde_json::to_string_pretty(&trained.report)?);
    Ok(())
}

async fn serve(config: AppConfig, reload_interval_secs: Option<u64>) -> anyhow::Result<()> {
    info!("Campaign Optimizer starting up");

    let engine = {
        let config = config.clone();
        Arc::new(tokio::task::spawn_blocking(move || PolicyEngine::load(&config)).await??)
    };

    if let Some(secs) = reload_interval_secs.filter(|s| *s > 0) {
        let engine = engine.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                let (engine, config) = (engine.clone(), config.clone());
                match tokio::task::spawn_blocking(move || engine.reload(&config)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Policy reload failed, keeping current policy"),
                    Err(e) => error!(error = %e, "Policy reload task panicked"),
                }
            }
        });
        info!(interval_secs = secs, "Periodic policy reload enabled");
    }

    let api_server = ApiServer::new(config.clone(), engine);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics().await {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("Campaign Optimizer is ready to serve traffic");

    // Blocks until shutdown
    api_server.start_http().await?;

    Ok(())
}

fn evaluate(
    config: &AppConfig,
    holdout: &Path,
    samples: usize,
    fold: String,
    report: Option<&Path>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let snapshot = PolicySnapshot::load(config)?;
    let holdout = TrainingTable::load(holdout)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let run = PolicyEvaluator::new(&snapshot).evaluate(&holdout, samples, &mut rng)?;
    if let Some(path) = report {
        write_fold_report(path, &[(fold, run.summary)])?;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": run.summary,
            "skipped": run.skipped,
        }))?
    );
    Ok(())
}

fn audience(config: &AppConfig, subject_id: u32) -> anyhow::Result<()> {
    let snapshot = PolicySnapshot::load(config)?;
    let report = AudienceReportBuilder::new(config.labels.clone()).for_subject(&snapshot, subject_id)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
