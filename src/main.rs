//! Dota 2 match prediction CLI
//!
//! Builds a historical dataset from league matches, trains the outcome
//! classifier, predicts live league games, and retrains as results come in.

use clap::{Parser, Subcommand};
use dotaml::data::CancelToken;
use dotaml::{Config, Result};

#[derive(Parser)]
#[command(name = "dotaml")]
#[command(about = "Dota 2 pro match outcome prediction", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// List leagues known upstream
    Leagues {
        /// Only leagues of these tiers (e.g. premium, professional)
        #[arg(long)]
        tier: Vec<String>,
    },
    /// Build a labelled dataset from a league's finished matches
    Ingest {
        /// League id
        #[arg(long)]
        league: i64,
        /// Output JSON-lines file
        #[arg(long)]
        output: String,
    },
    /// Fit the scaler and the initial classifier from a dataset
    Train {
        /// JSON-lines dataset written by `ingest`
        #[arg(long)]
        dataset: String,
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Predict live league games and record the predictions
    PredictLive {
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
        /// Also fetch hero matchups and report each side's counter-pick edge
        #[arg(long)]
        counter_picks: bool,
    },
    /// Fetch results for recorded predictions, then retrain if a batch is ready
    Resolve,
    /// Retrain on verified outcomes if a full batch is available
    Retrain,
    /// Show history and model status
    Status,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    }
    .with_env_overrides();

    // Ctrl-C stops blocking fetches and ingestion at the next match boundary
    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_on_interrupt() {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Leagues { tier } => commands::leagues(&config, &cancel, &tier),
        Commands::Ingest { league, output } => {
            commands::ingest(&config, &cancel, league, &output)
        }
        Commands::Train { dataset, epochs } => commands::train(&config, &dataset, epochs),
        Commands::PredictLive {
            format,
            counter_picks,
        } => commands::predict_live(&config, &cancel, format, counter_picks),
        Commands::Resolve => commands::resolve(&config, &cancel),
        Commands::Retrain => commands::retrain(&config),
        Commands::Status => commands::status(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use std::sync::Arc;

    use dotaml::data::dataset::{write_rows, MatchDataset};
    use dotaml::data::ingest::{ingest_league, list_leagues};
    use dotaml::data::{Database, EntityBuilder, Fetcher, OpenDotaClient};
    use dotaml::features::schema::column_names;
    use dotaml::features::FeatureTransformer;
    use dotaml::model::{
        ArtifactKind, ArtifactRegistry, ClassifierArtifact, FileArtifactStore, LogisticClassifier,
    };
    use dotaml::predict::{format_prediction, LiveService, Predictor};
    use dotaml::training::{resolve_pending, train_initial, IncrementalTrainer, TickOutcome};

    fn builder(config: &Config, cancel: &CancelToken) -> Result<EntityBuilder> {
        let client = OpenDotaClient::new(&config.fetch)?;
        let fetcher =
            Fetcher::from_config(Arc::new(client), &config.fetch).with_cancel(cancel.clone());
        Ok(EntityBuilder::from_config(fetcher, &config.fetch))
    }

    fn transformer(config: &Config) -> Result<FeatureTransformer> {
        let store = FileArtifactStore::open(&config.data.artifacts_dir)?;
        Ok(FeatureTransformer::new(ArtifactRegistry::new(Arc::new(store))))
    }

    fn trainer(transformer: &FeatureTransformer, config: &Config) -> IncrementalTrainer<LogisticClassifier> {
        IncrementalTrainer::from_config(transformer.registry().clone(), &config.training)
    }

    fn format_rate(rate: Option<f64>) -> String {
        rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0))
    }

    fn print_tick(outcome: &TickOutcome, batch_size: usize) {
        match outcome {
            TickOutcome::Waiting { available } => {
                println!("Waiting for outcomes: {}/{} verified", available, batch_size);
            }
            TickOutcome::Retrained {
                rows,
                cursor,
                version,
            } => {
                println!(
                    "Retrained on {} outcomes → classifier v{} (cursor {})",
                    rows, version, cursor
                );
            }
        }
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.artifacts_dir)?;
        println!("Created data/ and {}/ directories", config.data.artifacts_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} (or set OPENDOTA_KEY / STEAM_API_KEY)", config_path);
        println!("  2. Run 'dotaml ingest --league <id> --output data/league.jsonl'");
        println!("  3. Run 'dotaml train --dataset data/league.jsonl'");
        println!("  4. Run 'dotaml predict-live', later 'dotaml resolve'");

        Ok(())
    }

    pub fn leagues(config: &Config, cancel: &CancelToken, tiers: &[String]) -> Result<()> {
        let builder = builder(config, cancel)?;
        let leagues = list_leagues(&builder, tiers)?;

        println!("{:>8}  {:<14}  Name", "ID", "Tier");
        println!("───────────────────────────────────────────────");
        for league in &leagues {
            println!(
                "{:>8}  {:<14}  {}",
                league.leagueid,
                league.tier.as_deref().unwrap_or("-"),
                league.name.as_deref().unwrap_or("Unknown Tournament")
            );
        }
        println!("\n{} leagues", leagues.len());
        Ok(())
    }

    pub fn ingest(config: &Config, cancel: &CancelToken, league: i64, output: &str) -> Result<()> {
        let builder = builder(config, cancel)?;
        let report = ingest_league(&builder, league)?;

        write_rows(output, &report.rows)?;
        println!(
            "Wrote {} rows to {} ({} matches skipped)",
            report.rows.len(),
            output,
            report.skipped
        );
        if report.cancelled {
            println!("Ingestion was cancelled; rows written so far are complete");
        }
        Ok(())
    }

    pub fn train(config: &Config, dataset: &str, epochs: Option<usize>) -> Result<()> {
        let dataset = MatchDataset::load(dataset)?;
        println!("Loaded {} matches", dataset.len());

        let mut training = config.training.clone();
        if let Some(epochs) = epochs {
            training.initial_epochs = epochs;
        }

        let transformer = transformer(config)?;
        let classifier = LogisticClassifier::new(column_names(), training.learning_rate);
        let report = train_initial(&transformer, dataset, classifier, &training)?;

        println!("\nTraining complete");
        println!("───────────────────────────────");
        println!("  Classifier: v{}", report.version);
        println!("  Scaler:     v{}", report.scaler_version);
        println!("  Train ({}): {}", report.train_rows, report.train_metrics);
        if report.test_rows > 0 {
            println!("  Test ({}):  {}", report.test_rows, report.test_metrics);
        }
        Ok(())
    }

    pub fn predict_live(
        config: &Config,
        cancel: &CancelToken,
        format: OutputFormat,
        counter_picks: bool,
    ) -> Result<()> {
        let builder = builder(config, cancel)?;
        let transformer = transformer(config)?;
        let predictor = Predictor::<LogisticClassifier>::load(&transformer)?;
        let db = Database::open(&config.data.database_path)?;

        let report = LiveService::new(&builder, &predictor, &db)
            .with_counter_picks(counter_picks)
            .run()?;

        match format {
            OutputFormat::Table => {
                if report.predictions.is_empty() {
                    println!("No live league matches to predict");
                }
                for live in &report.predictions {
                    println!("{} (match {})", live.league_name, live.match_id);
                    print!(
                        "{}",
                        format_prediction(&live.prediction, &live.radiant_name, &live.dire_name)
                    );
                    println!("  Min samples per player: {}", live.min_samples);
                    if let Some(edge) = &live.counter_pick_edge {
                        println!(
                            "  Counter-pick win rate: Radiant {}, Dire {}",
                            format_rate(edge.radiant),
                            format_rate(edge.dire)
                        );
                    }
                }
                if !report.skipped.is_empty() {
                    println!("Skipped (incomplete draft): {:?}", report.skipped);
                }
                if !report.failed.is_empty() {
                    println!("Failed (see log): {:?}", report.failed);
                }
                if report.cancelled {
                    println!("Interrupted; remaining matches were not predicted");
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report.predictions)?);
            }
        }
        Ok(())
    }

    pub fn resolve(config: &Config, cancel: &CancelToken) -> Result<()> {
        let builder = builder(config, cancel)?;
        let transformer = transformer(config)?;
        let db = Database::open(&config.data.database_path)?;
        let mut trainer = trainer(&transformer, config);

        let report = resolve_pending(&builder, &db, &mut trainer)?;
        println!(
            "Resolved {} matches, {} still pending",
            report.resolved.len(),
            report.pending.len()
        );
        if let Some(outcome) = &report.tick {
            print_tick(outcome, trainer.batch_size());
        }
        if report.retrain_failed {
            println!("Retrain failed (see log); outcomes were saved and will be retried");
        }
        Ok(())
    }

    pub fn retrain(config: &Config) -> Result<()> {
        let transformer = transformer(config)?;
        let db = Database::open(&config.data.database_path)?;
        let mut trainer = trainer(&transformer, config);

        let outcome = trainer.tick(&db)?;
        print_tick(&outcome, trainer.batch_size());
        Ok(())
    }

    pub fn status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.stats()?;

        println!("History");
        println!("───────────────────────────────");
        println!("  Path:      {}", config.data.database_path);
        println!("  Predicted: {}", stats.total);
        println!("  Resolved:  {}", stats.resolved);
        println!("  Pending:   {}", stats.pending());
        if let Some(accuracy) = stats.accuracy() {
            println!("  Accuracy:  {:.1}%", accuracy * 100.0);
        }

        let transformer = transformer(config)?;
        let (scaler, classifier) = transformer.registry().read(|store| {
            Ok((
                store.latest_version(ArtifactKind::Scaler)?,
                ClassifierArtifact::<LogisticClassifier>::load_latest(store)?,
            ))
        })?;

        println!("\nModel");
        println!("───────────────────────────────");
        println!("  Artifacts: {}", config.data.artifacts_dir);
        match scaler {
            Some(v) => println!("  Scaler:    v{}", v),
            None => println!("  Scaler:    none"),
        }
        match classifier {
            Some((version, artifact)) => {
                println!("  Classifier: v{} (scaler v{})", version, artifact.scaler_version);
                println!("  Trained on: {} rows", artifact.trained_rows);
                println!("  Cursor:     {}", artifact.cursor);
                let unconsumed = stats
                    .last_id
                    .map_or(0, |last| (last - artifact.cursor).max(0));
                println!("  Rows after cursor: {}", unconsumed);
            }
            None => println!("  Classifier: none - run 'dotaml train'"),
        }
        Ok(())
    }
}
