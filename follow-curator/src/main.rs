use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use follow_curator::{
    ApiConfig, CurationConfig, Curator, HarvestConfig, Harvester, LexiconSentiment, TwitterClient,
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_AGE_DAYS,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "follow-curator", about = "Prune stale follows and harvest scored posts")]
struct Cli {
    /// Seconds to wait after a rate-limit response before retrying
    #[arg(long, env = "FOLLOW_CURATOR_COOLDOWN_SECS", default_value_t = 900, global = true)]
    cooldown_secs: u64,

    /// Posts requested per account before the first widening
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, global = true)]
    batch_size: usize,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Unfollow accounts without an original post in the last N days
    Curate {
        #[arg(long, default_value_t = DEFAULT_MAX_AGE_DAYS)]
        max_age_days: i64,

        /// Decide and log, but do not unfollow
        #[arg(long)]
        dry_run: bool,
    },
    /// Collect N days of posts across all follows and score them
    Harvest {
        #[arg(long, default_value_t = 7)]
        days: i64,

        #[arg(long, default_value_t = 100)]
        max_posts: usize,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
    /// Log the newest original post of every followed account
    Report {
        #[arg(long, default_value_t = DEFAULT_MAX_AGE_DAYS)]
        max_age_days: i64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let api_config = ApiConfig::from_env().context("Failed to load API configuration")?;
    info!("Using API at {}", api_config.base_url);
    let client = Arc::new(TwitterClient::new(api_config)?);
    let cooldown = Duration::from_secs(cli.cooldown_secs);

    let result = match cli.command {
        Command::Curate { max_age_days, dry_run } => {
            let config = CurationConfig {
                max_age_days,
                batch_size: cli.batch_size,
                rate_limit_cooldown: cooldown,
                dry_run,
            };
            Curator::new(client, config).run(Utc::now()).await.map(|report| {
                info!(
                    "Reviewed {} accounts: {} kept, {} unfollowed",
                    report.decisions.len(),
                    report.kept(),
                    report.unfollowed.len()
                );
            })
        }
        Command::Harvest {
            days,
            max_posts,
            output,
            format,
        } => {
            let config = HarvestConfig {
                days,
                max_posts_per_account: max_posts,
                batch_size: cli.batch_size,
                rate_limit_cooldown: cooldown,
            };
            let harvester = Harvester::new(client, Arc::new(LexiconSentiment::new()), config);
            let dataset = harvester.harvest(Utc::now()).await;
            match dataset {
                Ok(dataset) => {
                    let writer: Box<dyn Write> = match &output {
                        Some(path) => Box::new(BufWriter::new(
                            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
                        )),
                        None => Box::new(io::stdout().lock()),
                    };
                    let written = match format {
                        OutputFormat::Csv => dataset.write_csv(writer),
                        OutputFormat::Json => dataset.write_json(writer),
                    };
                    written.map(|_| info!("Wrote {} rows", dataset.len()))
                }
                Err(e) => Err(e),
            }
        }
        Command::Report { max_age_days } => {
            let config = CurationConfig {
                max_age_days,
                batch_size: cli.batch_size,
                rate_limit_cooldown: cooldown,
                dry_run: true,
            };
            Curator::new(client, config).newest_posts(Utc::now()).await.map(|newest| {
                for (account, post) in newest {
                    match post {
                        Some(post) => info!("Posted by {} at {}: \n {}", account.screen_name, post.created_at, post.text),
                        None => info!("No original posts by {} within {} days", account.screen_name, max_age_days),
                    }
                }
            })
        }
    };

    if let Err(e) = &result {
        if e.is_authentication() {
            error!("Authentication failed, check TWITTER_BEARER_TOKEN: {}", e);
        } else {
            error!("Run failed: {}", e);
        }
    }
    result.map_err(Into::into)
}
