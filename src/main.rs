use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use tweetpipe::feeds::{self, Query};
use tweetpipe::stream::{self, FileSink, FilterSpec, Listener};
use tweetpipe::table::{normalize, Table};
use tweetpipe::ui::chart;
use tweetpipe::{authenticate, ClientHandle, Config};

#[derive(Parser)]
#[command(name = "tweetpipe")]
#[command(about = "Collect, stream and chart tweets from the Twitter API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file (default: <config dir>/tweetpipe/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a user's timeline and tabulate it
    Timeline {
        /// Screen name (with or without @) or numeric user id
        #[arg(short, long)]
        user: String,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Fetch the authenticated account's home feed and tabulate it
    Home {
        #[command(flatten)]
        report: ReportArgs,
    },
    /// List the accounts a user follows
    Friends {
        #[arg(short, long)]
        user: String,
        #[arg(short = 'n', long, default_value_t = 200)]
        count: usize,
    },
    /// Append tweets matching keywords to a file until interrupted
    Stream {
        /// Comma-separated keywords, e.g. "joe biden,sam harris"
        #[arg(short, long, value_delimiter = ',', required = true)]
        track: Vec<String>,
        #[arg(short, long, default_value = "tweets.json")]
        output: PathBuf,
    },
    /// Tabulate a file written by `stream`
    Analyze {
        #[arg(short, long, default_value = "tweets.json")]
        input: PathBuf,
        #[arg(long)]
        chart: bool,
    },
}

#[derive(Args)]
struct ReportArgs {
    /// Number of tweets to fetch
    #[arg(short = 'n', long, default_value_t = 200)]
    count: usize,
    /// Write the table as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,
    /// Plot likes and retweets over time
    #[arg(long)]
    chart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tweetpipe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::Timeline { user, report } => {
            let handle = connect(&config, Some(user.clone())).await?;
            let records = handle
                .user_timeline(report.count)
                .await
                .with_context(|| format!("Failed to fetch timeline of {user}"))?;
            present(&normalize(&records), &report, &user)?;
        }
        Command::Home { report } => {
            let handle = connect(&config, None).await?;
            let records = feeds::fetch_records(&handle, &Query::HomeFeed, report.count)
                .await
                .context("Failed to fetch home feed")?;
            let title = format!("@{} home", handle.account().screen_name);
            present(&normalize(&records), &report, &title)?;
        }
        Command::Friends { user, count } => {
            let handle = connect(&config, Some(user.clone())).await?;
            let friends = handle
                .friend_list(count)
                .await
                .with_context(|| format!("Failed to fetch friends of {user}"))?;
            for friend in &friends {
                println!(
                    "@{:<20} {:<30} {:>10} followers",
                    friend.screen_name, friend.name, friend.followers_count
                );
            }
            println!("{} friends", friends.len());
        }
        Command::Stream { track, output } => {
            let filter = FilterSpec::new(&track)?;
            let handle = connect(&config, None).await?;

            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = stop_tx.send(true);
                }
            });

            let mut listener = Listener::new(FileSink::new(&output));
            let termination = stream::run(&handle, &filter, &mut listener, stop_rx).await?;
            let stats = listener.stats();
            eprintln!(
                "{} messages appended to {} ({} failed writes), ended: {:?}",
                stats.appended,
                output.display(),
                stats.write_failures,
                termination
            );
            termination.into_result()?;
        }
        Command::Analyze { input, chart: plot } => {
            let table = Table::from_sink_file(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            print_summary(&table);
            if plot {
                chart::show_engagement(&table, &input.display().to_string())?;
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config, target_user: Option<String>) -> Result<ClientHandle> {
    authenticate(&config.api, &config.credentials, target_user)
        .await
        .context("Failed to authenticate with Twitter")
}

fn present(table: &Table, report: &ReportArgs, title: &str) -> Result<()> {
    print_summary(table);
    if let Some(path) = &report.json {
        table
            .write_json(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if report.chart {
        chart::show_engagement(table, title)?;
    }
    Ok(())
}

fn print_summary(table: &Table) {
    for row in table.rows().iter().take(10) {
        let preview: String = row.text.chars().take(60).collect();
        println!(
            "{}  {:>6} likes {:>6} retweets  {:>3}  {}",
            row.date.format("%Y-%m-%d %H:%M"),
            row.n_likes,
            row.n_retweets,
            row.len,
            preview.replace('\n', " ")
        );
    }
    let summary = table.summary();
    println!(
        "{} tweets, mean length {:.1}, max likes {}, max retweets {}",
        summary.rows, summary.mean_len, summary.max_likes, summary.max_retweets
    );
}
