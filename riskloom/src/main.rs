// src/main.rs
//
// riskloom — EVM wallet risk-intelligence scoring.
//
// Four operational modes, all fixture/explorer-driven since this crate has
// no live ingestion surface of its own:
//   single   — score one address against a live block-explorer adapter
//   batch    — score many addresses concurrently through the worker pool
//   pipeline — run the unsupervised graph pipeline over a batch edge list
//   eval     — run the two-stage supervised trainer over a labelled dataset
//
// Usage:
//   riskloom single --address 0x...
//   riskloom batch --addresses-file addresses.txt
//   riskloom pipeline --edges-file edges.json
//   riskloom eval --data wallets.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use riskloom::community::CommunityStore;
use riskloom::concurrency::BatchRunner;
use riskloom::domain::{RiskLabel, Transaction};
use riskloom::eval::{self, LabeledWallet};
use riskloom::features;
use riskloom::fetcher::Fetcher;
use riskloom::graph_pipeline;
use riskloom::label_registry::LabelRegistry;
use riskloom::metrics::RiskLoomMetrics;
use riskloom::state::cache::Cache;
use riskloom::{Address, Config, Orchestrator, RiskReport};

#[derive(Parser)]
#[command(
    name = "riskloom",
    about = "EVM wallet risk-intelligence scoring",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// EVM chain id to analyse against. See `config::chain_descriptor` for
    /// the recognised table; unrecognised ids fall back to `Unknown`.
    #[arg(long, global = true, default_value = "1")]
    chain_id: u64,

    /// Block-explorer API base URL (Etherscan-family `module=account`).
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Directory for the on-disk response cache.
    #[arg(long, global = true, default_value = ".cache")]
    cache_dir: PathBuf,

    /// Optional append-only community-report journal to load alongside
    /// the static label registry.
    #[arg(long, global = true)]
    community_journal: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Score a single wallet address.
    Single {
        #[arg(long)]
        address: String,
        /// Emit the full report as JSON instead of the human summary.
        #[arg(long)]
        json: bool,
    },
    /// Score every address in a file, one per line, through the batch
    /// worker pool.
    Batch {
        #[arg(long)]
        addresses_file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Run the unsupervised graph pipeline over a batch edge list.
    Pipeline {
        /// JSON array of `{from, to, value_eth, timestamp}` edges.
        #[arg(long)]
        edges_file: PathBuf,
    },
    /// Run the two-stage supervised trainer over a labelled dataset.
    Eval {
        /// JSON array of `{address, label, transactions}` rows.
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Submit, vote on, or list community risk reports against the
    /// journal given by `--community-journal`.
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    Submit {
        #[arg(long)]
        address: String,
        #[arg(long)]
        reporter_id: String,
        #[arg(long, value_enum)]
        category: ReportCategoryArg,
        #[arg(long)]
        description: String,
        #[arg(long, value_delimiter = ',', default_value = "")]
        evidence_urls: Vec<String>,
    },
    Vote {
        #[arg(long)]
        id: String,
        #[arg(long)]
        voter_id: String,
        #[arg(long)]
        up: bool,
    },
    Dispute {
        #[arg(long)]
        id: String,
    },
    List {
        #[arg(long)]
        address: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum ReportCategoryArg {
    Scam,
    Phishing,
    RugPull,
    Honeypot,
    Impersonation,
    WashTrading,
    Drainer,
    FakeToken,
    Ponzi,
    Other,
}

impl From<ReportCategoryArg> for riskloom::community::ReportCategory {
    fn from(v: ReportCategoryArg) -> Self {
        use riskloom::community::ReportCategory::*;
        match v {
            ReportCategoryArg::Scam => Scam,
            ReportCategoryArg::Phishing => Phishing,
            ReportCategoryArg::RugPull => RugPull,
            ReportCategoryArg::Honeypot => Honeypot,
            ReportCategoryArg::Impersonation => Impersonation,
            ReportCategoryArg::WashTrading => WashTrading,
            ReportCategoryArg::Drainer => Drainer,
            ReportCategoryArg::FakeToken => FakeToken,
            ReportCategoryArg::Ponzi => Ponzi,
            ReportCategoryArg::Other => Other,
        }
    }
}

/// Etherscan-family API hosts keyed by chain id. Distinct from
/// `config::chain_descriptor`'s human-facing explorer URLs — this is the
/// JSON API endpoint the fetcher actually queries.
fn api_base_url(chain_id: u64) -> &'static str {
    match chain_id {
        8453 => "https://api.basescan.org/api",
        84532 => "https://api-sepolia.basescan.org/api",
        137 => "https://api.polygonscan.com/api",
        42161 => "https://api.arbiscan.io/api",
        10 => "https://api-optimistic.etherscan.io/api",
        56 => "https://api.bscscan.com/api",
        43114 => "https://api.snowtrace.io/api",
        11155111 => "https://api-sepolia.etherscan.io/api",
        _ => "https://api.etherscan.io/api",
    }
}

fn print_banner() {
    println!("\x1b[1m");
    println!("  riskloom");
    println!("\x1b[0m  \x1b[90mEVM wallet risk-intelligence scoring\x1b[0m\n");
}

fn print_report(report: &RiskReport) {
    let (color, icon) = match report.risk_label {
        RiskLabel::Critical => ("\x1b[91;1m", "\u{1F534}"),
        RiskLabel::High => ("\x1b[93;1m", "\u{1F7E1}"),
        RiskLabel::Medium => ("\x1b[96m", "\u{1F535}"),
        RiskLabel::Low => ("\x1b[92m", "\u{1F7E2}"),
        RiskLabel::NoData => ("\x1b[90m", "\u{26AA}"),
    };
    let reset = "\x1b[0m";
    println!(
        "\n{color}{icon} {address}  {label:?}  score={score}{reset}",
        address = report.address,
        label = report.risk_label,
        score = report.risk_score,
    );
    println!("  Chain       : {} ({})", report.chain_descriptor.name, report.chain_descriptor.short);
    println!("  Tx count    : {}", report.tx_count);
    println!("  ML / heur   : {:.2} / {:.2}", report.ml_raw_score, report.heuristic_score);
    println!("  Community   : {:+}", report.community_risk_modifier as i64);
    if !report.flags.is_empty() {
        println!("  Flags:");
        for flag in &report.flags {
            println!("    - {flag}");
        }
    }
}

fn orchestrator_from_cli(cli: &Cli, community: Option<Arc<CommunityStore>>) -> Orchestrator {
    let config = Config { chain_id: cli.chain_id, cache_dir: cli.cache_dir.clone(), ..Config::from_env() };
    let cache = Arc::new(Cache::new(cli.cache_dir.clone(), config.cache_ttl_seconds));
    let base_url = cli.api_base.clone().unwrap_or_else(|| api_base_url(cli.chain_id).to_string());
    let fetcher = Fetcher::new(&config, base_url, cache);
    let registry = LabelRegistry::new();
    Orchestrator::new(config, fetcher, registry, community)
}

async fn load_community(path: &Option<PathBuf>) -> Result<Option<Arc<CommunityStore>>> {
    let Some(path) = path else { return Ok(None) };
    let store = CommunityStore::load(path.clone())
        .await
        .with_context(|| format!("loading community journal at {}", path.display()))?;
    Ok(Some(Arc::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("riskloom=info".parse()?))
        .compact()
        .init();

    let cli = Cli::parse();
    let metrics = RiskLoomMetrics::new();

    match &cli.command {
        Command::Single { address, json } => {
            print_banner();
            let address = Address::parse(address).map_err(anyhow::Error::from)?;
            let community = load_community(&cli.community_journal).await?;
            let orchestrator = orchestrator_from_cli(&cli, community);
            let report = orchestrator.analyze(&address).await?;
            metrics.record_analysis(report.risk_label);
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            metrics.log_snapshot();
        }

        Command::Batch { addresses_file, json } => {
            print_banner();
            let text = tokio::fs::read_to_string(addresses_file)
                .await
                .with_context(|| format!("reading {}", addresses_file.display()))?;
            let addresses: Vec<Address> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(Address::parse)
                .collect::<Result<_, _>>()
                .map_err(anyhow::Error::from)?;
            info!(count = addresses.len(), "starting batch analysis");

            let community = load_community(&cli.community_journal).await?;
            let config = Config { chain_id: cli.chain_id, cache_dir: cli.cache_dir.clone(), ..Config::from_env() };
            let worker_concurrency = config.worker_concurrency;
            let max_batch_size = config.max_batch_size;
            let orchestrator = Arc::new(orchestrator_from_cli(&cli, community));
            let runner = BatchRunner::new(orchestrator, worker_concurrency, max_batch_size);
            let results = runner.run(addresses).await;

            for (address, outcome) in &results {
                match outcome {
                    Ok(report) => {
                        metrics.record_analysis(report.risk_label);
                        if *json {
                            println!("{}", serde_json::to_string(report)?);
                        } else {
                            print_report(report);
                        }
                    }
                    Err(e) => eprintln!("{address}: analysis failed: {e}"),
                }
            }
            info!(completed = runner.completed(), timed_out = runner.timed_out(), "batch analysis done");
            metrics.log_snapshot();
        }

        Command::Pipeline { edges_file } => {
            print_banner();
            let text = tokio::fs::read_to_string(edges_file)
                .await
                .with_context(|| format!("reading {}", edges_file.display()))?;
            let edges: Vec<EdgeRecord> = serde_json::from_str(&text).with_context(|| "parsing edge list")?;
            let parsed: Vec<_> = edges
                .into_iter()
                .map(|e| -> Result<_> {
                    Ok((
                        Address::parse(&e.from).map_err(anyhow::Error::from)?,
                        Address::parse(&e.to).map_err(anyhow::Error::from)?,
                        e.value_eth,
                        e.timestamp,
                    ))
                })
                .collect::<Result<_>>()?;

            let graph = graph_pipeline::build_graph(&parsed);
            let registry = LabelRegistry::new();
            let result = graph_pipeline::run(&graph, &registry);

            println!("Nodes scored    : {}", result.node_anomaly_scores.len());
            println!("Clusters found  : {}", result.clusters.len());
            for (i, cluster) in result.clusters.iter().enumerate() {
                println!(
                    "\n  cluster #{i}: {} members, score={:.1}, internal_ratio={:.2}",
                    cluster.members.len(),
                    cluster.score,
                    cluster.internal_tx_ratio,
                );
                for explanation in &cluster.explanations {
                    println!("    - {explanation}");
                }
            }
        }

        Command::Eval { data, json } => {
            print_banner();
            let text = tokio::fs::read_to_string(data).await.with_context(|| format!("reading {}", data.display()))?;
            let rows: Vec<WalletRecord> = serde_json::from_str(&text).with_context(|| "parsing labelled dataset")?;
            let wallets: Vec<LabeledWallet> = rows
                .into_iter()
                .map(|r| {
                    let address = Address::parse(&r.address)?;
                    let feature_vec = features::extract(&address, &r.transactions);
                    Ok::<_, riskloom::RiskError>(LabeledWallet { features: feature_vec, label: r.label })
                })
                .collect::<Result<_, _>>()
                .map_err(anyhow::Error::from)?;

            info!(n_wallets = wallets.len(), "training two-stage supervised model");
            let (_stage1, _stage2, result) = eval::train(&wallets);
            if *json {
                println!("{}", eval::report::to_json(&result));
            } else {
                eval::report::print_markdown(&result);
            }
        }

        Command::Report { action } => {
            let path = cli
                .community_journal
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--community-journal is required for report commands"))?;
            let store = CommunityStore::load(path).await.with_context(|| "loading community journal")?;
            match action {
                ReportAction::Submit { address, reporter_id, category, description, evidence_urls } => {
                    let address = Address::parse(address).map_err(anyhow::Error::from)?;
                    let urls: Vec<String> = evidence_urls.iter().filter(|s| !s.is_empty()).cloned().collect();
                    let id = store
                        .submit(
                            address,
                            reporter_id.clone(),
                            category.clone().into(),
                            description.clone(),
                            urls,
                            cli.chain_id,
                            chrono::Utc::now(),
                        )
                        .await
                        .map_err(anyhow::Error::from)?;
                    println!("submitted report {id}");
                }
                ReportAction::Vote { id, voter_id, up } => {
                    store.vote(id, voter_id, *up).await?;
                    println!("recorded vote on {id}");
                }
                ReportAction::Dispute { id } => {
                    store.dispute(id).await?;
                    println!("disputed report {id}");
                }
                ReportAction::List { address } => {
                    let address = Address::parse(address).map_err(anyhow::Error::from)?;
                    for report in store.reports_for(&address) {
                        println!("{:?}", report);
                    }
                }
            }
        }
    }

    Ok(())
}

#[derive(serde::Deserialize)]
struct EdgeRecord {
    from: String,
    to: String,
    value_eth: f64,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(serde::Deserialize)]
struct WalletRecord {
    address: String,
    label: bool,
    transactions: Vec<Transaction>,
}
