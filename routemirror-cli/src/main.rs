mod config;
mod logging;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use routemirror_core::effect::Effect;
use routemirror_core::metrics::publish_route_counts;
use routemirror_core::plan::Plan;
use routemirror_core::reconciler::{
    NotificationStatus, Reconciler, ReconcilerConfig, RouteTableTarget, RunReport,
};
use routemirror_core::store::MirrorStore;
use routemirror_core::stream::{StreamEvent, publish_inserted_routes};
use routemirror_provider_aws::AwsClients;
use routemirror_state::{BackendConfig, create_backend};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "routemirror")]
#[command(about = "Mirror transit gateway route tables into a key-value store", long_about = None)]
struct Cli {
    /// AWS region (defaults to the SDK provider chain)
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the mirror in line with both route tables
    Reconcile {
        #[command(flatten)]
        store: StoreArgs,

        /// Compute and report the changes without writing or notifying
        #[arg(long)]
        dry_run: bool,

        /// Writes per batch (capped at the store's limit)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show the changes a reconcile would make
    Plan {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Publish propagated VPN route counts to CloudWatch
    CountRoutes,
    /// Publish a notice for every row inserted in a DynamoDB Streams event
    NotifyStream {
        /// Event JSON file (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Mirror store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Dynamodb)]
    store: StoreKind,

    /// Mirror file for the local store
    #[arg(long)]
    path: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Dynamodb,
    Local,
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let region = cli.region.as_deref();

    let result = match cli.command {
        Commands::Reconcile {
            store,
            dry_run,
            batch_size,
        } => run_reconcile(region, &store, dry_run, batch_size).await,
        Commands::Plan { store } => run_plan(region, &store).await,
        Commands::CountRoutes => run_count_routes(region).await,
        Commands::NotifyStream { file } => run_notify_stream(region, file.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn backend_config(config: &Config, args: &StoreArgs) -> Result<BackendConfig, String> {
    match args.store {
        StoreKind::Dynamodb => {
            let table = config.table_name().map_err(|e| e.to_string())?;
            Ok(BackendConfig::new("dynamodb").with_attribute("table", table))
        }
        StoreKind::Local => {
            let mut backend = BackendConfig::new("local");
            if let Some(path) = &args.path {
                backend = backend.with_attribute("path", path.to_string_lossy());
            }
            Ok(backend)
        }
    }
}

async fn open_store(
    config: &Config,
    args: &StoreArgs,
    region: Option<&str>,
) -> Result<Arc<dyn MirrorStore>, String> {
    let mut backend = backend_config(config, args)?;
    if let Some(region) = region {
        backend = backend.with_attribute("region", region);
    }
    let store = create_backend(&backend).await.map_err(|e| e.to_string())?;
    log::info!("Using {} mirror store", store.name());
    Ok(Arc::from(store))
}

async fn run_reconcile(
    region: Option<&str>,
    store_args: &StoreArgs,
    dry_run: bool,
    batch_size: Option<usize>,
) -> Result<(), String> {
    let config = Config::from_env();
    let targets = config.targets().map_err(|e| e.to_string())?;
    let clients = AwsClients::new(region).await;
    let store = open_store(&config, store_args, region).await?;

    let mut reconciler = Reconciler::new(Arc::new(clients.route_source()), store).with_config(
        ReconcilerConfig {
            dry_run,
            batch_size,
            ..ReconcilerConfig::default()
        },
    );
    match config.sns_topic_arn() {
        Ok(arn) => reconciler = reconciler.with_notifier(Arc::new(clients.notifier(arn))),
        Err(e) => log::warn!("Notifications disabled: {}", e),
    }

    if dry_run {
        println!("{}", "Dry run: nothing will be written.".yellow().bold());
    }
    println!("{}", "Reconciling route tables...".cyan().bold());
    println!();

    let report = reconciler.reconcile_all(&targets).await;
    print_run_report(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} route tables failed",
            report.failure_count(),
            report.outcomes.len()
        ))
    }
}

fn print_run_report(report: &RunReport) {
    for outcome in &report.outcomes {
        let label = target_label(&outcome.target);
        match &outcome.result {
            Ok(table) => {
                println!(
                    "  {} {}: {} added, {} removed, {} unchanged{}",
                    "✓".green(),
                    label,
                    table.added,
                    table.removed,
                    table.unchanged,
                    if table.dry_run { " (dry run)" } else { "" }
                );
                match &table.notification {
                    NotificationStatus::Sent => println!("    {}", "notification sent".green()),
                    NotificationStatus::Failed(e) => {
                        println!("    {} {}", "notification failed:".yellow(), e)
                    }
                    NotificationStatus::NotNeeded | NotificationStatus::Disabled => {}
                }
            }
            Err(e) => println!("  {} {} - {}", "✗".red(), label, e),
        }
    }

    println!();
    if report.is_success() {
        println!("{}", "Reconcile complete!".green().bold());
    } else {
        println!(
            "{}",
            format!(
                "Reconcile finished with {} failed route table(s).",
                report.failure_count()
            )
            .red()
            .bold()
        );
    }
}

async fn run_plan(region: Option<&str>, store_args: &StoreArgs) -> Result<(), String> {
    let config = Config::from_env();
    let targets = config.targets().map_err(|e| e.to_string())?;
    let clients = AwsClients::new(region).await;
    let store = open_store(&config, store_args, region).await?;
    let reconciler = Reconciler::new(Arc::new(clients.route_source()), store);

    let mut failures = 0;
    for target in &targets {
        println!("{}", target_label(target).bold());
        match reconciler.plan(target).await {
            Ok(diff) => {
                let plan = Plan::from_diff(&diff);
                print_plan(&plan);
                println!("  {} unchanged", diff.unchanged);
            }
            Err(e) => {
                println!("  {} {}", "✗".red(), e);
                failures += 1;
            }
        }
        println!();
    }

    if failures == 0 {
        Ok(())
    } else {
        Err(format!("Could not plan {} route table(s)", failures))
    }
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("  {}", "No changes. Mirror is up-to-date.".green());
        return;
    }

    for effect in plan.effects() {
        match effect {
            Effect::Put(_) => println!("  {}", effect.to_string().green()),
            Effect::Delete(_) => println!("  {}", effect.to_string().red()),
        }
    }
    println!("  {}", plan.summary().to_string().bold());
}

async fn run_count_routes(region: Option<&str>) -> Result<(), String> {
    let config = Config::from_env();
    let (namespace, targets) = config.count_targets().map_err(|e| e.to_string())?;
    let clients = AwsClients::new(region).await;
    let source = clients.route_source();
    let sink = clients.metrics();

    let results = publish_route_counts(&source, &sink, &namespace, &targets).await;

    let mut failures = 0;
    for (target, result) in &results {
        match result {
            Ok(count) => println!(
                "  {} {} = {} ({})",
                "✓".green(),
                target.metric_name,
                count,
                target.route_table_id
            ),
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), target.metric_name, e);
                failures += 1;
            }
        }
    }

    if failures == 0 {
        Ok(())
    } else {
        Err(format!("{} of {} counts failed", failures, results.len()))
    }
}

async fn run_notify_stream(region: Option<&str>, file: Option<&Path>) -> Result<(), String> {
    let config = Config::from_env();
    let topic_arn = config.sns_topic_arn().map_err(|e| e.to_string())?;

    let json = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            buffer
        }
    };
    let event = StreamEvent::from_json(&json).map_err(|e| e.to_string())?;

    let clients = AwsClients::new(region).await;
    let notifier = clients.notifier(topic_arn);
    let report = publish_inserted_routes(&event, &notifier).await;

    println!(
        "{} published, {} skipped, {} failed",
        report.published.to_string().green(),
        report.skipped,
        report.failed.to_string().red()
    );
    if report.failed == 0 {
        Ok(())
    } else {
        Err(format!("{} stream records could not be notified", report.failed))
    }
}

fn target_label(target: &RouteTableTarget) -> String {
    format!("{} ({})", target.environment, target.route_table_id)
}
