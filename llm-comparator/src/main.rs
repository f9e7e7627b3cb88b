//! LLM Comparator CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use llm_comparator::{
    config::Config,
    engine::BenchmarkRun,
    models::{ModelRegistry, Pricing},
    reporting::{print_console_report, store::DATABASE_FILE, write_reports, ResultStore},
    runner::ConsoleProgress,
    tasks::{catalog::QUICK_TASK_COUNT, load_catalog_from_file, Category, TaskCatalog},
};

#[derive(Parser)]
#[command(name = "llm-comparator")]
#[command(about = "Benchmark LLM providers for accuracy, latency and cost")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the benchmark
    Run {
        /// Comma-separated model aliases
        #[arg(short, long, conflicts_with = "profile")]
        models: Option<String>,

        /// Named model list from the config file
        #[arg(short, long)]
        profile: Option<String>,

        /// Maximum number of tasks, kept proportional across categories
        #[arg(short, long, conflicts_with = "quick")]
        limit: Option<usize>,

        /// Run a small smoke-test subset
        #[arg(short, long)]
        quick: bool,

        /// Comma-separated task categories to run (default: all)
        #[arg(long)]
        categories: Option<String>,

        /// Path to task definitions (file or directory)
        #[arg(short, long)]
        tasks: Option<PathBuf>,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Judge model alias for LLM-judged tasks
        #[arg(long)]
        judge: Option<String>,

        /// Save raw responses to individual files in the output directory
        #[arg(long)]
        save_responses: bool,
    },

    /// List available tasks
    ListTasks {
        /// Path to task definitions
        #[arg(short, long)]
        tasks: Option<PathBuf>,
    },

    /// Show how model aliases resolve to providers and prices
    Resolve {
        /// Model aliases
        #[arg(required = true)]
        aliases: Vec<String>,
    },

    /// List recorded runs, or show one run's per-model metrics
    History {
        /// Run id to show in detail
        run_id: Option<String>,

        /// History database (default: <output_dir>/history.sqlite)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/models.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("llm_comparator=debug,info")
        } else {
            EnvFilter::new("llm_comparator=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run {
            models,
            profile,
            limit,
            quick,
            categories,
            tasks,
            output,
            judge,
            save_responses,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(judge) = judge {
                config.judge.model = judge;
            }
            if save_responses {
                config.output.save_responses = true;
            }
            let options = RunOptions {
                models,
                profile,
                limit: if quick { Some(QUICK_TASK_COUNT) } else { limit },
                categories,
                tasks,
                output,
            };
            run_benchmark(config, options).await?;
        }

        Commands::ListTasks { tasks } => {
            list_tasks(tasks)?;
        }

        Commands::Resolve { aliases } => {
            let config = Config::load(cli.config.as_deref())?;
            resolve_models(&config, &aliases)?;
        }

        Commands::History { run_id, db } => {
            let config = Config::load(cli.config.as_deref())?;
            let db = db.unwrap_or_else(|| config.output_dir().join(DATABASE_FILE));
            show_history(&db, run_id.as_deref())?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

struct RunOptions {
    models: Option<String>,
    profile: Option<String>,
    limit: Option<usize>,
    categories: Option<String>,
    tasks: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn split_list(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_catalog(path: Option<PathBuf>) -> Result<TaskCatalog, Box<dyn std::error::Error>> {
    let catalog = match path {
        Some(path) => {
            tracing::info!("Loading tasks from {}", path.display());
            load_catalog_from_file(&path)?
        }
        None => TaskCatalog::builtin()?,
    };
    Ok(catalog)
}

async fn run_benchmark(config: Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let aliases = match (&options.models, &options.profile) {
        (Some(models), _) => split_list(models),
        (None, Some(profile)) => config.profile(profile)?.to_vec(),
        (None, None) => {
            return Err("select models with --models a,b or --profile <name>".into());
        }
    };

    let mut catalog = load_catalog(options.tasks)?;
    if let Some(categories) = &options.categories {
        let selected = split_list(categories)
            .iter()
            .map(|c| c.parse::<Category>())
            .collect::<Result<Vec<_>, _>>()?;
        catalog = catalog.filter_categories(&selected);
    }
    if let Some(limit) = options.limit {
        catalog = catalog.truncate(limit);
    }

    println!(
        "Running {} tasks against {} models: {}",
        catalog.len(),
        aliases.len(),
        aliases.join(", ")
    );

    let output_dir = options.output.unwrap_or_else(|| config.output_dir());
    let output_config = config.output.clone();

    let outcome = BenchmarkRun::new(config)
        .with_progress(Arc::new(ConsoleProgress))
        .execute(catalog.tasks(), &aliases)
        .await?;

    print_console_report(&outcome);

    let files = write_reports(&outcome, &output_config, &output_dir)?;
    for file in files {
        println!("  wrote {}", file.display());
    }
    Ok(())
}

fn list_tasks(tasks_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(tasks_path)?;

    println!("Available Tasks ({} total):\n", catalog.len());
    for category in catalog.categories() {
        let in_category: Vec<_> = catalog
            .tasks()
            .iter()
            .filter(|t| t.category == category)
            .collect();
        let weight = catalog
            .category_weights()
            .get(&category)
            .map(|w| format!(", weight {}", w))
            .unwrap_or_default();
        println!("{} ({} tasks{}):", category.label(), in_category.len(), weight);
        for task in in_category {
            println!("  {} [{}]", task.id, task.method().as_str());
        }
        println!();
    }
    Ok(())
}

fn resolve_models(config: &Config, aliases: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ModelRegistry::from_config(config);
    println!("{:<32} {:<12} {:<40} {}", "ALIAS", "PROVIDER", "MODEL ID", "PRICE (in/out per 1M)");
    for spec in registry.resolve_all(aliases)? {
        let price = match spec.pricing {
            Pricing::PerMillion {
                input_price_per_million,
                output_price_per_million,
            } => format!("${:.2} / ${:.2}", input_price_per_million, output_price_per_million),
            Pricing::Unknown => "unknown".to_string(),
        };
        println!(
            "{:<32} {:<12} {:<40} {}",
            spec.alias, spec.resolved_provider, spec.resolved_model_id, price
        );
    }
    Ok(())
}

fn show_history(db: &std::path::Path, run_id: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    if !db.exists() {
        return Err(format!("no run history at {}", db.display()).into());
    }
    let store = ResultStore::open(db)?;

    let Some(run_id) = run_id else {
        println!("{:<20} {:<27} {:>6} {:>6} {:>6}  {}", "RUN", "COMPLETED", "TASKS", "PAIRS", "FAILED", "MODELS");
        for run in store.runs()? {
            println!(
                "{:<20} {:<27} {:>6} {:>6} {:>6}  {}",
                run.run_id, run.completed_at, run.total_tasks, run.total_pairs, run.failed_pairs, run.models
            );
        }
        return Ok(());
    };

    let run = store
        .run(run_id)?
        .ok_or_else(|| format!("run {} not found in {}", run_id, db.display()))?;
    println!("Run {} ({} tasks, {} pairs, {} failed)", run.run_id, run.total_tasks, run.total_pairs, run.failed_pairs);
    if let Some(judge) = &run.judge_model {
        println!("Judge: {}", judge);
    }
    println!();
    println!("{:<32} {:>8} {:>9} {:>10} {:>12} {:>12}", "MODEL", "SCORE", "FAILED", "P95 (ms)", "COST", "JUDGE COST");
    for m in store.metrics_for_run(run_id)?.iter().filter(|m| m.category.is_none()) {
        println!(
            "{:<32} {:>8.3} {:>8.0}% {:>10} {:>12.6} {:>12.6}",
            m.model,
            m.mean_score,
            m.failure_rate * 100.0,
            m.p95_latency_ms,
            m.total_cost_usd,
            m.judge_cost_usd
        );
    }
    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Config::default().save_toml(&output)?;
    println!("Configuration written to {}", output.display());
    Ok(())
}
