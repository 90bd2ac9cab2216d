//! wikirag CLI - retrieval-augmented answering over a knowledge-base pool.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use wikirag::client::HealthStatus;
use wikirag::models::FailurePolicy;
use wikirag::{
    Config, DatasetSpec, EndpointPool, HttpTransport, LLMClient, MultiEndpointClient,
    PromptBuilder, RagPipeline, ResultLog, RunOptions, SamplingParams,
};

#[derive(Parser)]
#[command(name = "wikirag")]
#[command(version)]
#[command(about = "Retrieval-augmented question answering over a redundant knowledge-base pool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, global = true, default_value = "wikirag.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer every question of a dataset and append results to the log
    Run {
        /// Dataset name (cwq, webqsp, grailqa, simpleqa, qald, webquestions, trex, zeroshotre, creak)
        #[arg(short, long)]
        dataset: Option<String>,

        /// Dataset file (overrides the dataset's default location)
        #[arg(long)]
        dataset_path: Option<PathBuf>,

        /// Endpoint list file, one address per line
        #[arg(long)]
        addr_list: Option<PathBuf>,

        /// Few-shot prompt prefix file
        #[arg(long)]
        few_shot_path: Option<PathBuf>,

        /// Result log (JSON lines, appended)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Completion model
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Maximum tokens in each answer
        #[arg(long)]
        max_length: Option<u32>,

        /// Completion API key
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// What to do with a failed record: skip or abort
        #[arg(long)]
        on_failure: Option<FailurePolicy>,

        /// Whole-record retries before the failure policy applies
        #[arg(long)]
        record_retries: Option<u32>,
    },

    /// Validate configuration and probe every endpoint
    Validate {
        /// Endpoint list file, one address per line
        #[arg(long)]
        addr_list: Option<PathBuf>,
    },

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# wikirag configuration file

[completion]
# API key (can also use OPENAI_API_KEY env var)
# api_key = "sk-..."
base_url = "https://api.openai.com/v1"
model = "gpt-3.5-turbo"
temperature = 0.4
max_tokens = 256
timeout_secs = 120
max_retries = 3

[lookup]
addresses_file = "./server_urls.txt"
attempt_timeout_secs = 30

[pipeline]
dataset = "webqsp"
# dataset_path = "data/WebQSP.json"
few_shot_path = "./rag_prompt.txt"
output_path = "./rag_results.jsonl"
failure_policy = "skip"   # or "abort"
record_retries = 0
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file_or_default(path)
        .with_context(|| format!("Failed to load config from {path:?}"))
}

fn build_lookup(config: &Config) -> Result<MultiEndpointClient> {
    let pool = EndpointPool::from_file(&config.lookup.addresses_file)
        .context("Failed to load endpoint list")?;
    info!(endpoints = ?pool.addresses(), "Server addresses");

    let timeout = config.attempt_timeout();
    let transport = HttpTransport::new(timeout).context("Failed to build HTTP transport")?;
    Ok(MultiEndpointClient::new(pool, Arc::new(transport), timeout))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate { addr_list } => {
            let mut config = load_config(&cli.config)?;
            if let Some(path) = addr_list {
                config.lookup.addresses_file = path;
            }

            let lookup = build_lookup(&config)?;
            let results = lookup.probe_all().await;
            let healthy = results
                .iter()
                .filter(|r| r.status == HealthStatus::Healthy)
                .count();

            println!("\n=== Knowledge-base endpoints ===");
            for result in &results {
                match result.latency_ms {
                    Some(ms) => println!("{:<40} {:<12} {ms}ms", result.endpoint, result.status),
                    None => println!("{:<40} {:<12} -", result.endpoint, result.status),
                }
            }
            println!("Healthy:     {healthy}/{}", results.len());

            match config.resolve_api_key() {
                Ok(api_key) => {
                    let llm = LLMClient::from_config(&config.completion, api_key)?;
                    let health = llm.health_check().await;
                    println!("Completion:  {} ({})", health.endpoint, health.status);
                }
                Err(e) => warn!(error = %e, "Completion endpoint not checked"),
            }

            if healthy == 0 {
                bail!("no knowledge-base endpoint is healthy");
            }
            info!("Configuration is valid");
        }

        Commands::Run {
            dataset,
            dataset_path,
            addr_list,
            few_shot_path,
            output,
            model,
            temperature,
            max_length,
            api_key,
            on_failure,
            record_retries,
        } => {
            let mut config = load_config(&cli.config)?;

            // CLI flags override the config file
            if let Some(v) = dataset {
                config.pipeline.dataset = v;
            }
            if let Some(v) = dataset_path {
                config.pipeline.dataset_path = Some(v);
            }
            if let Some(v) = addr_list {
                config.lookup.addresses_file = v;
            }
            if let Some(v) = few_shot_path {
                config.pipeline.few_shot_path = v;
            }
            if let Some(v) = output {
                config.pipeline.output_path = v;
            }
            if let Some(v) = model {
                config.completion.model = v;
            }
            if let Some(v) = temperature {
                config.completion.temperature = v;
            }
            if let Some(v) = max_length {
                config.completion.max_tokens = v;
            }
            if let Some(v) = api_key {
                config.completion.api_key = Some(v);
            }
            if let Some(v) = on_failure {
                config.pipeline.failure_policy = v;
            }
            if let Some(v) = record_retries {
                config.pipeline.record_retries = v;
            }

            let api_key = config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            let spec = DatasetSpec::find(&config.pipeline.dataset)?;
            let dataset_file = spec.path(config.pipeline.dataset_path.as_deref());
            let records = spec
                .load(&dataset_file)
                .with_context(|| format!("Failed to load dataset from {dataset_file:?}"))?;

            let lookup = Arc::new(build_lookup(&config)?);
            let llm = Arc::new(LLMClient::from_config(&config.completion, api_key)?);
            let prompt = PromptBuilder::from_file(&config.pipeline.few_shot_path)?;

            let pipeline = RagPipeline::new(
                lookup,
                llm.clone(),
                prompt,
                SamplingParams::from(&config.completion),
                RunOptions {
                    failure_policy: config.pipeline.failure_policy,
                    record_retries: config.pipeline.record_retries,
                    show_progress: true,
                },
            );

            // Ctrl-C lets the record in flight finish its log append.
            let shutdown = pipeline.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing current record");
                    shutdown.store(true, Ordering::SeqCst);
                }
            });

            let mut log = ResultLog::open(&config.pipeline.output_path)?;
            let stats = pipeline.run(records, &mut log).await?;
            let (tokens_in, tokens_out) = llm.total_tokens();
            let limits = llm.rate_limiter().stats();

            println!("\n=== RAG Run Complete ===");
            println!("Started:     {}", stats.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Records:     {}", stats.total_records);
            println!("Written:     {}", stats.written);
            println!("Skipped:     {}", stats.skipped);
            println!("Retries:     {}", stats.retries);
            if stats.interrupted {
                println!("Interrupted: yes");
            }
            println!("Tokens:      {tokens_in} in / {tokens_out} out");
            println!(
                "Rate limits: {} of {} requests throttled, {:.1}s waited",
                limits.total_429s, limits.total_requests, limits.total_wait_secs
            );
            println!("Throughput:  {:.0}/hr", stats.throughput_per_hour);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {:?}", log.path());
        }
    }

    Ok(())
}
