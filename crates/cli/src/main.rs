//! lumen research assistant.
//!
//! Usage:
//!   lumen --config lumen.toml
//!   lumen --query "What is quantum entanglement?"
//!   lumen --query "..." --json --no-analysis
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - API key for the OpenAI provider
//! - `LUMEN_TOOL_SERVER` - Tool server endpoint (overrides `[tools] endpoint`)
//! - `RUST_LOG` - Log filter (default: warn,lumen_coordinator=info)

use std::io::Write;
use std::sync::Arc;

use lumen_agents::HttpToolInvoker;
use lumen_coordinator::{FinalAnswer, PipelineConfig, PipelineOrchestrator, RunOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXAMPLE_QUERIES: [&str; 4] = [
    "What are the latest developments in quantum computing?",
    "How does climate change affect ocean currents?",
    "What are the main differences between Rust and Go for systems programming?",
    "Summarize current research on large language model alignment",
];

struct Args {
    config_path: Option<String>,
    query: Option<String>,
    no_analysis: bool,
    json: bool,
}

fn print_help() {
    println!("lumen research assistant");
    println!();
    println!("Usage: lumen [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>   Path to config.toml file");
    println!("  -q, --query <TEXT>    Answer one query and exit");
    println!("      --no-analysis     Skip the analysis stage");
    println!("      --json            Print the answer as JSON");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Interactive commands: a query, an example number, 'examples', 'stats', 'clear', 'quit'");
    println!();
    println!("Environment variables:");
    println!("  OPENAI_API_KEY        API key for the OpenAI provider");
    println!("  LUMEN_TOOL_SERVER     Tool server endpoint (overrides config)");
}

/// Returns `None` when help was requested.
fn parse_args() -> anyhow::Result<Option<Args>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config_path: None,
        query: None,
        no_analysis: false,
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let Some(value) = args.get(i + 1) else {
                    anyhow::bail!("--config requires a file path");
                };
                parsed.config_path = Some(value.clone());
                i += 1;
            }
            "--query" | "-q" => {
                let Some(value) = args.get(i + 1) else {
                    anyhow::bail!("--query requires a query");
                };
                parsed.query = Some(value.clone());
                i += 1;
            }
            "--no-analysis" => parsed.no_analysis = true,
            "--json" => parsed.json = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other => anyhow::bail!("Unknown argument '{other}'. See --help."),
        }
        i += 1;
    }

    Ok(Some(parsed))
}

fn print_answer(answer: &FinalAnswer, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
    } else {
        println!("{}", answer.render());
    }
    Ok(())
}

async fn print_stats(pipeline: &PipelineOrchestrator) {
    let stats = pipeline.memory().stats().await;
    println!(
        "[memory] short-term: {}, total: {}, indexed: {}, rebuilds: {}, long-term: {}",
        stats.short_term_len,
        stats.total_interactions,
        stats.indexed_interactions,
        stats.rebuild_count,
        if stats.long_term_enabled { "on" } else { "off" }
    );
}

fn print_examples() {
    println!("Example queries:");
    for (i, query) in EXAMPLE_QUERIES.iter().enumerate() {
        println!("  {}. {}", i + 1, query);
    }
}

async fn interactive(
    pipeline: &PipelineOrchestrator,
    options: RunOptions,
    json: bool,
) -> anyhow::Result<()> {
    println!("lumen research assistant. Type 'quit' to exit.");
    println!();
    print_examples();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nquery> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        let query = match input {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "examples" => {
                print_examples();
                continue;
            }
            "stats" => {
                print_stats(pipeline).await;
                continue;
            }
            "clear" => {
                pipeline.memory().clear().await;
                println!("Memory cleared.");
                continue;
            }
            other => match other.parse::<usize>() {
                Ok(n) if (1..=EXAMPLE_QUERIES.len()).contains(&n) => EXAMPLE_QUERIES[n - 1],
                _ => other,
            },
        };

        println!("Researching: {query}");
        let answer = pipeline.run_with(query, options).await;
        println!();
        print_answer(&answer, json)?;
        print_stats(pipeline).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so answers on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,lumen_coordinator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let mut config = if let Some(path) = args.config_path {
        tracing::info!(path = %path, "Loading configuration");
        PipelineConfig::from_file(&path)?
    } else {
        tracing::info!("Using default configuration");
        PipelineConfig::default()
    };

    if let Ok(endpoint) = std::env::var("LUMEN_TOOL_SERVER") {
        config.tools.endpoint = endpoint;
    }

    let tools = Arc::new(HttpToolInvoker::new(&config.tools));
    tracing::info!(endpoint = %config.tools.endpoint, "Using tool server");

    let pipeline = PipelineOrchestrator::from_config(config, tools)?;
    let options = RunOptions {
        enable_analysis: args.no_analysis.then_some(false),
    };

    match args.query {
        Some(query) => {
            let answer = pipeline.run_with(&query, options).await;
            print_answer(&answer, args.json)?;
        }
        None => interactive(&pipeline, options, args.json).await?,
    }

    Ok(())
}
