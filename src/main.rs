mod agent;
mod config;
mod export;
mod instrumentation;
mod llm;
mod model;
mod progress;
mod retrieval;
#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use agent::refiner::Refiner;
use agent::{Pipeline, PipelineRun, PipelineSettings};
use config::{Config, LogFormat, Provider};
use export::ExportDocument;
use instrumentation::{RunLog, RunLogger};
use llm::{AnthropicClient, ChatBackend, LlmClient, RateLimiter, ResilientClient};
use model::{PipelineOutput, Strategy};
use progress::{ConsoleSink, ProgressSink, TracingSink};
use retrieval::{ArxivClient, OfflineSource, PaperSource};

#[derive(Parser)]
#[command(
    name = "research-agent",
    about = "Refine a topic into sub-questions, research them on arXiv and write a report"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print stage, retry and tool-selection progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a single topic
    Run {
        /// The topic to research
        topic: String,
        #[arg(long, value_enum, default_value_t = Strategy::Fixed)]
        strategy: Strategy,
        /// Skip arXiv and answer from general knowledge
        #[arg(long)]
        no_search: bool,
        /// Write the JSON export document to this path
        #[arg(long)]
        export_json: Option<PathBuf>,
        /// Write the plain-text report to this path
        #[arg(long)]
        export_text: Option<PathBuf>,
    },
    /// Only decompose a topic into sub-questions
    Refine {
        topic: String,
    },
    /// Run every topic in a JSONL file
    Batch {
        /// Path to JSONL file with {"topic": ...} lines
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = Strategy::Fixed)]
        strategy: Strategy,
        #[arg(long)]
        no_search: bool,
    },
}

#[derive(serde::Deserialize)]
struct BatchTopic {
    topic: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let sink: Arc<dyn ProgressSink> = if cli.verbose {
        Arc::new(ConsoleSink)
    } else {
        Arc::new(TracingSink)
    };

    match cli.command {
        Commands::Run {
            topic,
            strategy,
            no_search,
            export_json,
            export_text,
        } => {
            let pipeline = build_pipeline(&config, sink, strategy, no_search)?;
            let run = pipeline.run(&topic).await?;
            print_run(&run.output);
            println!("{}", run.log.summary());

            if let Some(path) = export_json {
                ExportDocument::from_output(&run.output).write_json(&path)?;
                eprintln!("JSON export written to {}", path.display());
            }
            if let Some(path) = export_text {
                export::write_text(&run.output, &path)?;
                eprintln!("Text export written to {}", path.display());
            }
        }
        Commands::Refine { topic } => {
            if topic.trim().is_empty() {
                bail!("Topic must not be empty");
            }
            let refiner = build_refiner(&config, sink)?;
            let refinement = refiner.refine(topic.trim()).await;
            for q in &refinement.questions {
                println!("{}. {}", q.id, q.question);
                if !q.clarifier.is_empty() {
                    println!("    {}", q.clarifier);
                }
            }
        }
        Commands::Batch {
            path,
            strategy,
            no_search,
        } => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("Failed to open batch file: {}", path.display()))?;
            let reader = std::io::BufReader::new(file);
            let pipeline = build_pipeline(&config, sink, strategy, no_search)?;

            let mut run_logs: Vec<RunLog> = Vec::new();
            let mut errors = 0;

            for (i, line) in reader.lines().enumerate() {
                let line = line.context("Failed to read line")?;
                if line.trim().is_empty() {
                    continue;
                }

                let entry: BatchTopic = serde_json::from_str(&line)
                    .with_context(|| format!("Failed to parse line {}", i + 1))?;

                eprintln!("\n[{}] {}", i + 1, entry.topic);

                match pipeline.run(&entry.topic).await {
                    Ok(PipelineRun { log, .. }) => {
                        println!("  {}", log.summary());
                        run_logs.push(log);
                    }
                    Err(e) => {
                        eprintln!("  ERROR: {:#}", e);
                        errors += 1;
                    }
                }
            }

            if !run_logs.is_empty() {
                let runs = run_logs.len() as f64;
                println!("\n=== Batch Summary ===");
                println!("Topics: {} (errors: {})", run_logs.len(), errors);

                let avg_questions = run_logs.iter().map(|r| r.questions).sum::<u32>() as f64 / runs;
                let avg_latency =
                    run_logs.iter().map(|r| r.total_latency_ms).sum::<u64>() as f64 / runs;
                let total_tokens: u32 = run_logs.iter().map(|r| r.total_tokens()).sum();
                let total_cost: f64 = run_logs.iter().map(|r| r.total_cost).sum();

                println!("Avg sub-questions: {:.1}", avg_questions);
                println!("Avg latency: {:.1}s", avg_latency / 1000.0);
                println!("Total tokens: {}", total_tokens);
                println!("Total cost: ${:.4}", total_cost);
            }
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_llm(config: &Config, sink: Arc<dyn ProgressSink>) -> Result<ResilientClient> {
    let backend: Arc<dyn ChatBackend> = match config.provider {
        Provider::OpenAi => Arc::new(LlmClient::new(
            &config.llm_api_key,
            &config.llm_base_url,
            &config.llm_model,
            config.llm_timeout,
        )?),
        Provider::Anthropic => Arc::new(AnthropicClient::new(
            &config.llm_api_key,
            &config.llm_base_url,
            &config.llm_model,
            config.llm_timeout,
        )?),
    };
    Ok(ResilientClient::new(
        backend,
        Arc::new(RateLimiter::new(config.requests_per_minute, config.burst)),
        config.retry.clone(),
        sink,
    ))
}

/// Only the model client; no search client or run log directory.
fn build_refiner(config: &Config, sink: Arc<dyn ProgressSink>) -> Result<Refiner> {
    let llm = build_llm(config, sink)?;
    Ok(Refiner::new(llm, config.system_prompt.clone(), config.temperature))
}

fn build_pipeline(
    config: &Config,
    sink: Arc<dyn ProgressSink>,
    strategy: Strategy,
    no_search: bool,
) -> Result<Pipeline> {
    let llm = build_llm(config, sink.clone())?;

    let source: Arc<dyn PaperSource> = if no_search {
        Arc::new(OfflineSource)
    } else {
        Arc::new(ArxivClient::new(
            &config.arxiv_url,
            config.search_timeout,
            sink.clone(),
        )?)
    };

    let settings = PipelineSettings {
        strategy,
        system_prompt: config.system_prompt.clone(),
        temperature: config.temperature,
        research: config.research_settings(),
    };
    let logger = RunLogger::new(&config.log_dir)?;

    Ok(Pipeline::new(llm, source, sink, settings).with_logger(logger))
}

fn print_run(output: &PipelineOutput) {
    println!("\n=== Sub-questions ===");
    for q in &output.questions {
        println!("{}. {}", q.id, q.question);
    }

    println!("\n=== Research ===");
    for result in &output.research {
        let analysis = &result.analysis;
        println!(
            "{} [confidence: {}, data quality: {}, papers: {}]",
            result.sub_question.id,
            analysis.confidence.as_str(),
            analysis.data_quality.as_str(),
            analysis.supporting_papers.len()
        );
        for finding in &analysis.findings {
            println!("  - {}", finding);
        }
        for paper in &analysis.supporting_papers {
            println!("    * {} ({})", paper.title, paper.url);
        }
    }

    println!("\n=== Report ===\n{}\n", output.report);
}
