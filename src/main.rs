//! complexity-quiz: terminal quiz on P, NP, NP-Complete and NP-Hard problems.
//!
//! Questions are generated by a language model and served through a tiered
//! cache: memory → persistent store → live generation.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use complexity_quiz::cache::facade::QuestionCache;
use complexity_quiz::cache::persistent::PersistentTier;
use complexity_quiz::config::{Cli, Command, Config};
use complexity_quiz::generation::anthropic::AnthropicClient;
use complexity_quiz::generation::client::GenerationClient;
use complexity_quiz::metrics::{MetricsSink, PrometheusSink};
use complexity_quiz::quiz::{InputReader, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging. Stdout belongs to the quiz.
    let filter = if cli.verbose {
        "complexity_quiz=debug"
    } else {
        "complexity_quiz=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("complexity-quiz v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;

    info!(
        store = %config.cache.store_path.display(),
        memory_capacity = config.cache.memory_capacity,
        disk_capacity = config.cache.disk_capacity,
        workers = config.prefetch.workers,
        "Configuration loaded"
    );

    let command = cli.command.unwrap_or(Command::Play);
    if command == Command::Stats {
        print_store_stats(&config);
        return Ok(());
    }

    let client = match AnthropicClient::from_config(&config.generation) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Question generator unavailable");
            println!("AI mode is unavailable: {e}");
            return Ok(());
        }
    };
    info!(model = client.model(), "Question generator ready");

    let sink = Arc::new(PrometheusSink::new()?);
    let metrics: Arc<dyn MetricsSink> = sink.clone();
    let generator: Arc<dyn GenerationClient> = client.clone();

    let cache = QuestionCache::new(&config.cache, &config.prefetch, generator, Some(metrics));
    cache.start();

    match command {
        Command::Warm => {
            tokio::select! {
                _ = cache.scheduler().wait_idle() => info!("Warm-up complete"),
                _ = tokio::signal::ctrl_c() => warn!("Interrupted, stopping warm-up"),
            }
        }
        _ => {
            let mut session = Session::new(
                &cache,
                Some(client.as_ref()),
                &config.quiz,
                InputReader::stdin(),
                std::io::stdout(),
            );
            tokio::select! {
                result = session.run() => {
                    let score = result?;
                    info!(asked = score.asked, correct = score.correct, skipped = score.skipped, "Session finished");
                }
                _ = tokio::signal::ctrl_c() => warn!("Interrupted"),
            }
        }
    }

    cache.shutdown().await;

    let stats = cache.scheduler().stats();
    info!(
        scheduled = stats.scheduled.load(std::sync::atomic::Ordering::Relaxed),
        generated = stats.generated.load(std::sync::atomic::Ordering::Relaxed),
        failed = stats.failed.load(std::sync::atomic::Ordering::Relaxed),
        "Prefetch summary"
    );

    if cli.metrics {
        print!("{}", sink.render());
    }

    Ok(())
}

fn print_store_stats(config: &Config) {
    let store = PersistentTier::open(
        &config.cache.store_path,
        config.cache.disk_capacity,
        config.cache.zstd_level,
    );

    let mut counts: Vec<_> = store.counts().into_iter().collect();
    counts.sort_by_key(|(key, _)| key.to_string());

    println!("Store: {}", store.path().display());
    if counts.is_empty() {
        println!("  (empty)");
    }
    for (key, count) in &counts {
        println!("  {key:<16} {count:>3} / {}", store.capacity());
    }
}
