use std::sync::Arc;

use clap::Parser;

mod cli;
mod clock;
mod collector;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod scheduler;
mod service;
mod snapshot;
mod store;
mod summarizer;

use cli::{Cli, Command};
use clock::{Clock, SystemClock};
use config::Config;
use error::Result;
use models::InsertOutcome;
use scheduler::Scheduler;
use service::NewsService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Opening the store is the one failure that ends the process
    let service = NewsService::new(&config, clock.clone()).await?;

    match cli.command() {
        Command::Run => run_service(service, clock, &config).await?,
        Command::Once => {
            let articles = service.run_once().await?;
            println!("Collected {} articles", articles.len());
        }
        Command::Summary => match service.daily_summary().await? {
            Some(summary) => {
                println!("{}", summary.text);
                if summary.outcome == InsertOutcome::AlreadyExists {
                    println!("(a summary for {} was already stored)", summary.date);
                }
            }
            None => println!("No articles in the summary window"),
        },
        Command::Status => {
            let status = service.status().await?;
            let health = service.health_check().await?;
            println!("Articles stored:        {}", status.total_articles);
            println!("Articles last 24 hours: {}", health.recent_articles);
            match status.latest_summary {
                Some(date) => println!("Latest daily summary:   {}", date),
                None => println!("Latest daily summary:   none"),
            }
            println!("Snapshot:               {}", status.snapshot_path.display());
            println!(
                "Free disk space:        {} GB{}",
                health.free_disk_gb,
                if health.low_disk { " (low)" } else { "" }
            );

            let scheduler = Scheduler::from_config(service, clock, &config)?;
            println!("\nSchedule:");
            for pending in scheduler.upcoming()? {
                println!(
                    "  {:<14} {:<22} next {}",
                    pending.job.name(),
                    pending.schedule.to_string(),
                    pending.next_run.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    Ok(())
}

async fn run_service(service: NewsService, clock: Arc<dyn Clock>, config: &Config) -> Result<()> {
    let mut scheduler = Scheduler::from_config(service, clock, config)?;
    let handle = scheduler.handle();
    let mut task = tokio::spawn(async move { scheduler.start().await });

    tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            tracing::info!("Received shutdown signal");
            handle.stop();
            task.await.map_err(anyhow::Error::from)??;
        }
        joined = &mut task => {
            joined.map_err(anyhow::Error::from)??;
        }
    }

    tracing::info!("Bot stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
