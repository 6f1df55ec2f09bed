//! wvbridge CLI — operator interface for exercising the bridge primitives.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Parser, Subcommand};
use tracing::{Level, info};
use wvbridge::config::Config;
use wvbridge::dispatch::MainLoop;
use wvbridge::emit;
use wvbridge::message::{Message, TracingSink};
use wvbridge::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "wvbridge", about = "Main-thread dispatch and message marshaling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a main loop and hammer it from worker threads
    Demo {
        /// Number of submitting worker threads
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Fire-and-forget items per worker
        #[arg(long, default_value_t = 8)]
        items: usize,
    },
    /// Concatenate the arguments and emit them through the log sink
    Say {
        /// Values to concatenate, no separators added
        args: Vec<String>,
        /// Level to emit at
        #[arg(long, default_value = "info")]
        level: Level,
    },
    /// Print the resolved configuration
    Config,
}

/// Context handle passed through to the sink with every message.
#[derive(Debug, Clone, Copy)]
struct Origin {
    worker: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "wvbridge".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Demo { workers, items } => cmd_demo(&config, workers, items).await,
        Command::Say { args, level } => {
            cmd_say(args, level);
            Ok(())
        }
        Command::Config => {
            cmd_config(&config);
            Ok(())
        }
    }
}

async fn cmd_demo(config: &Config, workers: usize, items: usize) -> anyhow::Result<()> {
    let (main_loop, join) = MainLoop::spawn(&config.main_thread)?;
    let executed = Arc::new(AtomicUsize::new(0));
    let sink = TracingSink::default();

    info!(workers, items, thread = %config.main_thread, "demo starting");

    let mut tasks = Vec::with_capacity(workers);
    for worker in 0..workers {
        let main_loop = main_loop.clone();
        let executed = Arc::clone(&executed);
        tasks.push(tokio::task::spawn_blocking(move || {
            let origin = Origin { worker };
            for item in 0..items {
                let executed = Arc::clone(&executed);
                main_loop.run_async(move || {
                    executed.fetch_add(1, Ordering::Relaxed);
                    emit!(&sink, &origin, "async item ", item, " from worker ", worker);
                });
            }
            // FIFO: everything this worker queued above has run once this returns.
            main_loop.run_sync(move || {
                emit!(&sink, &origin, "worker ", worker, " drained ", items, " items");
            })
        }));
    }

    for task in tasks {
        task.await??;
    }

    let expected = workers * items;
    main_loop
        .run_sync_async(move || {
            let total = executed.load(Ordering::Relaxed);
            emit!(&sink, &"demo", "executed ", total, "/", expected, " async items");
        })
        .await?;

    main_loop.shutdown();
    tokio::task::spawn_blocking(move || join.join())
        .await?
        .map_err(|_| anyhow::anyhow!("main loop thread panicked"))?;

    Ok(())
}

fn cmd_say(args: Vec<String>, level: Level) {
    args.iter()
        .fold(Message::new(), |msg, arg| msg.push(arg))
        .emit(&"cli", &TracingSink::new(level));
}

fn cmd_config(config: &Config) {
    println!("Main thread:  {}", config.main_thread);
    println!("Log level:    {}", config.log_level);
    println!(
        "OTLP:         {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
}
