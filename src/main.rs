use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{spawn_sweeper, ManualClock};
use turnstile::{Action, AdmissionGuard, Decision, RateLimiter, Rejection};

/// Admission control for donation-site admin endpoints.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective policy for each action
    Policies,

    /// Replay a burst of calls against a simulated clock
    Simulate {
        /// Action to exercise, e.g. log_donation
        #[arg(long)]
        action: Action,

        /// Caller identity
        #[arg(long, default_value = "simulated-caller")]
        subject: String,

        /// Number of calls to make
        #[arg(long, default_value_t = 10)]
        calls: u32,

        /// Simulated milliseconds between calls
        #[arg(long, default_value_t = 0)]
        spacing_ms: u64,

        /// Emit one JSON object per call
        #[arg(long)]
        json: bool,
    },

    /// Answer `<action> <subject>` lines read from stdin
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TurnstileConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Turnstile");

    let policies = config.policy_table()?;

    match cli.command {
        Command::Policies => {
            for (action, policy) in policies.iter() {
                println!(
                    "{:<18} limit={:<5} window_ms={}",
                    action,
                    policy.limit,
                    policy.window.as_millis()
                );
            }
        }
        Command::Simulate {
            action,
            subject,
            calls,
            spacing_ms,
            json,
        } => {
            let clock = ManualClock::new(0);
            let limiter = RateLimiter::with_clock(clock.clone())
                .with_max_entries(config.limiter.max_entries);
            let guard = AdmissionGuard::new(Arc::new(limiter), policies);

            for call in 0..u64::from(calls) {
                let at_ms = call * spacing_ms;
                clock.set(at_ms);
                let outcome = guard.admit(action, &subject);

                if json {
                    println!("{}", outcome_json(call + 1, at_ms, &outcome));
                } else {
                    println!("#{:<4} t={}ms {}", call + 1, at_ms, render(&outcome));
                }
            }
        }
        Command::Check => {
            let limiter = Arc::new(config.build_limiter());
            let sweeper = spawn_sweeper(limiter.clone(), config.sweep_interval());
            let guard = AdmissionGuard::new(limiter, policies);

            info!(
                max_entries = config.limiter.max_entries,
                "Reading admission checks from stdin"
            );

            tokio::select! {
                _ = answer_lines(&guard, stdin_lines()) => {
                    info!("Input closed");
                }
                _ = shutdown_signal() => {}
            }

            sweeper.shutdown().await;
        }
    }

    info!("Turnstile stopped");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_thread_ids(true).init(),
    }
}

/// Forward stdin lines from a plain thread, so a pending read never holds
/// up runtime shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    rx
}

async fn answer_lines(guard: &AdmissionGuard, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        let mut parts = line.split_whitespace();
        let Some(action) = parts.next() else {
            continue;
        };
        let subject = parts.next().unwrap_or("");

        match action.parse::<Action>() {
            Ok(action) => println!("{}", render(&guard.admit(action, subject))),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed check");
                println!("error {}", e);
            }
        }
    }
}

fn render(outcome: &Result<Decision, Rejection>) -> String {
    match outcome {
        Ok(decision) => format!("allow remaining={}", decision.remaining),
        Err(rejection) => match rejection.retry_after() {
            Some(retry_after) => format!(
                "deny status={} retry_after_ms={}",
                rejection.http_status(),
                retry_after.as_millis()
            ),
            None => format!("reject status={} {}", rejection.http_status(), rejection),
        },
    }
}

fn outcome_json(
    call: u64,
    at_ms: u64,
    outcome: &Result<Decision, Rejection>,
) -> serde_json::Value {
    match outcome {
        Ok(decision) => serde_json::json!({
            "call": call,
            "at_ms": at_ms,
            "allowed": true,
            "remaining": decision.remaining,
            "resets_in_ms": decision.resets_in.as_millis() as u64,
        }),
        Err(rejection) => serde_json::json!({
            "call": call,
            "at_ms": at_ms,
            "allowed": false,
            "remaining": 0,
            "status": rejection.http_status(),
            "retry_after_ms": rejection.retry_after().map(|d| d.as_millis() as u64),
        }),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
