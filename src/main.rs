use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mailsweep::types::SuggestedAction;
use mailsweep::{Config, Engine};

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailsweep=debug"));

    // Try to create a log file in the data directory
    let log_file = Config::data_dir()
        .ok()
        .and_then(|dir| std::fs::create_dir_all(&dir).ok().map(|_| dir))
        .map(|dir| dir.join("mailsweep.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"mailsweep - Inbox sync and cleanup suggestions

Usage: mailsweep <command>

Commands:
    poll                                  Sync all users and generate suggestions on an interval
    sync <user>                           Sync one user now
    suggest <user>                        Generate cleanup suggestions for one user
    pending <user>                        List pending suggestions
    execute <user> <email_id> <action>    Apply archive | trash | delete_permanently
    add-user <user_id> <email>            Register a user
    help                                  Show this help message

Configuration file: ~/.config/mailsweep/config.toml (override with MAILSWEEP_CONFIG)
"#
    );
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing argument <{}>", name))
}

async fn build_engine() -> Result<(Config, Engine)> {
    let config = Config::load()?;
    config.validate()?;
    let engine = Engine::from_config(&config).await?;
    Ok((config, engine))
}

async fn run_poll(config: &Config, engine: &Engine) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(config.sync.interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    println!(
        "Polling every {}s. Press Ctrl-C to stop.",
        config.sync.interval_secs
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                poll_once(engine).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                return Ok(());
            }
        }
    }
}

async fn poll_once(engine: &Engine) {
    match engine.poll_all().await {
        Ok(outcomes) => {
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            tracing::info!(users = outcomes.len(), failed, "Poll cycle synced");
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not list users for sync");
            return;
        }
    }

    match engine.generate_all().await {
        Ok(outcomes) => {
            let created: usize = outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().ok())
                .map(|r| r.suggestions.len())
                .sum();
            tracing::info!(users = outcomes.len(), suggestions = created, "Poll cycle suggested");
        }
        Err(e) => tracing::error!(error = %e, "Could not list users for suggestions"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None | Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("poll") => {
            setup_logging();
            let (config, engine) = build_engine().await?;
            run_poll(&config, &engine).await
        }
        Some("sync") => {
            setup_logging();
            let user_id = required(&args, 2, "user")?;
            let (_, engine) = build_engine().await?;
            let report = engine.sync_user_on_demand(user_id).await?;
            println!(
                "Synced {}: {} messages, {} events, {} errors",
                report.user_id,
                report.messages_fetched,
                report.events_fetched,
                report.errors.len()
            );
            for error in &report.errors {
                println!("  {}", error);
            }
            Ok(())
        }
        Some("suggest") => {
            setup_logging();
            let user_id = required(&args, 2, "user")?;
            let (_, engine) = build_engine().await?;
            let report = engine.generate_suggestions(user_id).await?;
            for s in &report.suggestions {
                println!("{:>6}  {:<18}  {}  ({})", s.email_id, s.suggested_action, s.subject, s.reason);
            }
            for error in &report.errors {
                println!("  error: {}", error);
            }
            Ok(())
        }
        Some("pending") => {
            setup_logging();
            let user_id = required(&args, 2, "user")?;
            let (_, engine) = build_engine().await?;
            let pending = engine.list_pending_suggestions(user_id).await?;
            if pending.is_empty() {
                println!("No pending suggestions.");
            }
            for s in &pending {
                println!(
                    "{:>6}  {:<18}  {}  {}  ({})",
                    s.email_id, s.suggested_action, s.from, s.subject, s.reason
                );
            }
            Ok(())
        }
        Some("execute") => {
            setup_logging();
            let user_id = required(&args, 2, "user")?;
            let email_id: i64 = required(&args, 3, "email_id")?
                .parse()
                .context("email_id must be an integer")?;
            let action: SuggestedAction = required(&args, 4, "action")?.parse()?;
            let (_, engine) = build_engine().await?;
            engine.execute_suggestion(user_id, email_id, action).await?;
            println!("{} applied to email {}", action, email_id);
            Ok(())
        }
        Some("add-user") => {
            setup_logging();
            let user_id = required(&args, 2, "user_id")?;
            let email = required(&args, 3, "email")?;
            let (_, engine) = build_engine().await?;
            engine.register_user(user_id, email).await?;
            println!("Registered {} <{}>", user_id, email);
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }
}
