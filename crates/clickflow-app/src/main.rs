//! Clickflow application binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the SQLite key-value store and the scenario store
//! 3. Build the engine with headless adapters and, when configured, the
//!    Telegram sender and notifier
//! 4. Dispatch the requested subcommand

mod adapter;
mod cli;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use uuid::Uuid;

use clickflow_action::{ScenarioStore, TelegramSender};
use clickflow_core::config::ClickflowConfig;
use clickflow_core::events::{event_channel, DomainEvent};
use clickflow_core::types::ScenarioId;
use clickflow_engine::{Adapters, RunOutcome, ScenarioEngine, StartOutcome};
use clickflow_storage::{Database, KeyValueStore, SqliteKvStore};
use clickflow_telegram::{
    test_connection, BotSender, MessageHistory, Notifier, TelegramBridge, TelegramSettings,
};

use adapter::{DryRunAutomation, MemoryClipboard};
use cli::{CliArgs, Command, TelegramCommand};

type AppResult<T> = Result<T, Box<dyn Error>>;

struct App {
    config: ClickflowConfig,
    kv: Arc<dyn KeyValueStore>,
    store: Arc<ScenarioStore>,
}

impl App {
    fn open(config: ClickflowConfig) -> AppResult<Self> {
        let data_dir = config.general.data_path();
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
            return Err(e.into());
        }
        let db_path = data_dir.join("clickflow.db");
        let db = Database::new(&db_path)?;
        tracing::debug!(path = %db_path.display(), "SQLite database opened");

        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::new(Arc::new(db)));
        let store = Arc::new(ScenarioStore::open(
            Arc::clone(&kv),
            config.engine.default_action_delay_ms,
        )?);
        Ok(Self { config, kv, store })
    }

    fn telegram_settings(&self) -> AppResult<TelegramSettings> {
        Ok(TelegramSettings::load(self.kv.as_ref())?)
    }

    /// Engine with headless adapters. A notifier is spawned when Telegram
    /// settings passed a connection test.
    fn engine(&self, settings: &TelegramSettings) -> AppResult<ScenarioEngine> {
        let sender: Option<Arc<dyn TelegramSender>> = if settings.has_token() {
            let client = settings.client(&self.config.telegram)?;
            Some(Arc::new(BotSender::new(client, settings.chat_id())))
        } else {
            None
        };

        let adapters = Adapters {
            automation: Arc::new(DryRunAutomation),
            clipboard: Arc::new(MemoryClipboard::default()),
            telegram: sender.clone(),
            screenshots_dir: self.config.general.screenshots_path(),
        };
        let engine = ScenarioEngine::new(
            Arc::clone(&self.store),
            adapters,
            event_channel(),
            self.config.engine.clone(),
        );

        if let Some(notifier) = sender.and_then(|s| Notifier::from_settings(settings, s)) {
            let events = engine.subscribe();
            tokio::spawn(async move { notifier.run(events).await });
            tracing::info!("Telegram notifications enabled");
        }
        Ok(engine)
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = ClickflowConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    let app = App::open(config)?;

    match args.command {
        Command::List => list(&app)?,
        Command::Show { id } => {
            let scenario = app.store.get(id)?;
            println!("{}", serde_json::to_string_pretty(&scenario)?);
        }
        Command::New { name } => {
            let scenario = app.store.create(&name)?;
            println!("Created scenario {} ({})", scenario.id, scenario.name);
        }
        Command::Duplicate { id } => {
            let copy = app.store.duplicate(id)?;
            println!("Created scenario {} ({})", copy.id, copy.name);
        }
        Command::Delete { id } => {
            app.store.delete(id)?;
            println!("Deleted scenario {id}");
        }
        Command::Run { id } => run(&app, id, false).await?,
        Command::QuickRun { id } => run(&app, id, true).await?,
        Command::Daemon { arm } => daemon(&app, arm).await?,
        Command::Telegram { command } => telegram(&app, command).await?,
    }
    Ok(())
}

fn list(app: &App) -> AppResult<()> {
    for s in app.store.list()? {
        let mut flags = Vec::new();
        if s.loop_forever {
            flags.push("loop".to_string());
        } else if !s.trigger_by_telegram {
            flags.push(format!("x{}", s.repeat_count));
        }
        if s.trigger_by_telegram {
            flags.push("telegram".to_string());
        }
        println!(
            "{:>4}  {} {:<32} {:>3} actions  [{}]",
            s.id,
            s.icon,
            s.name,
            s.actions.len(),
            flags.join(", ")
        );
    }
    Ok(())
}

/// Start a scenario and follow its events until it ends.
async fn run(app: &App, id: ScenarioId, quick: bool) -> AppResult<()> {
    let engine = app.engine(&app.telegram_settings()?)?;
    engine.enable_automation();
    let mut events = engine.subscribe();

    let outcome = if quick {
        engine.quick_run(id).await?
    } else {
        engine.start(id, false)?
    };
    let run_id = match outcome {
        StartOutcome::Started { run_id } => run_id,
        StartOutcome::Armed | StartOutcome::AlreadyArmed => {
            engine.stop().await;
            println!("Scenario {id} runs on Telegram messages; use `clickflow daemon --arm {id}`");
            return Ok(());
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    print_progress(&event);
                    if event.is_run_terminal() && event_run_id(&event) == Some(run_id) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("Interrupted, stopping scenario");
                engine.stop().await;
            }
        }
    }

    match engine.snapshot().last_outcome {
        Some(RunOutcome::Failed { index, action, error }) => {
            Err(format!("action {} ({action}) failed: {error}", index + 1).into())
        }
        Some(RunOutcome::Stopped { reason }) => {
            println!("Stopped ({reason})");
            Ok(())
        }
        _ => {
            println!("Completed");
            Ok(())
        }
    }
}

fn event_run_id(event: &DomainEvent) -> Option<Uuid> {
    match event {
        DomainEvent::ScenarioCompleted { run_id, .. } | DomainEvent::ScenarioStopped { run_id, .. } => {
            Some(*run_id)
        }
        _ => None,
    }
}

fn print_progress(event: &DomainEvent) {
    match event {
        DomainEvent::ScenarioStarted { name, .. } => println!("Running {name}"),
        DomainEvent::ActionStarted {
            index, total, name, repeat_iteration, total_repeats, ..
        } => println!("  [{repeat_iteration}/{total_repeats}] {}/{total} {name}", index + 1),
        DomainEvent::ActionSkipped { name, reason, .. } => println!("  skipped {name}: {reason}"),
        DomainEvent::WaitFinished { matched: false, .. } => println!("  wait timed out"),
        DomainEvent::LoopCompleted { loop_iteration, .. } => println!("  loop {loop_iteration} done"),
        _ => {}
    }
}

/// Run the Telegram bridge until Ctrl-C, optionally arming a scenario.
async fn daemon(app: &App, arm: Option<ScenarioId>) -> AppResult<()> {
    let settings = app.telegram_settings()?;
    let engine = app.engine(&settings)?;
    engine.enable_automation();

    let bridge = if settings.has_token() {
        let history = Arc::new(MessageHistory::open(
            Arc::clone(&app.kv),
            app.config.telegram.history_limit,
        )?);
        let bridge = Arc::new(TelegramBridge::new(
            Arc::new(settings.client(&app.config.telegram)?),
            Arc::new(engine.clone()),
            history,
            settings.chat_filter(),
            app.config.telegram.clone(),
        ));
        let runner = Arc::clone(&bridge);
        tokio::spawn(async move { runner.run().await });
        Some(bridge)
    } else {
        tracing::warn!("Telegram is not configured; no messages will be received");
        None
    };

    if let Some(id) = arm {
        match engine.start(id, false)? {
            StartOutcome::Armed | StartOutcome::AlreadyArmed => {
                tracing::info!(scenario = %id, "Scenario armed, waiting for messages")
            }
            StartOutcome::Started { run_id } => {
                tracing::info!(scenario = %id, %run_id, "Scenario is not Telegram-triggered, running once")
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    if let Some(bridge) = bridge {
        bridge.shutdown();
    }
    engine.stop().await;
    Ok(())
}

async fn telegram(app: &App, command: TelegramCommand) -> AppResult<()> {
    match command {
        TelegramCommand::Configure { token, chat_id, bot_name } => {
            let mut settings = app.telegram_settings()?;
            settings.set_credentials(&token, &chat_id);
            if let Some(name) = bot_name {
                settings.bot_name = name;
            }
            settings.save(app.kv.as_ref())?;
            println!("Saved settings for {}. Run `clickflow telegram test` to connect.", settings.bot_name);
        }
        TelegramCommand::Test => {
            let mut settings = app.telegram_settings()?;
            let result = test_connection(&mut settings, &app.config.telegram).await;
            settings.save(app.kv.as_ref())?;
            let info = result?;
            match info.username {
                Some(username) => println!("Connected as {} (@{username})", info.bot_name),
                None => println!("Connected as {}", info.bot_name),
            }
        }
        TelegramCommand::Messages { clear } => {
            let history = MessageHistory::open(Arc::clone(&app.kv), app.config.telegram.history_limit)?;
            for m in history.list() {
                let marker = if m.unread { "*" } else { " " };
                let time = m.time.to_datetime().format("%Y-%m-%d %H:%M:%S");
                println!("{marker} {time}  {} {}  [{}] {}", m.sender, m.username, m.kind, m.content);
            }
            if clear {
                history.clear()?;
            } else {
                history.mark_all_read()?;
            }
        }
    }
    Ok(())
}
