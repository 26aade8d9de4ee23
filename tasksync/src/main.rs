//! `tasksync` — runs a simulated task board session.
//!
//! A seeded board is edited by a simulated user through optimistic updates
//! while a simulated remote actor changes tasks in the background. Every
//! notification is printed as it arrives, and the final board is dumped as
//! JSON when the run ends.
//!
//! ```bash
//! # Reproducible 30 second run with no backing call failures
//! cargo run --bin tasksync -- --seed 7 --duration-secs 30 --failure-rate 0
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing_appender::non_blocking::WorkerGuard;

use tasksync::api::SimulatedApi;
use tasksync::config::{CliArgs, SyncConfig};
use tasksync::notify::ChannelNotifier;
use tasksync::sync::SyncOrchestrator;
use tasksync::tasks::{InMemoryTaskStore, TaskBoard, TaskStore};
use tasksync_proto::task::{Task, TaskPatch, TaskPriority, TaskStatus, now_ms};

type Store = InMemoryTaskStore;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match SyncConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}");
            SyncConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(seed = ?config.seed, duration_secs = config.duration.as_secs(), "tasksync starting");

    let store = Arc::new(InMemoryTaskStore::with_tasks(seed_tasks()));
    let board = TaskBoard::new(Arc::clone(&store), config.history_capacity);
    let api = match config.seed {
        Some(seed) => SimulatedApi::seeded(config.api.clone(), seed),
        None => SimulatedApi::new(config.api.clone()),
    };

    let (notifier, mut notifications) = ChannelNotifier::new(config.notification_buffer);
    let sync = SyncOrchestrator::new(Arc::clone(&store), notifier);
    sync.set_conflict_callback(|task_id, external, local| {
        tracing::info!(
            %task_id,
            external = ?external.content_fields(),
            local = ?local.content_fields(),
            "local edit overridden"
        );
    });

    let printer = tokio::spawn(async move {
        while let Some(note) = notifications.recv().await {
            println!("[{}] {:<7} {}", format_timestamp_ms(now_ms()), note.level, note.text);
        }
    });

    sync.start(config.generator.clone(), config.seed);
    println!(
        "[{}] session started with {} tasks",
        format_timestamp_ms(now_ms()),
        store.len()
    );

    let mut rng = config
        .seed
        .map_or_else(StdRng::from_os_rng, |seed| StdRng::seed_from_u64(seed.wrapping_add(1)));
    let user = simulate_user(&board, &sync, &api, config.user_edit_interval, &mut rng);
    if tokio::time::timeout(config.duration, user).await.is_err() {
        tracing::debug!("demo duration elapsed");
    }

    sync.stop();
    drop(sync);
    if let Err(e) = printer.await {
        tracing::warn!(%e, "notification printer ended abnormally");
    }

    let undoable = board.with_history(|h| h.past().len());
    println!("\n{undoable} undoable actions recorded; final board:");
    let snapshot = serde_json::to_string_pretty(&store.list_tasks()).map_err(io::Error::other)?;
    println!("{snapshot}");

    tracing::info!("tasksync exiting");
    Ok(())
}

/// Initialize file-based logging.
///
/// Logs go to a file so they don't interleave with the printed session.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasksync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// The starting board: two tasks per column.
fn seed_tasks() -> Vec<Task> {
    vec![
        Task::new("Draft release notes", TaskStatus::Todo, 0)
            .with_priority(TaskPriority::High)
            .with_tag("docs"),
        Task::new("Triage open bugs", TaskStatus::Todo, 1).with_assignee("Sarah Chen"),
        Task::new("Migrate settings page", TaskStatus::InProgress, 0)
            .with_description("Move the legacy form onto the new layout")
            .with_assignee("Marcus Webb"),
        Task::new("Load test sync endpoint", TaskStatus::InProgress, 1)
            .with_priority(TaskPriority::Low),
        Task::new("Set up CI cache", TaskStatus::Done, 0).with_tag("infra"),
        Task::new("Write onboarding guide", TaskStatus::Done, 1)
            .with_assignee("Priya Patel")
            .with_tag("docs"),
    ]
}

/// Acts as the local user until cancelled: edits a priority, moves a card,
/// or undoes the last action, one at a time.
async fn simulate_user(
    board: &TaskBoard<Store>,
    sync: &SyncOrchestrator<Store, ChannelNotifier>,
    api: &SimulatedApi,
    interval: Duration,
    rng: &mut StdRng,
) {
    loop {
        tokio::time::sleep(interval).await;
        let tasks = board.store().list_tasks();
        let Some(task) = tasks.choose(rng).cloned() else {
            continue;
        };
        let at = format_timestamp_ms(now_ms());

        match rng.random_range(0..10) {
            0..5 => {
                let options: Vec<TaskPriority> = TaskPriority::ALL
                    .into_iter()
                    .filter(|p| *p != task.priority)
                    .collect();
                let Some(&priority) = options.choose(rng) else {
                    continue;
                };
                let patch = TaskPatch::new().priority(priority);
                sync.start_editing(task.id.clone(), patch.clone());
                println!("[{at}] you     set \"{}\" to {} priority", task.title, priority.label());
                match board.update_optimistic(api, &task.id, &patch).await {
                    Ok(Some(_)) => println!("[{}] you     priority change confirmed", format_timestamp_ms(now_ms())),
                    Ok(None) => println!("[{}] you     priority change rejected", format_timestamp_ms(now_ms())),
                    Err(e) => tracing::warn!(%e, "local update failed"),
                }
                sync.stop_editing();
            }
            5..8 => {
                let options: Vec<TaskStatus> = TaskStatus::ALL
                    .into_iter()
                    .filter(|s| *s != task.status)
                    .collect();
                let Some(&status) = options.choose(rng) else {
                    continue;
                };
                let index = rng.random_range(0..=2);
                println!("[{at}] you     moved \"{}\" to {}", task.title, status.label());
                match board.move_optimistic(api, &task.id, status, index).await {
                    Ok(Some(_)) => println!("[{}] you     move confirmed", format_timestamp_ms(now_ms())),
                    Ok(None) => println!("[{}] you     move rejected", format_timestamp_ms(now_ms())),
                    Err(e) => tracing::warn!(%e, "local move failed"),
                }
            }
            _ => match board.undo() {
                Ok(Some(action)) => println!("[{at}] you     undid: {}", action.description),
                Ok(None) => {}
                Err(e) => println!("[{at}] you     could not undo: {e}"),
            },
        }
    }
}

/// Format a millisecond timestamp as local `HH:MM:SS`.
fn format_timestamp_ms(ms: u64) -> String {
    use chrono::{Local, TimeZone};
    let secs = (ms / 1000).cast_signed();
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
        _ => "??:??:??".to_string(),
    }
}
