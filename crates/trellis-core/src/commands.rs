mod modifiers;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::board::{BoardController, DeleteOutcome, DropOutcome, EditOutcome};
use crate::cli::Invocation;
use crate::config::Config;
use crate::connectivity::{ConnectivityFlag, ConnectivityProbe};
use crate::render::Renderer;
use crate::replay::ReplayWorker;
use crate::sync::{LoadSource, QueueReason, SubmitOutcome, SyncCoordinator};
use crate::task::{Priority, Status, Task, TaskId};
use modifiers::{apply_mods, parse_mods, parse_title_and_mods};

const DEFAULT_REPLAY_INTERVAL_SECS: u64 = 30;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "board", "add", "edit", "move", "delete", "show", "sync", "pending", "watch", "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything a command needs, wired once per invocation.
pub struct App {
    pub cfg: Config,
    pub coordinator: Arc<SyncCoordinator>,
    pub flag: Arc<ConnectivityFlag>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub renderer: Renderer,
}

#[instrument(skip(app, inv))]
pub async fn dispatch(app: &mut App, inv: Invocation) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "board" => cmd_board(app).await,
        "add" => cmd_add(app, &inv.command_args).await,
        "edit" => cmd_edit(app, &inv.command_args).await,
        "move" => cmd_move(app, &inv.command_args).await,
        "delete" => cmd_delete(app, &inv.command_args).await,
        "show" => cmd_show(app, &inv.command_args).await,
        "sync" => cmd_sync(app).await,
        "pending" => cmd_pending(app),
        "watch" => cmd_watch(app).await,
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

async fn loaded_controller(app: &App) -> BoardController {
    let mut controller = BoardController::new(app.coordinator.clone());
    if controller.load().await == LoadSource::LocalStore {
        eprintln!("Offline: showing tasks from the local store.");
    }
    controller
}

fn parse_id(args: &[String], usage: &str) -> anyhow::Result<TaskId> {
    args.first()
        .map(|token| TaskId::parse(token))
        .ok_or_else(|| anyhow!("usage: {usage}"))
}

fn report_submit(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Created(task) => println!("Created task {}.", task.id),
        SubmitOutcome::Updated(task) => println!("Updated task {}.", task.id),
        SubmitOutcome::Queued { task, reason } => {
            let why = match reason {
                QueueReason::Offline => "offline",
                QueueReason::NetworkFailure => "server unreachable",
            };
            println!("Saved task {} locally for later sync ({why}).", task.id);
        }
    }
}

#[instrument(skip(app))]
async fn cmd_board(app: &mut App) -> anyhow::Result<()> {
    let controller = loaded_controller(app).await;
    app.renderer.print_board(controller.board())
}

#[instrument(skip(app, args))]
async fn cmd_add(app: &mut App, args: &[String]) -> anyhow::Result<()> {
    info!("command add");
    let (title, mods) = parse_title_and_mods(args)?;

    let mut draft = Task::new_local(title, Priority::Low, Status::Todo);
    apply_mods(&mut draft, &mods);

    let mut controller = BoardController::new(app.coordinator.clone());
    let outcome = controller
        .create(draft.title, draft.description, draft.priority, draft.status)
        .await?;
    report_submit(&outcome);
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_edit(app: &mut App, args: &[String]) -> anyhow::Result<()> {
    info!("command edit");
    let id = parse_id(args, "trellis edit <id> [title:..] [desc:..] [pri:..] [status:..]")?;
    let mods = parse_mods(&args[1..])?;

    let mut controller = loaded_controller(app).await;
    let session = controller
        .open_edit(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    let mut task = Task::from(session);
    apply_mods(&mut task, &mods);

    match controller.commit_edit(task.into()).await {
        EditOutcome::Discarded => {
            debug!("edit discarded");
        }
        EditOutcome::Applied { moved, sync } => {
            if moved {
                debug!("card relocated");
            }
            report_submit(&sync);
        }
    }
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_move(app: &mut App, args: &[String]) -> anyhow::Result<()> {
    info!("command move");
    let id = parse_id(args, "trellis move <id> <status>")?;
    let target: Status = args
        .get(1)
        .ok_or_else(|| anyhow!("usage: trellis move <id> <status>"))?
        .parse()?;

    let mut controller = loaded_controller(app).await;
    let session = controller
        .begin_drag(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    match controller.drop_on(session, target).await {
        DropOutcome::Unchanged => println!("Task {id} is already in {}.", target.label()),
        DropOutcome::Moved { sync, .. } => report_submit(&sync),
    }
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_delete(app: &mut App, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");
    let id = parse_id(args, "trellis delete <id> [--yes]")?;
    let assume_yes = args[1..].iter().any(|arg| arg == "--yes" || arg == "-y");

    let mut controller = loaded_controller(app).await;
    let confirmed = assume_yes || confirm("Are you sure you want to delete this task?")?;

    match controller.delete(&id, confirmed).await? {
        DeleteOutcome::NotConfirmed => println!("Delete cancelled."),
        DeleteOutcome::Deleted => println!("Deleted task {id}."),
    }
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_show(app: &mut App, args: &[String]) -> anyhow::Result<()> {
    let id = parse_id(args, "trellis show <id>")?;
    let controller = loaded_controller(app).await;
    let task = controller
        .board()
        .task(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    app.renderer.print_task_info(&task)
}

#[instrument(skip(app))]
async fn cmd_sync(app: &mut App) -> anyhow::Result<()> {
    info!("command sync");
    let report = app.coordinator.flush_pending().await?;
    if report.skipped_offline {
        println!("Offline: {} task(s) still pending.", report.remaining);
        return Ok(());
    }

    for (queued, task) in &report.synced {
        if queued == &task.id {
            println!("Synced task {queued}.");
        } else {
            println!("Synced task {queued} as {}.", task.id);
        }
    }
    for (task, reason) in &report.rejected {
        println!("Dropped task {} ({}): {reason}", task.id, task.title);
    }
    if report.remaining > 0 {
        println!("{} task(s) still pending.", report.remaining);
    }
    Ok(())
}

fn cmd_pending(app: &mut App) -> anyhow::Result<()> {
    let pending = app.coordinator.store().list_pending()?;
    app.renderer.print_pending(&pending)
}

#[instrument(skip(app))]
async fn cmd_watch(app: &mut App) -> anyhow::Result<()> {
    info!("command watch");
    let secs = app
        .cfg
        .get_u64("replay.interval")?
        .unwrap_or(DEFAULT_REPLAY_INTERVAL_SECS)
        .max(1);

    let worker = ReplayWorker::new(
        app.coordinator.clone(),
        app.flag.clone(),
        app.probe.clone(),
        Duration::from_secs(secs),
    );

    worker
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("trellis <command> [args]");
    println!();
    println!("  board                         show all columns");
    println!("  add <title> [mods]            create a task");
    println!("  edit <id> [mods]              edit a task; an empty title discards the edit");
    println!("  move <id> <status>            move a task to another column");
    println!("  delete <id> [--yes]           delete a task (requires connectivity)");
    println!("  show <id>                     show one task");
    println!("  sync                          replay tasks saved while offline");
    println!("  pending                       list tasks waiting to be synced");
    println!("  watch                         replay pending tasks whenever the server is back");
    println!();
    println!("mods: title:<text> desc:<text> pri:<low|medium|high|urgent>");
    println!("      status:<todo|progress|review|complete>");
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let mut out = io::stdout().lock();
    write!(out, "{prompt} (yes/no) ")?;
    out.flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed reading confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
