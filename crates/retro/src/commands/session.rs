//! Retro session commands.
//!
//! Admin-only actions (extend, end, confirm) check the acting user against
//! the session admin before calling into the lifecycle.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Result};
use chrono::Utc;
use colored::Colorize;
use futures::StreamExt;
use retro_core::session::{parse_duration_minutes, ExpiryWorker, SessionLifecycle};
use retro_core::{EmbeddedNote, Resource, RetroConfig, Session, SessionPhase};
use tracing::warn;

use super::{format_time, short_id};
use crate::cli::{Identity, SessionAction, SessionCommand};
use crate::context::Context;
use crate::error::CliError;

/// How often `watch` re-reads the session to pick up writes from other processes.
const WATCH_POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);

pub async fn execute(cmd: SessionCommand, identity: &Identity, config: &RetroConfig) -> Result<()> {
    let ctx = Context::open(config, identity)?;

    match cmd.action {
        SessionAction::Start { title, minutes } => {
            let minutes = match minutes {
                Some(input) => parse_duration_minutes(&input)?,
                None => config.session.default_duration_minutes,
            };
            start(&ctx, &title, minutes).await
        }
        SessionAction::Extend { session_id, minutes } => {
            let minutes = parse_duration_minutes(&minutes)?;
            extend(&ctx, &session_id, minutes).await
        }
        SessionAction::Add {
            session_id,
            feedback,
            comment,
        } => add(&ctx, &session_id, feedback.into(), &comment).await,
        SessionAction::Remove { session_id, note_id } => remove(&ctx, &session_id, &note_id).await,
        SessionAction::End { session_id } => end(&ctx, &session_id).await,
        SessionAction::Confirm { session_id } => confirm(&ctx, &session_id).await,
        SessionAction::Show { session_id, json } => show(&ctx, &session_id, json).await,
        SessionAction::Status => status(&ctx).await,
        SessionAction::Watch { session_id } => watch(ctx, session_id).await,
    }
}

async fn find_session(ctx: &Context, session_id: &str) -> Result<Session> {
    ctx.repo
        .sessions()
        .get_session(session_id)
        .await?
        .ok_or_else(|| CliError::SessionNotFound(session_id.to_string()).into())
}

async fn require_admin(ctx: &Context, session_id: &str, action: &'static str) -> Result<Session> {
    let session = find_session(ctx, session_id).await?;
    if !session.is_admin(ctx.user()?) {
        return Err(CliError::NotAdmin {
            admin: session.admin,
            action,
        }
        .into());
    }
    Ok(session)
}

async fn start(ctx: &Context, title: &str, minutes: u32) -> Result<()> {
    let user = ctx.user()?;

    let active = ctx.repo.sessions().active_sessions().await?;
    if let Some(existing) = active.first() {
        warn!(session_id = %existing.id, "Another retro session is still active");
        println!(
            "{} Session {} is still active",
            "⚠".yellow(),
            short_id(&existing.id)
        );
    }

    let id = ctx.repo.sessions().create_session(user, Vec::new(), title, minutes).await?;

    println!("{} Retro session started", "✓".green());
    println!("  ID: {}", id);
    println!("  Title: {}", title.bold());
    println!("  Duration: {} min", minutes);
    println!(
        "  {}",
        "Run `retro session watch` to follow the board and apply expiry".dimmed()
    );
    Ok(())
}

async fn extend(ctx: &Context, session_id: &str, minutes: u32) -> Result<()> {
    require_admin(ctx, session_id, "extend the session").await?;
    let end_time = ctx.repo.sessions().extend_session(session_id, minutes).await?;

    println!("{} Session extended by {} min", "✓".green(), minutes);
    println!("  Ends: {}", format_time(end_time));
    Ok(())
}

async fn add(ctx: &Context, session_id: &str, feedback: retro_core::Feedback, comment: &str) -> Result<()> {
    let session = find_session(ctx, session_id).await?;
    if !session.is_live() {
        bail!("Session {} is no longer accepting notes ({})", short_id(session_id), session.phase);
    }

    let user = ctx.user()?;
    let username = ctx.username().await?;
    let note = EmbeddedNote::feedback(user, &username, &session.title, feedback, comment, Utc::now())?;
    let note = ctx.repo.sessions().add_note_to_session(session_id, note).await?;

    println!("{} Added to the board", "✓".green());
    println!("  Note: {}", note.id);
    Ok(())
}

async fn remove(ctx: &Context, session_id: &str, note_id: &str) -> Result<()> {
    let session = find_session(ctx, session_id).await?;
    let note = session
        .notes
        .iter()
        .find(|n| n.id == note_id)
        .ok_or_else(|| CliError::NoteNotOnBoard {
            session_id: session_id.to_string(),
            note_id: note_id.to_string(),
        })?;

    let user = ctx.user()?;
    if !session.is_admin(user) && note.user_id != user {
        return Err(CliError::NotAdmin {
            admin: session.admin.clone(),
            action: "remove other people's notes",
        }
        .into());
    }

    ctx.repo.sessions().remove_note_from_session(session_id, note).await?;
    println!("{} Note {} removed from the board", "✓".green(), short_id(note_id));
    Ok(())
}

async fn end(ctx: &Context, session_id: &str) -> Result<()> {
    require_admin(ctx, session_id, "end the session").await?;
    ctx.repo.sessions().end_session(session_id).await?;

    println!("{} Session ended, waiting for confirmation", "✓".green());
    Ok(())
}

async fn confirm(ctx: &Context, session_id: &str) -> Result<()> {
    require_admin(ctx, session_id, "confirm the session").await?;
    let promoted = ctx.repo.sessions().confirm_session(session_id).await?;

    println!("{} Session confirmed", "✓".green());
    println!("  Notes saved: {}", promoted);
    Ok(())
}

async fn show(ctx: &Context, session_id: &str, json: bool) -> Result<()> {
    let session = find_session(ctx, session_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        print_board(ctx.repo.sessions(), &session);
    }
    Ok(())
}

async fn status(ctx: &Context) -> Result<()> {
    let active = ctx.repo.sessions().active_sessions().await?;
    if active.is_empty() {
        println!("{}", "No active retro session".yellow());
        return Ok(());
    }
    for session in &active {
        println!(
            "{} {} {} {}",
            "●".green(),
            short_id(&session.id),
            session.title.bold(),
            phase_label(session.phase)
        );
        if session.is_live() {
            println!("  Remaining: {}", ctx.repo.sessions().countdown(session));
        }
    }
    Ok(())
}

/// Follow a session until it is confirmed, deleted or interrupted.
async fn watch(mut ctx: Context, session_id: Option<String>) -> Result<()> {
    let sessions = ctx.repo.sessions_handle();
    let session_id = match session_id {
        Some(id) => id,
        None => sessions
            .active_sessions()
            .await?
            .into_iter()
            .next()
            .map(|s| s.id)
            .ok_or(CliError::NoActiveSession)?,
    };

    sessions.rearm_expiry(&session_id).await?;
    let worker = ctx
        .take_fired()
        .map(|fired| ExpiryWorker::new(Arc::clone(&sessions), fired).spawn());

    let mut feed = sessions.watch_session(&session_id).stream();
    let mut poll = tokio::time::interval(WATCH_POLL_INTERVAL);
    let mut last: Option<Session> = None;

    loop {
        tokio::select! {
            update = feed.next() => match update {
                Some(Resource::Loading) => println!("{}", "Loading session...".dimmed()),
                Some(Resource::Success(Some(session))) => {
                    if !show_update(&sessions, &mut last, session) {
                        break;
                    }
                }
                Some(Resource::Success(None)) => {
                    println!("{}", "Session no longer exists".yellow());
                    break;
                }
                Some(Resource::Failure(e)) => eprintln!("{} {}", "Error:".red(), e),
                None => break,
            },
            _ = poll.tick() => {
                // Writes from other processes do not reach this process's listeners
                match sessions.get_session(&session_id).await {
                    Ok(Some(session)) => {
                        if !show_update(&sessions, &mut last, session) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(session_id = %session_id, error = %e, "Failed to poll session"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(worker) = worker {
        worker.abort();
    }
    ctx.scheduler.cancel_all().await;
    Ok(())
}

/// Print a session when it changed. Returns false once it is confirmed.
fn show_update(sessions: &SessionLifecycle, last: &mut Option<Session>, session: Session) -> bool {
    if last.as_ref() != Some(&session) {
        println!();
        print_board(sessions, &session);
    }
    let keep_going = session.phase != SessionPhase::Confirmed;
    *last = Some(session);
    keep_going
}

fn phase_label(phase: SessionPhase) -> colored::ColoredString {
    match phase {
        SessionPhase::Live => "live".green(),
        SessionPhase::PendingConfirmation => "waiting for confirmation".yellow(),
        SessionPhase::Confirmed => "confirmed".dimmed(),
    }
}

fn print_board(sessions: &SessionLifecycle, session: &Session) {
    println!("{} {}", session.title.bold(), phase_label(session.phase));
    println!("  ID: {}", session.id);
    println!("  Admin: {}", session.admin);
    println!("  Remaining: {}", sessions.countdown(session));
    if session.notes.is_empty() {
        println!("  {}", "No notes yet".dimmed());
        return;
    }
    for note in &session.notes {
        println!(
            "  {} {}: {}",
            short_id(&note.id).dimmed(),
            note.username.cyan(),
            note.description
        );
    }
}
