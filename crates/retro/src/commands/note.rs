//! Standalone note commands.

use anyhow::Result;
use colored::Colorize;
use retro_core::{NewNote, NoteFilter, RetroConfig, StandaloneNote, UpdateNote};

use super::{format_time, image_source, short_id};
use crate::cli::{Identity, NoteAction, NoteCommand};
use crate::context::Context;
use crate::error::CliError;

/// Execute note command.
pub async fn execute(cmd: NoteCommand, identity: &Identity, config: &RetroConfig) -> Result<()> {
    let ctx = Context::open(config, identity)?;

    match cmd.action {
        NoteAction::Add {
            title,
            description,
            note_type,
            images,
        } => {
            let input = NewNote {
                user_id: ctx.user()?.to_string(),
                username: ctx.username().await?,
                title,
                description,
                images: images.iter().map(|i| image_source(i)).collect(),
                note_type: note_type.into(),
                timestamp: None,
            };
            let note = ctx.repo.notes().add_note(input).await?;

            println!("{} Note created", "✓".green());
            print_note(&note);
            Ok(())
        }
        NoteAction::List {
            search,
            note_type,
            json,
        } => {
            let filter = NoteFilter {
                search,
                note_type: note_type.map(Into::into),
            };
            let notes = ctx.repo.notes().list_notes(&filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&notes)?);
                return Ok(());
            }
            if notes.is_empty() {
                println!("{}", "No notes found".yellow());
                return Ok(());
            }
            println!("{}", format!("Notes ({})", notes.len()).bold());
            for note in &notes {
                println!(
                    "  {} {} {} {}",
                    short_id(&note.id).dimmed(),
                    format_time(note.timestamp),
                    note.title.bold(),
                    format!("[{}]", note.note_type).cyan()
                );
            }
            Ok(())
        }
        NoteAction::Show { note_id, json } => {
            let note = ctx
                .repo
                .notes()
                .get_note(&note_id)
                .await?
                .ok_or(CliError::NoteNotFound(note_id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&note)?);
            } else {
                print_note(&note);
            }
            Ok(())
        }
        NoteAction::Update {
            note_id,
            title,
            description,
            note_type,
            images,
        } => {
            let current = ctx
                .repo
                .notes()
                .get_note(&note_id)
                .await?
                .ok_or_else(|| CliError::NoteNotFound(note_id.clone()))?;

            let input = UpdateNote {
                user_id: ctx.user()?.to_string(),
                username: ctx.username().await?,
                title: title.unwrap_or(current.title),
                description: description.unwrap_or(current.description),
                images: images.iter().map(|i| image_source(i)).collect(),
                note_type: note_type.map(Into::into).unwrap_or(current.note_type),
            };
            let note = ctx.repo.notes().update_note(&note_id, input).await?;

            println!("{} Note updated", "✓".green());
            print_note(&note);
            Ok(())
        }
        NoteAction::Delete { note_id } => {
            ctx.repo.notes().delete_note(&note_id).await?;
            println!("{} Note {} deleted", "✓".green(), short_id(&note_id));
            Ok(())
        }
        NoteAction::DeleteImage { note_id, url } => {
            ctx.repo.notes().delete_image(&note_id, &url).await?;
            println!("{} Image removed from note {}", "✓".green(), short_id(&note_id));
            Ok(())
        }
    }
}

fn print_note(note: &StandaloneNote) {
    println!("{}", note.title.bold());
    println!("  ID: {}", note.id);
    println!("  Type: {}", note.note_type.label().cyan());
    println!("  Author: {}", note.username);
    println!("  Time: {}", format_time(note.timestamp));
    if !note.description.is_empty() {
        println!("  {}", note.description);
    }
    for url in &note.images {
        println!("  Image: {}", url.dimmed());
    }
}
