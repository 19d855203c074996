//! Handlers for the CLI subcommands.
//!
//! Each function opens the index for the configured directory, performs one
//! operation on it and reports the outcome through `crate::ui`. The
//! "active profile" marker in `state.json` is maintained here, next to the
//! index, since the index itself has no notion of which profile is live.

use anstyle::AnsiColor;
use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::doctor::run_doctor;
use crate::error::IndexError;
use crate::index::Index;
use crate::paths::Paths;
use crate::state::{LockedState, State};
use crate::ui::Ui;

fn open_index(paths: &Paths) -> Result<Index> {
    Index::open_with_paths(paths.clone())
        .with_context(|| format!("Failed to open profile index in {}", paths.base_dir.display()))
}

/// Turn index lookup failures into messages that tell the user what to do next
fn with_hint(err: impl Into<anyhow::Error>) -> anyhow::Error {
    let err = err.into();
    match err.downcast_ref::<IndexError>() {
        Some(IndexError::ProfileNotFound(name)) => anyhow!(
            "Profile '{}' does not exist.\nHint: Use 'aclprof list' to see stored profiles.",
            name
        ),
        Some(IndexError::ProfileExists(name)) => anyhow!(
            "Profile '{}' already exists.\nHint: Choose a different name or remove the existing profile first.",
            name
        ),
        _ => err,
    }
}

/// List stored profiles
pub fn list(paths: &Paths, ui: &Ui) -> Result<()> {
    let index = open_index(paths)?;
    let names = index.names();

    if names.is_empty() {
        ui.warn("No profiles stored.");
        ui.newline();
        ui.println("Store one with:");
        ui.println(format!("  {} set <name> --file acl.hujson", ui.bold("aclprof")));
        return Ok(());
    }

    let state = State::read(&paths.state_file).unwrap_or_default();

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Size"),
        ui.header_cell("Status"),
    ]);

    for name in &names {
        let is_active = state.is_active(name);
        let icon = if is_active { ui.icon_ok() } else { " " };
        let status_cell = if is_active {
            ui.colored_cell("active", AnsiColor::Green)
        } else {
            ui.cell("-")
        };
        let size_cell = match index.record(name).map(|r| fs::metadata(r.path)) {
            Some(Ok(meta)) => ui.cell(format_bytes(meta.len())),
            _ => ui.colored_cell("missing", AnsiColor::Red),
        };

        table.add_row(vec![ui.cell(icon), ui.cell(name), size_cell, status_cell]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());

    Ok(())
}

/// Print a profile's content to stdout
pub fn show(paths: &Paths, name: &str) -> Result<()> {
    let index = open_index(paths)?;
    let data = index.read(name).map_err(with_hint)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to write to stdout")?;
    Ok(())
}

/// Create or replace a profile from a file, or stdin when no file is given
pub fn set(paths: &Paths, name: &str, file: Option<&Path>, ui: &Ui) -> Result<()> {
    let content = match file {
        Some(path) => fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read profile content from stdin")?;
            buf
        }
    };

    let index = open_index(paths)?;
    let existed = index.contains(name);
    index.set(name, &content)?;

    if existed {
        ui.ok(format!("Updated profile '{}'", name));
    } else {
        ui.ok(format!("Created profile '{}'", name));
    }

    // Keep the output file in step with an edited active profile
    let state = State::read(&paths.state_file).unwrap_or_default();
    if existed && state.is_active(name) {
        match index.apply(name) {
            Ok(()) => ui.ok(format!(
                "Re-applied '{}' to {}",
                name,
                paths.output_file.display()
            )),
            Err(e) => {
                warn!(profile = name, error = %e, "re-apply after update failed");
                ui.warn(format!("'{}' is active but could not be re-applied: {}", name, e));
            }
        }
    } else if !existed {
        ui.newline();
        ui.println("To activate it:");
        ui.println(format!("  aclprof apply {}", name));
    }

    Ok(())
}

/// Rename a profile, carrying over the active marker
pub fn rename(paths: &Paths, old_name: &str, new_name: &str, ui: &Ui) -> Result<()> {
    let index = open_index(paths)?;
    index.rename(old_name, new_name).map_err(with_hint)?;

    let mut locked = LockedState::lock(&paths.state_file)?;
    if locked.rename_active(old_name, new_name)? {
        ui.ok(format!(
            "Renamed profile '{}' to '{}' (still active)",
            old_name, new_name
        ));
    } else {
        ui.ok(format!("Renamed profile '{}' to '{}'", old_name, new_name));
    }

    Ok(())
}

/// Remove a profile from the index
pub fn remove(paths: &Paths, name: &str, ui: &Ui, force: bool) -> Result<()> {
    let index = open_index(paths)?;

    if !index.contains(name) {
        ui.warn(format!("Profile '{}' is not stored, nothing to remove.", name));
        return Ok(());
    }

    if !force {
        let confirm = inquire::Confirm::new(&format!("Remove profile '{}'?", name))
            .with_default(false)
            .with_help_message("The output file is left as it is")
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Removal cancelled.");
            return Ok(());
        }
    }

    index.remove(name)?;

    let mut locked = LockedState::lock(&paths.state_file)?;
    if locked.clear_active(name)? {
        ui.warn(format!(
            "'{}' was the active profile; {} keeps its last content",
            name,
            paths.output_file.display()
        ));
    }

    ui.ok(format!("Removed profile '{}'", name));
    Ok(())
}

/// Activate a profile by writing it to the output file
pub fn apply(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let index = open_index(paths)?;
    let spinner = ui.spinner(format!("Applying profile '{}'...", name));

    match index.apply(name) {
        Ok(()) => {
            let mut locked = LockedState::lock(&paths.state_file)?;
            locked.mark_applied(name)?;
            ui.spinner_finish_ok(
                &spinner,
                format!("Active profile: {} -> {}", name, paths.output_file.display()),
            );
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Failed to apply: {}", e));
            Err(with_hint(e))
        }
    }
}

/// Show the last applied profile and whether the output file still matches it
pub fn current(paths: &Paths, ui: &Ui) -> Result<()> {
    let state = State::read(&paths.state_file).unwrap_or_default();

    ui.section("Current Profile");
    ui.newline();

    let mut table = ui.simple_table();

    match &state.active_profile {
        Some(profile) => {
            table.add_row(vec![ui.cell("Applied profile:"), ui.header_cell(profile)]);
            if let Some(applied) = &state.applied_at {
                table.add_row(vec![
                    ui.cell("Applied at:"),
                    ui.cell(applied.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
                ]);
            }
        }
        None => {
            table.add_row(vec![ui.cell("Applied profile:"), ui.cell("(none)")]);
        }
    }

    let output = &paths.output_file;
    let output_cell = if output.is_file() {
        ui.cell(output.display().to_string())
    } else {
        ui.colored_cell(format!("{} (missing)", output.display()), AnsiColor::Yellow)
    };
    table.add_row(vec![ui.cell("Output file:"), output_cell]);

    if let Some(profile) = &state.active_profile {
        table.add_row(vec![ui.cell("Sync:"), sync_cell(paths, profile, ui)?]);
    }

    ui.println(table.to_string());
    Ok(())
}

fn sync_cell(paths: &Paths, profile: &str, ui: &Ui) -> Result<comfy_table::Cell> {
    let index = open_index(paths)?;
    if !index.contains(profile) {
        return Ok(ui.colored_cell("profile no longer stored", AnsiColor::Red));
    }

    let stored = index.read(profile)?;
    let cell = match fs::read(&paths.output_file) {
        Ok(live) if live == stored => ui.colored_cell("in sync", AnsiColor::Green),
        Ok(_) => ui.colored_cell("output modified since apply", AnsiColor::Yellow),
        Err(e) => {
            debug!(error = %e, "could not read output file");
            ui.colored_cell("output unreadable", AnsiColor::Red)
        }
    };
    Ok(cell)
}

/// Run diagnostics
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    if !run_doctor(paths, ui) {
        bail!("Doctor found problems, see the report above");
    }
    ui.ok("No problems found");
    Ok(())
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
