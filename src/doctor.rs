//! Diagnostics for an aclprof directory.
//!
//! Implements `aclprof doctor`. Nothing here creates or modifies files: the
//! index is only opened once its layout is known to exist.

use anstyle::AnsiColor;
use std::fs;

use crate::fs_utils::is_owner_writable;
use crate::index::Index;
use crate::paths::Paths;
use crate::state::State;
use crate::ui::Ui;

/// Run every check, returning true when none of them found a problem
pub fn run_doctor(paths: &Paths, ui: &Ui) -> bool {
    ui.section("aclprof Doctor");
    ui.newline();

    let mut healthy = true;

    healthy &= check_step(ui, "Directories", || check_directories(paths, ui));

    let index = if paths.index_file.is_file() {
        match Index::open_with_paths(paths.clone()) {
            Ok(index) => Some(index),
            Err(e) => {
                ui.println(format!("  {} Failed to open index: {}", ui.icon_err(), e));
                healthy = false;
                None
            }
        }
    } else {
        None
    };

    healthy &= check_step(ui, "Profiles", || match &index {
        Some(index) => check_profiles(index, ui),
        None => {
            ui.println(format!(
                "  {} Index file missing: {} (created on first use)",
                ui.icon_warn(),
                paths.index_file.display()
            ));
            true
        }
    });

    healthy &= check_step(ui, "Output File", || check_output(paths, ui));

    healthy &= check_step(ui, "State File", || check_state(paths, index.as_ref(), ui));

    healthy
}

fn check_directories(paths: &Paths, ui: &Ui) -> bool {
    let meta = match fs::metadata(&paths.base_dir) {
        Ok(meta) => meta,
        Err(_) => {
            ui.println(format!(
                "  {} Base directory missing: {} (created on first use)",
                ui.icon_warn(),
                paths.base_dir.display()
            ));
            return true;
        }
    };

    if !meta.is_dir() {
        ui.println(format!(
            "  {} Base path is not a directory: {}",
            ui.icon_err(),
            paths.base_dir.display()
        ));
        return false;
    }
    if !is_owner_writable(&meta) {
        ui.println(format!(
            "  {} Base directory is not writable: {}",
            ui.icon_err(),
            paths.base_dir.display()
        ));
        return false;
    }
    ui.println(format!(
        "  {} Base directory: {}",
        ui.icon_ok(),
        paths.base_dir.display()
    ));

    if paths.profiles_dir.is_dir() {
        ui.println(format!(
            "  {} Profiles directory: {}",
            ui.icon_ok(),
            paths.profiles_dir.display()
        ));
    } else {
        ui.println(format!(
            "  {} Profiles directory missing: {}",
            ui.icon_warn(),
            paths.profiles_dir.display()
        ));
    }
    true
}

fn check_profiles(index: &Index, ui: &Ui) -> bool {
    let names = index.names();
    if names.is_empty() {
        ui.println(format!("  {} No profiles stored", ui.icon_warn()));
    } else {
        ui.println(format!("  Found {} profiles:", names.len()));
    }

    let mut all_valid = true;
    for name in names {
        let Some(record) = index.record(&name) else {
            continue;
        };
        if record.path.is_file() {
            ui.println(format!("    {} {}", ui.icon_ok(), name));
        } else {
            ui.println(format!(
                "    {} {} (content file missing: {})",
                ui.icon_err(),
                name,
                record.path.display()
            ));
            all_valid = false;
        }
    }

    match index.orphaned_files() {
        Ok(orphans) if orphans.is_empty() => {}
        Ok(orphans) => {
            // Left behind by `remove`, harmless
            ui.println(format!(
                "  {} {} content files are not referenced by any profile:",
                ui.icon_info(),
                orphans.len()
            ));
            for orphan in orphans {
                ui.println(format!("      {}", ui.dim(orphan.display().to_string())));
            }
        }
        Err(e) => {
            ui.println(format!(
                "  {} Failed to scan profiles directory: {}",
                ui.icon_err(),
                e
            ));
            all_valid = false;
        }
    }

    all_valid
}

fn check_output(paths: &Paths, ui: &Ui) -> bool {
    let output = &paths.output_file;

    if output.is_dir() {
        ui.println(format!(
            "  {} Output path is a directory: {}",
            ui.icon_err(),
            output.display()
        ));
        return false;
    }
    if output.is_file() {
        ui.println(format!("  {} Output file: {}", ui.icon_ok(), output.display()));
        return true;
    }

    let parent_ok = output
        .parent()
        .map(|p| if p.as_os_str().is_empty() { std::path::Path::new(".") } else { p })
        .is_some_and(|p| p.is_dir());
    if parent_ok {
        ui.println(format!(
            "  {} Output file not written yet: {}",
            ui.icon_info(),
            output.display()
        ));
        true
    } else {
        ui.println(format!(
            "  {} Output directory does not exist: {}",
            ui.icon_err(),
            output.display()
        ));
        false
    }
}

fn check_state(paths: &Paths, index: Option<&Index>, ui: &Ui) -> bool {
    let state = match State::read(&paths.state_file) {
        Ok(state) => state,
        Err(e) => {
            ui.println(format!("  {} State file corrupt: {:#}", ui.icon_err(), e));
            return false;
        }
    };

    let Some(active) = state.active_profile else {
        ui.println(format!("  {} No profile applied yet", ui.icon_info()));
        return true;
    };

    ui.println(format!("  {} Last applied profile: {}", ui.icon_info(), active));
    match index {
        Some(index) if index.contains(&active) => {
            ui.println(format!("  {} Applied profile still exists", ui.icon_ok()));
            true
        }
        _ => {
            ui.println(format!(
                "  {} Applied profile '{}' is no longer in the index",
                ui.icon_warn(),
                active
            ));
            true
        }
    }
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    success
}
