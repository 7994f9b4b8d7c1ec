mod cli;
mod database;
mod engine;
mod models;
mod ui;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser};

use cli::{Cli, Commands};
use database::TaskStore;
use engine::TaskListEngine;
use models::{SortMode, Task, FILTER_ALL};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let store = Arc::new(TaskStore::open_default()?);
    let engine = TaskListEngine::new(store.clone())?;

    match cli.command {
        Some(Commands::Add {
            title,
            label,
            priority,
        }) => {
            validate_title(&title)?;
            validate_priority(priority)?;
            let saved = engine.create(&title, &label, priority)?;
            println!("Added task {}: {}", saved.id, saved.title);
        }
        Some(Commands::List {
            search,
            label,
            sort,
            json,
        }) => {
            let sort_mode = match SortMode::parse(&sort) {
                Some(mode) => mode,
                None => {
                    bail!("unknown sort mode '{}' (expected newest, oldest, priority-high, or priority-low)", sort);
                }
            };
            if let Some(query) = search.as_deref() {
                engine.set_search_query(query);
            }
            engine.set_filter(&label);
            engine.set_sort_mode(sort_mode);

            let visible = engine.visible_snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&visible)?);
            } else {
                print_task_table(&visible, &label);
            }
        }
        Some(Commands::Show { id }) => match engine.lookup_by_id(id)? {
            Some(task) => print_task(&task),
            None => println!("Task {} not found", id),
        },
        Some(Commands::Edit {
            id,
            title,
            label,
            priority,
        }) => {
            let existing = match engine.lookup_by_id(id)? {
                Some(task) => task,
                None => {
                    println!("Task {} not found", id);
                    return Ok(());
                }
            };
            let title = title.unwrap_or(existing.title.clone());
            let label = label.unwrap_or(existing.label.clone());
            let priority = priority.unwrap_or(existing.priority);
            validate_title(&title)?;
            validate_priority(priority)?;

            let saved = engine.update(id, &title, &label, priority)?;
            println!("Updated task {}: {}", saved.id, saved.title);
        }
        Some(Commands::Done { id }) => match engine.lookup_by_id(id)? {
            Some(task) => {
                let toggled = engine.toggle_completion(&task)?;
                let state = if toggled.is_done { "done" } else { "open" };
                println!("Task {} is now {}", toggled.id, state);
            }
            None => println!("Task {} not found", id),
        },
        Some(Commands::Rm { id }) => match engine.lookup_by_id(id)? {
            Some(task) => {
                engine.delete(&task)?;
                println!("Deleted task {}: {}", task.id, task.title);
            }
            None => println!("Task {} not found", id),
        },
        Some(Commands::Completions { shell }) => {
            use clap_complete::{generate, Shell};
            let shell = shell.to_lowercase();
            let shell_enum = match shell.as_str() {
                "bash" => Shell::Bash,
                "zsh" => Shell::Zsh,
                "fish" => Shell::Fish,
                "elvish" => Shell::Elvish,
                "powershell" => Shell::PowerShell,
                _ => {
                    println!("Unsupported shell: {}", shell);
                    return Ok(());
                }
            };
            let mut cmd = Cli::command();
            generate(shell_enum, &mut cmd, "taskpad", &mut std::io::stdout());
        }
        Some(Commands::Tui) | None => {
            // The follower task needs a runtime; the TUI loop itself is
            // synchronous terminal polling.
            let rt = tokio::runtime::Runtime::new()?;
            let _guard = rt.enter();
            let follower = TaskListEngine::watch_store(&engine);
            ui::run_tui(engine.clone(), store.clone())?;
            follower.abort();
        }
    }

    Ok(())
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        bail!("task title must not be empty");
    }
    Ok(())
}

fn validate_priority(priority: i64) -> Result<()> {
    if !(0..=2).contains(&priority) {
        bail!("priority must be 0 (Low), 1 (Medium), or 2 (High)");
    }
    Ok(())
}

fn print_task(task: &Task) {
    let state = if task.is_done { "done" } else { "open" };
    println!(
        "{} | {} | {} | Priority: {} | Created: {} | {}",
        task.id,
        task.title,
        task.label,
        task.priority_text(),
        task.created_at_text(),
        state
    );
}

fn print_task_table(tasks: &[Task], filter_label: &str) {
    if tasks.is_empty() {
        if filter_label == FILTER_ALL {
            println!("No tasks");
        } else {
            println!("No tasks with label '{}'", filter_label);
        }
        return;
    }

    println!("Tasks:");
    println!("------");
    for task in tasks {
        print_task(task);
    }
}
