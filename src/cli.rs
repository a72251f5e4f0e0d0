use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{default_config_path, Config};
use crate::error::Error;
use crate::kanban_board::{Filter, KanbanBoard, Reply, Transition};
use crate::kv::{FileKv, KvStore};
use crate::server::{self, AppState};
use crate::sync::{Saved, Source, TaskSync};
use crate::task::{Task, TaskStatus};
use crate::ui;

#[derive(Parser)]
#[command(name = "taskdash")]
#[command(version, about = "Kanban board, task intake and dashboard API")]
pub struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "TASKDASH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Add a task from a line of free text
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show how a line of text would be read, without saving anything
    Parse {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Open the board
    Show,
    /// List tasks
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Move a task to another column
    Move { id: String, status: TaskStatus },
    /// Delete a task
    Rm { id: String },
    /// Confirm or cancel the newest task awaiting confirmation
    Reply {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Append a note to a task
    Note {
        id: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Count tasks per category
    Tags,
    /// Count tasks per column
    Stats,
    /// Run the dashboard API
    Serve {
        #[arg(long, env = "TASKDASH_BIND")]
        bind: Option<String>,
    },
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Show) {
        Commands::Init { force } => init(cli.config, force),
        Commands::Parse { text } => {
            let draft = config
                .extractor()
                .extract(&text.join(" "), Local::now().date_naive());
            println!("{}", serde_json::to_string_pretty(&draft)?);
            Ok(())
        }
        Commands::Show => {
            let sync = TaskSync::from_config(&config)?;
            ui::run(&config, sync).await?;
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let kv: Arc<dyn KvStore> = Arc::new(FileKv::new(config.store_dir()));
            let state = AppState::new(config, Some(kv))?;
            server::serve(state, &bind).await?;
            Ok(())
        }
        command => edit(command, &config).await,
    }
}

fn init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    let config = Config::default();
    config
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    std::fs::create_dir_all(config.store_dir())?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Board commands: load, apply, save when something changed.
async fn edit(command: Commands, config: &Config) -> anyhow::Result<()> {
    let sync = TaskSync::from_config(config)?;
    let (tasks, source) = sync.load().await?;
    if source == Source::Mirror {
        eprintln!("Remote unavailable, using the local copy");
    }
    let mut board = KanbanBoard::with_tasks(config.board_rules(), tasks);

    let changed = match command {
        Commands::Add { text } => {
            let draft = config
                .extractor()
                .extract(&text.join(" "), Local::now().date_naive());
            let task = board.create(draft)?;
            println!("Added [{}] {} ({})", short_id(&task.id), task.text, task.status);
            true
        }
        Commands::List { status, category } => {
            let filter = Filter { status, category };
            for status in TaskStatus::COLUMNS {
                let tasks: Vec<&Task> = board
                    .list(&filter)
                    .into_iter()
                    .filter(|t| t.status == status)
                    .collect();
                if tasks.is_empty() {
                    continue;
                }
                println!("{}:", status.label());
                for task in tasks {
                    println!("  {}", describe(task));
                }
            }
            false
        }
        Commands::Move { id, status } => {
            let id = resolve_id(&board, &id)?;
            match board.transition(&id, status) {
                Transition::Applied => {
                    println!("Moved [{}] to {}", short_id(&id), status);
                    true
                }
                Transition::Unchanged => {
                    println!("Already {}", status);
                    false
                }
                Transition::Rejected => bail!("Cannot move that task to {}", status),
                Transition::UnknownTask => return Err(Error::UnknownTask(id).into()),
            }
        }
        Commands::Rm { id } => {
            let id = resolve_id(&board, &id)?;
            board.delete(&id);
            println!("Deleted [{}]", short_id(&id));
            true
        }
        Commands::Reply { text } => match board.apply_reply(&text.join(" ")) {
            Reply::Confirmed(id) => {
                println!("Confirmed [{}]", short_id(&id));
                true
            }
            Reply::Cancelled(id) => {
                println!("Cancelled [{}]", short_id(&id));
                true
            }
            Reply::NothingPending => {
                println!("Nothing is awaiting confirmation");
                false
            }
            Reply::Ignored => {
                println!("Not a confirmation or cancellation");
                false
            }
        },
        Commands::Note { id, text } => {
            let id = resolve_id(&board, &id)?;
            board.append_note(&id, &text.join(" "))?;
            true
        }
        Commands::Tags => {
            for (category, count) in board.categories() {
                println!("{category}: {count}");
            }
            false
        }
        Commands::Stats => {
            let stats = board.stats();
            println!("pending: {}", stats.pending);
            println!("todo: {}", stats.todo);
            println!("in_progress: {}", stats.in_progress);
            println!("done: {}", stats.done);
            println!("open: {}", stats.open());
            false
        }
        Commands::Init { .. } | Commands::Parse { .. } | Commands::Show | Commands::Serve { .. } => {
            false
        }
    };

    if changed && sync.save(board.tasks()).await? == Saved::MirrorOnly {
        eprintln!("Saved locally only, remote unavailable");
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn describe(task: &Task) -> String {
    let mut line = format!(
        "[{}] {} ({}, {})",
        short_id(&task.id),
        task.text,
        task.category,
        task.priority
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {due}"));
    }
    if let Some(notes) = &task.notes {
        line.push_str(&format!(" [{} notes]", notes.lines().count()));
    }
    line
}

/// Accepts a full id or any unambiguous prefix of one.
pub fn resolve_id(board: &KanbanBoard, id: &str) -> crate::Result<String> {
    if board.get(id).is_some() {
        return Ok(id.to_string());
    }
    let mut matches = board.tasks().iter().filter(|t| t.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(task), None) if !id.is_empty() => Ok(task.id.clone()),
        _ => Err(Error::UnknownTask(id.to_string())),
    }
}
