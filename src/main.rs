//! ccw-issue CLI - Issue, solution and execution-queue tracking for agent workflows.

use ccw_issue::cli::{Cli, Commands, ConfigCommands, QueueCommands};
use ccw_issue::commands::{self, Output};
use ccw_issue::config::{self, ResolvedConfig};
use ccw_issue::logging;
use ccw_issue::notify::{Notification, Notifier};
use ccw_issue::storage::Storage;
use clap::Parser;
use clap::error::ErrorKind;
use std::env;
use std::path::PathBuf;
use std::process;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                // Usage errors share the exit code of every other user error
                let _ = e.print();
                process::exit(1);
            }
        },
    };
    let json = cli.json;
    logging::init(cli.verbose);

    // Determine project root: --root flag > CCW_PROJECT_ROOT env > marker search > cwd
    let storage = open_storage(cli.root, json);

    let config = match config::resolve_config(&storage) {
        Ok(config) => config,
        Err(e) => fail(&e, json),
    };
    let storage = storage.with_lock_timeout(config.lock_timeout());

    // Serialize before the command is consumed; None for read-only commands
    let event = serialize_command(&cli.command);

    let changed = match run_command(cli.command, &storage, &config, json) {
        Ok(changed) => changed,
        Err(e) => fail(&e, json),
    };

    if let Some((name, payload)) = event.filter(|_| changed) {
        let notifier = Notifier::from_config(&config);
        if notifier.is_enabled() {
            notifier.send(&Notification::for_command(&name, payload));
        }
    }
}

/// Print an error in the selected format and exit 1.
fn fail(e: &ccw_issue::Error, json: bool) -> ! {
    if json {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
    } else {
        eprintln!("Error: {}", e);
    }
    process::exit(1);
}

/// Resolve the storage root.
///
/// An explicit path (via -C/--root or CCW_PROJECT_ROOT) is used literally and
/// must exist. Otherwise the nearest ancestor holding `.workflow` or `.git`
/// is used, falling back to the current directory.
fn open_storage(explicit_root: Option<PathBuf>, json: bool) -> Storage {
    match explicit_root {
        Some(path) => {
            if !path.is_dir() {
                fail(
                    &ccw_issue::Error::NotFound(format!(
                        "Project root {}",
                        path.display()
                    )),
                    json,
                );
            }
            Storage::at(&path)
        }
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            Storage::discover(&cwd)
        }
    }
}

/// Run one command and print its output. Returns false when a write-path
/// command turned out to change nothing.
fn run_command(
    command: Commands,
    storage: &Storage,
    config: &ResolvedConfig,
    json: bool,
) -> Result<bool, ccw_issue::Error> {
    let mut changed = true;
    match command {
        Commands::Init {
            issue_id,
            title,
            description,
            priority,
            force,
        } => {
            let opts = commands::InitOptions {
                title,
                priority,
                description,
                force,
            };
            let result = commands::init(storage, &issue_id, opts)?;
            output(&result, json);
        }

        Commands::List {
            issue_id,
            status,
            ids,
        } => {
            let result = commands::list(storage, issue_id.as_deref(), status.as_deref(), ids)?;
            output(&result, json);
        }

        Commands::Status { issue_id } => {
            let result = commands::status(storage, issue_id.as_deref())?;
            output(&result, json);
        }

        Commands::Task {
            issue_id,
            task_id,
            title,
            status,
            description,
        } => {
            let opts = commands::TaskOptions {
                title,
                status,
                description,
            };
            let result = commands::task(storage, &issue_id, task_id.as_deref(), opts)?;
            output(&result, json);
        }

        Commands::Bind {
            issue_id,
            solution_id,
            solution_file,
        } => {
            let result = commands::bind(
                storage,
                &issue_id,
                solution_id.as_deref(),
                solution_file.as_deref(),
            )?;
            output(&result, json);
        }

        Commands::Update {
            issue_id,
            status,
            priority,
            title,
            description,
        } => {
            let opts = commands::UpdateOptions {
                status,
                priority,
                title,
                description,
            };
            let result = commands::update(storage, &issue_id, opts)?;
            output(&result, json);
        }

        Commands::Queue { command } => match command {
            None => {
                let result = commands::queue_show(storage)?;
                output(&result, json);
            }

            Some(QueueCommands::List) => {
                let result = commands::queue_list(storage)?;
                output(&result, json);
            }

            Some(QueueCommands::History) => {
                let result = commands::queue_history(storage)?;
                output(&result, json);
            }

            Some(QueueCommands::Switch { queue_id }) => {
                let result = commands::queue_switch(storage, &queue_id)?;
                output(&result, json);
            }

            Some(QueueCommands::Add {
                issue_id,
                depends_on,
                group,
                executor,
                semantic_priority,
            }) => {
                let opts = commands::AddOptions {
                    depends_on,
                    group,
                    executor,
                    semantic_priority,
                };
                let defaults = commands::QueueDefaults::from_config(config);
                let result = commands::queue_add(storage, &issue_id, opts, &defaults)?;
                output(&result, json);
            }

            Some(QueueCommands::Dag { queue }) => {
                let result = commands::queue_dag(storage, queue.as_deref())?;
                output(&result, json);
            }

            Some(QueueCommands::Plan { file, queue }) => {
                let result = commands::queue_plan(storage, &file, queue.as_deref())?;
                output(&result, json);
            }

            Some(QueueCommands::Archive { queue_id }) => {
                let result = commands::queue_archive(storage, queue_id.as_deref())?;
                output(&result, json);
            }

            Some(QueueCommands::Delete { queue_id }) => {
                let result = commands::queue_delete(storage, &queue_id)?;
                output(&result, json);
            }
        },

        // Executors parse these; they are JSON regardless of --json
        Commands::Next { item_id } => {
            let result = commands::next(storage, item_id.as_deref())?;
            changed = result.is_new_claim();
            output(&result, true);
        }

        Commands::Detail { item_id, queue } => {
            let result = commands::detail(storage, &item_id, queue.as_deref())?;
            output(&result, true);
        }

        Commands::Done {
            item_id,
            fail,
            reason,
            result,
        } => {
            let opts = commands::DoneOptions {
                fail,
                reason,
                result,
            };
            let result = commands::done(storage, &item_id, opts)?;
            output(&result, json);
        }

        Commands::Retry { issue_id } => {
            let result = commands::retry(storage, issue_id.as_deref())?;
            changed = !result.reset_items.is_empty();
            output(&result, json);
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(storage, config)?;
                output(&result, json);
            }
        },
    }
    Ok(changed)
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, json: bool) {
    if json {
        println!("{}", result.to_json());
    } else {
        println!("{}", result.to_human());
    }
}

/// Name and arguments of a write-path command, for the dashboard event.
/// Read-only commands return None.
fn serialize_command(command: &Commands) -> Option<(String, serde_json::Value)> {
    match command {
        Commands::Init {
            issue_id,
            title,
            priority,
            force,
            ..
        } => Some((
            "init".to_string(),
            serde_json::json!({ "issue_id": issue_id, "title": title, "priority": priority, "force": force }),
        )),

        Commands::Task {
            issue_id,
            task_id,
            title,
            status,
            ..
        } => Some((
            "task".to_string(),
            serde_json::json!({ "issue_id": issue_id, "task_id": task_id, "title": title, "status": status }),
        )),

        Commands::Bind {
            issue_id,
            solution_id,
            solution_file,
        } => {
            // Listing solutions changes nothing
            if solution_id.is_none() && solution_file.is_none() {
                return None;
            }
            Some((
                "bind".to_string(),
                serde_json::json!({ "issue_id": issue_id, "solution_id": solution_id, "solution_file": solution_file }),
            ))
        }

        Commands::Update {
            issue_id,
            status,
            priority,
            title,
            ..
        } => Some((
            "update".to_string(),
            serde_json::json!({ "issue_id": issue_id, "status": status, "priority": priority, "title": title }),
        )),

        Commands::Queue { command } => match command {
            Some(QueueCommands::Switch { queue_id }) => Some((
                "queue switch".to_string(),
                serde_json::json!({ "queue_id": queue_id }),
            )),
            Some(QueueCommands::Add {
                issue_id,
                depends_on,
                group,
                executor,
                ..
            }) => Some((
                "queue add".to_string(),
                serde_json::json!({ "issue_id": issue_id, "depends_on": depends_on, "group": group, "executor": executor }),
            )),
            Some(QueueCommands::Plan { file, queue }) => Some((
                "queue plan".to_string(),
                serde_json::json!({ "file": file, "queue": queue }),
            )),
            Some(QueueCommands::Archive { queue_id }) => Some((
                "queue archive".to_string(),
                serde_json::json!({ "queue_id": queue_id }),
            )),
            Some(QueueCommands::Delete { queue_id }) => Some((
                "queue delete".to_string(),
                serde_json::json!({ "queue_id": queue_id }),
            )),
            None
            | Some(QueueCommands::List)
            | Some(QueueCommands::History)
            | Some(QueueCommands::Dag { .. }) => None,
        },

        Commands::Next { item_id } => Some((
            "next".to_string(),
            serde_json::json!({ "item_id": item_id }),
        )),

        Commands::Done {
            item_id,
            fail,
            reason,
            ..
        } => Some((
            "done".to_string(),
            serde_json::json!({ "item_id": item_id, "fail": fail, "reason": reason }),
        )),

        Commands::Retry { issue_id } => Some((
            "retry".to_string(),
            serde_json::json!({ "issue_id": issue_id }),
        )),

        Commands::List { .. }
        | Commands::Status { .. }
        | Commands::Detail { .. }
        | Commands::Config { .. } => None,
    }
}
