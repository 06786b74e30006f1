//! Command-line front end for survey project files.
//!
//! # Responsibility
//! - Expose store, validation and probe operations for scripting.
//! - Map every failure to a one-line message and a non-zero exit code.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hydrosurvey_core::validate::validate;
use hydrosurvey_core::{
    default_log_level, init_logging, probe_columns, DocumentStore, EditorSession, EntityKey,
    EntityKind, SaveMode, ValidationContext,
};
use log::info;

#[derive(Parser)]
#[command(name = "hydrosurvey", version, about = "Survey project configuration tool")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "HYDROSURVEY_LOG_LEVEL")]
    log_level: Option<String>,
    /// Directory for rotating log files; logging is off when unset
    #[arg(long, global = true, value_name = "DIR", env = "HYDROSURVEY_LOG_DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an empty project file
    New {
        path: PathBuf,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// List entities, optionally of one kind
    List {
        project: PathBuf,
        #[arg(long, value_parser = parse_kind)]
        kind: Option<EntityKind>,
    },
    /// Print one entity as JSON
    Show {
        project: PathBuf,
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },
    /// Validate every entity through its default editor form
    Check { project: PathBuf },
    /// Create an entity with schema defaults and save
    Create {
        project: PathBuf,
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        name: String,
    },
    /// Delete an entity nothing references and save
    Delete {
        project: PathBuf,
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },
    /// Set a project-level setting and save
    SetSetting {
        project: PathBuf,
        name: String,
        value: String,
    },
    /// Report line count and header columns of a data file
    Probe { file: PathBuf },
}

fn parse_kind(value: &str) -> Result<EntityKind, String> {
    EntityKind::parse(value).ok_or_else(|| format!("unknown entity kind `{value}`"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(dir) = &cli.log_dir {
        let level = cli
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level().to_string());
        if let Err(err) = init_logging(&level, dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), String> {
    match command {
        Commands::New { path, force } => {
            let mode = if force {
                SaveMode::Overwrite
            } else {
                SaveMode::CreateNew
            };
            DocumentStore::new_project()
                .save(&path, mode)
                .map_err(|err| err.to_string())?;
            println!("created {}", path.display());
            Ok(())
        }
        Commands::List { project, kind } => {
            let store = open(&project)?;
            let kinds: Vec<EntityKind> = match kind {
                Some(kind) => vec![kind],
                None => EntityKind::ALL.to_vec(),
            };
            for kind in kinds {
                for entity in store.get_entities(kind) {
                    println!("{kind}\t{}\t{}", entity.id, entity.name);
                }
            }
            Ok(())
        }
        Commands::Show { project, kind, id } => {
            let store = open(&project)?;
            let entity = store.get_entity(kind, &id).map_err(|err| err.to_string())?;
            let json = serde_json::to_string_pretty(entity).map_err(|err| err.to_string())?;
            println!("{json}");
            Ok(())
        }
        Commands::Check { project } => check(&project),
        Commands::Create {
            project,
            kind,
            name,
        } => {
            let mut store = open(&project)?;
            let id = store
                .create_entity(kind, name, Vec::<(&str, &str)>::new())
                .map_err(|err| err.to_string())?
                .id
                .clone();
            store.save_in_place().map_err(|err| err.to_string())?;
            println!("{kind}\t{id}");
            Ok(())
        }
        Commands::Delete { project, kind, id } => {
            let mut store = open(&project)?;
            store
                .delete_entity(&EntityKey::new(kind, id))
                .map_err(|err| err.to_string())?;
            store.save_in_place().map_err(|err| err.to_string())
        }
        Commands::SetSetting {
            project,
            name,
            value,
        } => {
            let mut store = open(&project)?;
            store.set_setting(name, value);
            store.save_in_place().map_err(|err| err.to_string())
        }
        Commands::Probe { file } => {
            let probe = probe_columns(&file).map_err(|err| err.to_string())?;
            println!("lines\t{}", probe.line_count);
            println!("delimiter\t{:?}", probe.delimiter);
            for (index, column) in probe.columns.iter().enumerate() {
                println!("{index}\t{column}");
            }
            Ok(())
        }
    }
}

fn open(project: &Path) -> Result<DocumentStore, String> {
    DocumentStore::open(project).map_err(|err| err.to_string())
}

fn check(project: &Path) -> Result<(), String> {
    let store = open(project)?;
    let base_dir = store.base_directory();
    let ctx = ValidationContext::new(store.document(), &base_dir);

    let mut failures = 0usize;
    for kind in EntityKind::ALL {
        for entity in store.get_entities(kind) {
            let session =
                EditorSession::open_default(&store, entity.key()).map_err(|err| err.to_string())?;
            match validate(session.bindings(), &ctx) {
                Ok(()) => println!("ok\t{}\t{}", entity.key(), entity.name),
                Err(failure) => {
                    failures += 1;
                    println!("fail\t{}\t{}\t{failure}", entity.key(), entity.name);
                }
            }
        }
    }
    info!(
        "event=project_check module=cli status=ok path={} failures={}",
        project.display(),
        failures
    );

    if failures == 0 {
        Ok(())
    } else {
        Err(format!("{failures} entities failed validation"))
    }
}
