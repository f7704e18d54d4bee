mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use trestle_config::{AppConfig, FieldType, WhenTrigger};
use trestle_store::{NewField, NewTrigger, SqliteStore, Store};
use trestle_table::Tables;

/// Trestle - tables with triggers that run actions on row changes
#[derive(Parser)]
#[command(name = "trestle")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trestle)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage tables
  Table {
    #[command(subcommand)]
    command: TableCommand,
  },

  /// Read and write rows
  Row {
    #[command(subcommand)]
    command: RowCommand,
  },

  /// Manage triggers
  Trigger {
    #[command(subcommand)]
    command: TriggerCommand,
  },

  /// List registered actions
  Actions,
}

#[derive(Subcommand)]
enum TableCommand {
  /// Create a table
  Create {
    name: String,

    /// Field as name:type, with a trailing ! for required (e.g. author:string!)
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<NewField>,
  },

  /// List tables
  List,

  /// Delete a table with its rows and triggers
  Delete { name: String },
}

#[derive(Subcommand)]
enum RowCommand {
  /// Insert a row given as a JSON object
  Insert { table: String, data: String },

  /// Merge a JSON object into an existing row
  Update { table: String, id: i64, data: String },

  /// Delete rows matching a JSON criteria object
  Delete { table: String, criteria: String },

  /// List rows, optionally filtered by a JSON criteria object
  List {
    table: String,
    #[arg(default_value = "{}")]
    criteria: String,
  },
}

#[derive(Subcommand)]
enum TriggerCommand {
  /// Attach an action to a table event
  Create {
    table: String,

    /// Action name
    #[arg(long)]
    action: String,

    /// Insert, Update or Delete
    #[arg(long)]
    when: WhenTrigger,

    /// Configuration payload as a JSON object
    #[arg(long, default_value = "{}")]
    config: String,
  },

  /// List the triggers of a table
  List { table: String },

  /// Replace the configuration payload of a trigger
  Configure { id: i64, config: String },

  /// Delete a trigger
  Delete { id: i64 },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => tracing::Level::WARN,
    1 => tracing::Level::INFO,
    _ => tracing::Level::DEBUG,
  };
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trestle"),
  };

  match cli.command {
    Some(command) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run(command, &data_dir).await })
    }
    None => {
      println!("trestle - use --help to see available commands");
      Ok(())
    }
  }
}

async fn run(command: Commands, data_dir: &Path) -> Result<()> {
  let config = AppConfig::load(&data_dir.join("config.json")).context("failed to load config")?;
  let registry = registry::build(&config)?;

  if let Commands::Actions = command {
    for name in registry.names() {
      println!("{}", name);
    }
    return Ok(());
  }

  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let db_path = data_dir.join("trestle.db");
  let store: Arc<dyn Store> = Arc::new(
    SqliteStore::open(&db_path)
      .await
      .with_context(|| format!("failed to open database: {}", db_path.display()))?,
  );

  let tables = Tables::new(store, Arc::new(registry), config.dispatch.clone());

  match command {
    Commands::Table { command } => run_table(&tables, command).await,
    Commands::Row { command } => run_row(&tables, command).await,
    Commands::Trigger { command } => run_trigger(&tables, command).await,
    Commands::Actions => Ok(()),
  }
}

async fn run_table(tables: &Tables, command: TableCommand) -> Result<()> {
  match command {
    TableCommand::Create { name, fields } => {
      let table = tables
        .create_table(&name, &fields)
        .await
        .with_context(|| format!("failed to create table '{}'", name))?;
      eprintln!("Created table {} ({})", table.name(), table.id());
    }
    TableCommand::List => {
      for table in tables.list().await? {
        println!("{}\t{}", table.id, table.name);
      }
    }
    TableCommand::Delete { name } => {
      let table = tables.find(&name).await?;
      tables.delete_table(table.id()).await?;
      eprintln!("Deleted table {}", name);
    }
  }

  Ok(())
}

async fn run_row(tables: &Tables, command: RowCommand) -> Result<()> {
  match command {
    RowCommand::Insert { table, data } => {
      let table = tables.find(&table).await?;
      let id = table.insert_row(parse_json(&data, "row data")?).await?;
      println!("{}", id);
    }
    RowCommand::Update { table, id, data } => {
      let table = tables.find(&table).await?;
      table.update_row(parse_json(&data, "row data")?, id).await?;
    }
    RowCommand::Delete { table, criteria } => {
      let table = tables.find(&table).await?;
      let deleted = table.delete_rows(&parse_json(&criteria, "criteria")?).await?;
      eprintln!("Deleted {} row(s)", deleted);
    }
    RowCommand::List { table, criteria } => {
      let table = tables.find(&table).await?;
      let rows = table.get_rows(&parse_json(&criteria, "criteria")?).await?;
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }
  }

  Ok(())
}

async fn run_trigger(tables: &Tables, command: TriggerCommand) -> Result<()> {
  let triggers = tables.triggers();

  match command {
    TriggerCommand::Create {
      table,
      action,
      when,
      config,
    } => {
      let table = tables.find(&table).await?;
      let trigger = triggers
        .create(
          NewTrigger::new(action, table.id(), when)
            .with_configuration(parse_json(&config, "trigger configuration")?),
        )
        .await?;
      println!("{}", trigger.id);
    }
    TriggerCommand::List { table } => {
      let table = tables.find(&table).await?;
      for trigger in triggers.list(table.id()).await? {
        println!(
          "{}\t{}\t{}\t{}",
          trigger.id, trigger.when_trigger, trigger.action, trigger.configuration
        );
      }
    }
    TriggerCommand::Configure { id, config } => {
      let trigger = triggers
        .configure(id, parse_json(&config, "trigger configuration")?)
        .await?;
      println!("{}", serde_json::to_string_pretty(&trigger)?);
    }
    TriggerCommand::Delete { id } => {
      triggers.delete(id).await?;
      eprintln!("Deleted trigger {}", id);
    }
  }

  Ok(())
}

fn parse_json(input: &str, what: &str) -> Result<serde_json::Value> {
  serde_json::from_str(input).with_context(|| format!("failed to parse {} as JSON", what))
}

fn parse_field(input: &str) -> Result<NewField, String> {
  let (name, field_type) = input
    .split_once(':')
    .ok_or_else(|| format!("expected name:type, got '{}'", input))?;

  let (field_type, required) = match field_type.strip_suffix('!') {
    Some(field_type) => (field_type, true),
    None => (field_type, false),
  };
  let field_type: FieldType = field_type.parse().map_err(|e| format!("{}", e))?;

  let field = NewField::new(name, field_type);
  Ok(if required { field.required() } else { field })
}
