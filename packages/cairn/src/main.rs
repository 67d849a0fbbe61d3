use std::io::Write;
use std::path::PathBuf;

use cairn::{ConfigLoader, Context, Key, Value};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Cairn - inspect and edit configured storages
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file; repeat to layer them, later files win
    #[arg(short, long = "config", value_name = "FILE")]
    config: Vec<PathBuf>,

    /// Directory searched for relative configuration files
    #[arg(long = "search-dir", value_name = "DIR")]
    search_dir: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get { storage: String, key: String },

    /// Store a value. Text is typed like configuration scalars
    Set {
        storage: String,
        key: String,
        value: String,
        /// Store the text as raw bytes
        #[arg(long)]
        raw: bool,
    },

    /// Delete a key
    Rm { storage: String, key: String },

    /// Print the merged configuration, or the subtree at a dotted path
    Config { path: Option<String> },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Storage(#[from] cairn::Error),

    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("cannot render value: {0}")]
    Render(#[from] serde_json::Error),

    #[error("nothing at {0}")]
    Missing(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let loader = ConfigLoader::new().with_search_dirs(args.search_dir);
    let context = cairn::bootstrap(&loader, args.config)?;
    let result = execute(&context, args.command).await;
    context.shutdown().await?;
    result
}

async fn execute(context: &Context, command: Command) -> Result<(), CliError> {
    match command {
        Command::Config { path } => {
            let value = match path.as_deref() {
                None | Some("") => context.config().to_value(),
                Some(path) => context
                    .config()
                    .get(path)
                    .cloned()
                    .ok_or_else(|| CliError::Missing(path.to_string()))?,
            };
            print_json(&value)
        }
        Command::Get { storage, key } => {
            let storage = context.resolve(&storage).await?;
            match storage.get(&Key::from(key.as_str())).await? {
                Some(Value::Bytes(bytes)) => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(&bytes)?;
                    out.flush()?;
                    Ok(())
                }
                Some(value) => print_json(&value.to_json()),
                None => Err(CliError::Missing(key)),
            }
        }
        Command::Set {
            storage,
            key,
            value,
            raw,
        } => {
            let storage = context.resolve(&storage).await?;
            let value = if raw {
                Value::Bytes(value.into_bytes())
            } else {
                Value::from_json(cairn::config::scalar::parse(&value))
            };
            storage.set(&Key::from(key.as_str()), Some(value)).await?;
            Ok(())
        }
        Command::Rm { storage, key } => {
            let storage = context.resolve(&storage).await?;
            storage.set(&Key::from(key.as_str()), None).await?;
            Ok(())
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
