//! Quarry CLI — entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use quarry_cli::commands;
use quarry_cli::config::{resolve_fixture_path, resolve_schema_path};

#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Compile and evaluate resource queries against recorded data",
    version
)]
struct Cli {
    /// Path to the schema file.
    #[arg(short, long)]
    schema: Option<String>,

    /// Path to the recorded fixture file.
    #[arg(short, long)]
    fixture: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query and print the program.
    Compile {
        /// Query file holding one expression or an array of them ("-" reads stdin).
        query: String,

        /// Print the program as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compile and evaluate a query, printing results as JSON.
    Run {
        /// Query file holding one expression or an array of them ("-" reads stdin).
        query: String,

        /// Write the recorded data after evaluation to this file.
        #[arg(long)]
        record: Option<String>,
    },

    /// List the resources declared by the schema.
    Resources,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   quarry completions bash > ~/.local/share/bash-completion/completions/quarry
    ///   quarry completions zsh > ~/.zfunc/_quarry
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile { query, json } => {
            let schema_path = resolve_schema_path(cli.schema.as_deref());
            let schema = commands::load_schema(&schema_path)?;
            let exprs = commands::load_query(&query)?;
            let program = commands::compile_query(&schema, &exprs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print!("{program}");
            }
        }

        Commands::Run { query, record } => {
            let schema_path = resolve_schema_path(cli.schema.as_deref());
            let fixture_path = resolve_fixture_path(cli.fixture.as_deref());
            tracing::info!("Schema: {schema_path}");
            tracing::info!("Fixture: {fixture_path}");

            let schema = commands::load_schema(&schema_path)?;
            let exprs = commands::load_query(&query)?;
            let mut report =
                commands::run_query(schema, Some(&fixture_path), &exprs, record.is_some()).await?;

            if let (Some(path), Some(recording)) = (record, report.recording.take()) {
                std::fs::write(&path, serde_json::to_string_pretty(&recording)?)?;
                tracing::info!("Recorded data written to {path}");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.failed() > 0 {
                std::process::exit(1);
            }
        }

        Commands::Resources => {
            let schema_path = resolve_schema_path(cli.schema.as_deref());
            let schema = commands::load_schema(&schema_path)?;
            let info = commands::list_resources(&schema);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "quarry", &mut std::io::stdout());
        }
    }

    Ok(())
}
