use std::io::{self, BufRead};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use sharevault::ClusterClient;
use sharevault::cli::{Cli, Commands, SchemaAction};
use sharevault::commands;
use sharevault::config::{ClusterConfig, ENV_SECRET_KEY};

/// Read the organization private key from stdin (hidden input when TTY available)
fn read_secret_key() -> Result<Zeroizing<String>> {
    if atty::is(atty::Stream::Stdin) {
        eprintln!("Enter organization private key (hex), or set {ENV_SECRET_KEY}:");
        rpassword::read_password()
            .map(Zeroizing::new)
            .context("Failed to read private key from stdin")
    } else {
        let stdin = io::stdin();
        let mut handle = stdin.lock();
        let mut key = Zeroizing::new(String::new());
        handle
            .read_line(&mut key)
            .context("Failed to read private key from stdin")?;
        Ok(Zeroizing::new(key.trim().to_string()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ClusterConfig> {
    let mut config = ClusterConfig::from_file(&cli.config)
        .context("Failed to load cluster configuration")?
        .with_env_overrides();
    if let Some(schema) = &cli.schema {
        config = config.with_schema_id(schema);
    }
    if config.credentials.secret_key.trim().is_empty() {
        config.credentials.secret_key = read_secret_key()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut client = ClusterClient::new(config).context("Failed to set up cluster client")?;

    let output = match cli.command {
        Commands::Tokens => commands::issue_tokens(&client)?,
        Commands::Schemas { action } => match action {
            SchemaAction::List => commands::list_schemas(&client).await?,
            SchemaAction::Create { name, file, id } => {
                commands::create_schema(&client, &name, &file, id.as_deref()).await?
            }
            SchemaAction::Delete { id } => commands::delete_schema(&client, &id).await?,
        },
        Commands::Write { file } => {
            client.initialize().context("Failed to initialize cluster client")?;
            commands::write_records(&client, &file).await?
        }
        Commands::Read { filter } => {
            client.initialize().context("Failed to initialize cluster client")?;
            commands::read_records(&client, filter).await?
        }
        Commands::Flush => {
            client.initialize().context("Failed to initialize cluster client")?;
            commands::flush(&client).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
