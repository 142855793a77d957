use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parses a JSON document given on the command line
fn parse_json(s: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("'{s}' is not valid JSON: {e}"))
}

#[derive(Parser)]
#[command(name = "sharevault")]
#[command(version)]
#[command(about = "Store records with secret-shared fields across a cluster of storage nodes")]
pub struct Cli {
    /// Cluster configuration file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Schema to operate on, overriding the configuration file
    #[arg(short, long, global = true)]
    pub schema: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mint and print a token for every node
    Tokens,
    /// Manage schemas on every node
    Schemas {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// Write the records of a JSON array file, splitting marked fields
    Write {
        /// File holding a JSON array of records
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Read and recombine records matching a filter
    Read {
        /// Node-side filter as a JSON object
        #[arg(short, long, value_parser = parse_json, default_value = "{}")]
        filter: serde_json::Value,
    },
    /// Delete every record of the schema on every node
    Flush,
}

#[derive(Subcommand)]
pub enum SchemaAction {
    /// List the schemas of every node
    List,
    /// Create a schema on every node
    Create {
        /// Human-readable schema name
        #[arg(short, long)]
        name: String,

        /// File holding the JSON schema definition
        #[arg(short, long)]
        file: PathBuf,

        /// Schema identifier; a UUID is generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a schema from every node
    Delete {
        /// Schema identifier
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read_with_filter() {
        let cli = Cli::try_parse_from([
            "sharevault",
            "--config",
            "cluster.json",
            "read",
            "--filter",
            r#"{"_id": "abc"}"#,
        ])
        .unwrap();
        let Commands::Read { filter } = cli.command else {
            panic!("expected read command");
        };
        assert_eq!(filter["_id"], "abc");
    }

    #[test]
    fn test_read_filter_defaults_to_empty() {
        let cli = Cli::try_parse_from(["sharevault", "-c", "c.json", "read"]).unwrap();
        let Commands::Read { filter } = cli.command else {
            panic!("expected read command");
        };
        assert_eq!(filter, serde_json::json!({}));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result =
            Cli::try_parse_from(["sharevault", "-c", "c.json", "read", "--filter", "{nope"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["sharevault", "flush"]).is_err());
    }

    #[test]
    fn test_schema_delete() {
        let cli = Cli::try_parse_from([
            "sharevault",
            "-c",
            "c.json",
            "--schema",
            "s1",
            "schemas",
            "delete",
            "old",
        ])
        .unwrap();
        assert_eq!(cli.schema.as_deref(), Some("s1"));
        assert!(matches!(
            cli.command,
            Commands::Schemas {
                action: SchemaAction::Delete { ref id }
            } if id == "old"
        ));
    }
}
