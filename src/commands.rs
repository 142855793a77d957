use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::client::ClusterClient;
use crate::value::Value;

/// Parse a JSON array of records
///
/// # Errors
/// Returns an error if the text is not JSON or not an array of objects
pub fn parse_records(raw: &str) -> Result<Vec<Value>> {
    let parsed: serde_json::Value =
        serde_json::from_str(raw).context("Failed to parse records as JSON")?;
    let serde_json::Value::Array(items) = parsed else {
        bail!("Records must be a JSON array");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            if !item.is_object() {
                bail!("Record #{} is not a JSON object", idx + 1);
            }
            Ok(Value::from(item))
        })
        .collect()
}

fn read_json_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Mint a token for every node, keyed by node DID
///
/// # Errors
/// Returns an error if the organization key cannot sign
pub fn issue_tokens(client: &ClusterClient) -> Result<serde_json::Value> {
    let tokens = client
        .authenticator()
        .issue_tokens_for_all(client.nodes())
        .context("Failed to mint node tokens")?;
    Ok(serde_json::to_value(tokens)?)
}

/// List the schemas of every node
///
/// # Errors
/// Returns an error if tokens cannot be minted
pub async fn list_schemas(client: &ClusterClient) -> Result<serde_json::Value> {
    let outcomes = client
        .list_schemas()
        .await
        .context("Failed to list schemas")?;
    Ok(serde_json::to_value(outcomes)?)
}

/// Create the schema defined in `path` on every node
///
/// # Errors
/// Returns an error if the schema file cannot be read or parsed, or tokens cannot be minted
pub async fn create_schema(
    client: &ClusterClient,
    name: &str,
    path: &Path,
    id: Option<&str>,
) -> Result<serde_json::Value> {
    let schema: serde_json::Value = serde_json::from_str(&read_json_file(path)?)
        .with_context(|| format!("Failed to parse schema in {}", path.display()))?;
    let created = client
        .create_schema(&schema, name, id)
        .await
        .context("Failed to create schema")?;
    Ok(serde_json::to_value(created)?)
}

/// Delete a schema from every node
///
/// # Errors
/// Returns an error if tokens cannot be minted
pub async fn delete_schema(client: &ClusterClient, id: &str) -> Result<serde_json::Value> {
    let outcomes = client
        .delete_schema(id)
        .await
        .context("Failed to delete schema")?;
    Ok(serde_json::to_value(outcomes)?)
}

/// Write the records stored in `path`
///
/// # Errors
/// Returns an error if the file is not a JSON array of records or a record cannot be split
pub async fn write_records(client: &ClusterClient, path: &Path) -> Result<serde_json::Value> {
    let records = parse_records(&read_json_file(path)?)
        .with_context(|| format!("Invalid records in {}", path.display()))?;
    if records.is_empty() {
        bail!("No records to write");
    }
    let outcome = client
        .write(records)
        .await
        .context("Failed to write records")?;
    if outcome.failed() > 0 {
        tracing::warn!(
            failed = outcome.failed(),
            "some nodes did not store their shares"
        );
    }
    Ok(serde_json::to_value(outcome)?)
}

/// Read and recombine the records matching `filter`
///
/// # Errors
/// Returns an error if a complete record group fails to recombine
pub async fn read_records(
    client: &ClusterClient,
    filter: serde_json::Value,
) -> Result<serde_json::Value> {
    let outcome = client
        .read(filter)
        .await
        .context("Failed to read records")?;
    Ok(serde_json::to_value(outcome)?)
}

/// Delete every record of the active schema
///
/// # Errors
/// Returns an error if no schema is selected or tokens cannot be minted
pub async fn flush(client: &ClusterClient) -> Result<serde_json::Value> {
    let outcomes = client.flush().await.context("Failed to flush schema")?;
    Ok(serde_json::to_value(outcomes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, Credentials, Node};

    fn client() -> ClusterClient {
        let nodes = vec![
            Node::new("https://a.example.com", "did:nil:a"),
            Node::new("https://b.example.com", "did:nil:b"),
        ];
        let creds = Credentials::new(
            "did:nil:org",
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        );
        ClusterClient::new(ClusterConfig::new(nodes, creds)).unwrap()
    }

    #[test]
    fn test_parse_records() {
        let records = parse_records(r#"[{"name": {"%allot": "Alice"}}, {"_id": "b"}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].has_marked());
        assert_eq!(records[1].identity(), Some("b"));
    }

    #[test]
    fn test_parse_records_requires_array() {
        let result = parse_records(r#"{"name": "Alice"}"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must be a JSON array")
        );
    }

    #[test]
    fn test_parse_records_rejects_scalars() {
        let result = parse_records(r#"[{"a": 1}, 2]"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Record #2 is not a JSON object")
        );
    }

    #[test]
    fn test_parse_records_invalid_json() {
        assert!(parse_records("[{").is_err());
    }

    #[test]
    fn test_issue_tokens_one_per_node() {
        let tokens = issue_tokens(&client()).unwrap();
        let tokens = tokens.as_object().unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(tokens["did:nil:a"].as_str().unwrap().split('.').count() == 3);
    }

    #[tokio::test]
    async fn test_write_missing_file() {
        let result = write_records(&client(), Path::new("/nonexistent/records.json")).await;
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }
}
