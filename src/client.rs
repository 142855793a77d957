//! Cluster client: schema management and fan-out reads and writes
//!
//! Every cluster-wide operation sends one request per node, concurrently, each
//! with a freshly minted token. A node that fails is reported in its own
//! [`NodeOutcome`] and never stops the requests to its siblings. Crypto and
//! configuration errors, on the other hand, abort before anything is sent.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use reqwest::Method;
use reqwest::header::ACCEPT;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::NodeAuthenticator;
use crate::config::{ClusterConfig, Node};
use crate::domain::{KeyConfig, KeyMode, Operation, Threshold, Topology};
use crate::error::{Error, NodeError, Result};
use crate::keys::SplittingKey;
use crate::transform;
use crate::value::{ID_FIELD, Value};

const API_PREFIX: &str = "api/v1";

/// Result of one node's part in a cluster-wide operation
#[derive(Debug, Clone)]
pub struct NodeOutcome<T> {
    /// Base URL of the node
    pub node: String,
    pub result: Result<T, NodeError>,
}

impl<T> NodeOutcome<T> {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    fn map<U>(self, f: impl FnOnce(T) -> Result<U, NodeError>) -> NodeOutcome<U> {
        NodeOutcome {
            node: self.node,
            result: self.result.and_then(f),
        }
    }
}

impl<T: Serialize> Serialize for NodeOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("node", &self.node)?;
        match &self.result {
            Ok(value) => map.serialize_entry("result", value)?,
            Err(err) => map.serialize_entry("error", &err.to_string())?,
        }
        map.end()
    }
}

/// Counts of succeeded and failed nodes
pub fn tally<T>(outcomes: &[NodeOutcome<T>]) -> (usize, usize) {
    let ok = outcomes.iter().filter(|o| o.is_ok()).count();
    (ok, outcomes.len() - ok)
}

/// Schema entry as listed by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Result of [`ClusterClient::create_schema`]
#[derive(Debug, Clone, Serialize)]
pub struct SchemaCreation {
    /// Identifier the schema was created under on every node
    pub id: String,
    pub nodes: Vec<NodeOutcome<serde_json::Value>>,
}

/// Result of [`ClusterClient::write`]
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    /// Identities of the written records, in input order
    pub ids: Vec<String>,
    pub nodes: Vec<NodeOutcome<serde_json::Value>>,
}

impl WriteOutcome {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        tally(&self.nodes).0
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        tally(&self.nodes).1
    }
}

/// A record rebuilt from the fragments of one identity
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructedRecord {
    pub record: Value,
    /// Number of nodes that returned a fragment
    pub fragments: usize,
    /// Fewer fragments than nodes were available
    pub degraded: bool,
}

/// A record group that could not be rebuilt from the fragments available
#[derive(Debug, Clone, Serialize)]
pub struct UnrecoverableRecord {
    pub id: String,
    pub fragments: usize,
    pub reason: String,
}

/// Result of [`ClusterClient::read`]
#[derive(Debug, Clone, Serialize)]
pub struct ReadOutcome {
    pub records: Vec<ReconstructedRecord>,
    pub unrecoverable: Vec<UnrecoverableRecord>,
    /// Fragments used, or the error, per node
    pub nodes: Vec<NodeOutcome<usize>>,
}

impl ReadOutcome {
    /// The rebuilt records without bookkeeping
    #[must_use]
    pub fn into_records(self) -> Vec<Value> {
        self.records.into_iter().map(|r| r.record).collect()
    }

    /// True if every node answered and every record had all its fragments
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unrecoverable.is_empty()
            && self.nodes.iter().all(NodeOutcome::is_ok)
            && self.records.iter().all(|r| !r.degraded)
    }
}

/// Client for one cluster of storage nodes
#[derive(Debug)]
pub struct ClusterClient {
    nodes: Vec<Node>,
    authenticator: NodeAuthenticator,
    key_mode: KeyMode,
    operation: Operation,
    threshold: Option<u8>,
    schema_id: Option<String>,
    key: Option<SplittingKey>,
    http: reqwest::Client,
    timeout: Duration,
}

impl ClusterClient {
    /// Builds a client from configuration; no network traffic happens here
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an invalid roster and
    /// [`Error::InvalidKeyMaterial`] for an unusable organization key
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let authenticator =
            NodeAuthenticator::from_credentials(&config.credentials, config.token_ttl_secs)?;
        let http = reqwest::Client::builder()
            .user_agent(format!("sharevault/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {e}")))?;
        let timeout = config.request_timeout();

        Ok(Self {
            nodes: config.nodes,
            authenticator,
            key_mode: config.key_mode,
            operation: config.operation,
            threshold: config.threshold,
            schema_id: config.schema_id,
            key: None,
            http,
            timeout,
        })
    }

    /// Mints a token for every node and derives the splitting key
    ///
    /// Must complete before [`write`](Self::write), [`read`](Self::read) or
    /// [`flush`](Self::flush). Calling it again replaces the key, which makes
    /// previously written secret-mode shares unreadable.
    ///
    /// # Errors
    /// Returns [`Error::InvalidKeyMaterial`] if tokens cannot be signed and
    /// [`Error::Crypto`] if the key cannot be derived for this cluster
    pub fn initialize(&mut self) -> Result<&SplittingKey> {
        let tokens = self.authenticator.issue_tokens_for_all(&self.nodes)?;
        debug!(nodes = tokens.len(), "minted node tokens");

        let topology = Topology::new(self.nodes.len())?;
        let config = match self.threshold {
            Some(t) => {
                KeyConfig::with_threshold(topology, Threshold::new(t)?, self.key_mode, self.operation)?
            }
            None => KeyConfig::new(self.nodes.len(), self.key_mode, self.operation)?,
        };
        let key = SplittingKey::generate(config)?;
        info!(
            nodes = self.nodes.len(),
            threshold = *config.threshold(),
            mode = %config.mode(),
            operation = %config.operation(),
            "cluster client initialized"
        );
        Ok(&*self.key.insert(key))
    }

    /// Selects the schema data operations apply to
    pub fn set_schema_id(&mut self, schema_id: impl Into<String>) {
        self.schema_id = Some(schema_id.into());
    }

    #[must_use]
    pub fn schema_id(&self) -> Option<&str> {
        self.schema_id.as_deref()
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn authenticator(&self) -> &NodeAuthenticator {
        &self.authenticator
    }

    /// The splitting key, once initialized
    #[must_use]
    pub fn key(&self) -> Option<&SplittingKey> {
        self.key.as_ref()
    }

    /// Creates the same schema on every node
    ///
    /// A fresh UUID is used when `id` is `None`.
    ///
    /// # Errors
    /// Only token minting errors; node failures are reported per node
    pub async fn create_schema(
        &self,
        schema: &serde_json::Value,
        name: &str,
        id: Option<&str>,
    ) -> Result<SchemaCreation> {
        let id = id.map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
        let payload = json!({
            "_id": id,
            "name": name,
            "keys": [ID_FIELD],
            "schema": schema,
        });
        let nodes = self
            .fan_out(Method::POST, "schemas", vec![Some(payload); self.nodes.len()])
            .await?;
        let (ok, failed) = tally(&nodes);
        info!(schema = %id, ok, failed, "schema created");
        Ok(SchemaCreation { id, nodes })
    }

    /// Lists the schemas known to each node
    ///
    /// # Errors
    /// Only token minting errors; node failures are reported per node
    pub async fn list_schemas(&self) -> Result<Vec<NodeOutcome<Vec<SchemaSummary>>>> {
        let outcomes = self
            .fan_out(Method::GET, "schemas", vec![None; self.nodes.len()])
            .await?;
        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                let url = outcome.node.clone();
                outcome.map(|body| data_field::<Vec<SchemaSummary>>(&url, body))
            })
            .collect())
    }

    /// Deletes a schema from every node
    ///
    /// # Errors
    /// Only token minting errors; node failures are reported per node
    pub async fn delete_schema(&self, id: &str) -> Result<Vec<NodeOutcome<serde_json::Value>>> {
        let payload = json!({ "id": id });
        let nodes = self
            .fan_out(Method::DELETE, "schemas", vec![Some(payload); self.nodes.len()])
            .await?;
        let (ok, failed) = tally(&nodes);
        info!(schema = %id, ok, failed, "schema deleted");
        Ok(nodes)
    }

    /// Splits and writes records, one share-document per record per node
    ///
    /// Records without `_id` get a fresh UUID. All share-documents are built
    /// before the first request is sent.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`], [`Error::Configuration`] without a schema,
    /// [`Error::InvalidRecord`] for non-record input or a non-text identity, and
    /// [`Error::Crypto`] if a marked field cannot be split
    pub async fn write(&self, records: Vec<Value>) -> Result<WriteOutcome> {
        let key = self.require_key()?;
        let schema = self.active_schema()?;
        let node_count = self.nodes.len();

        let mut ids = Vec::with_capacity(records.len());
        let mut per_node: Vec<Vec<serde_json::Value>> = vec![Vec::new(); node_count];
        for mut record in records {
            let id = assign_identity(&mut record)?;
            let with_shares = transform::mark_and_split(key, &record)?;
            for (idx, docs) in per_node.iter_mut().enumerate() {
                let doc = transform::project_for_node(&with_shares, idx, node_count)?;
                docs.push(serde_json::Value::from(doc));
            }
            ids.push(id);
        }

        let payloads = per_node
            .into_iter()
            .map(|data| Some(json!({ "schema": schema, "data": data })))
            .collect();
        let nodes = self.fan_out(Method::POST, "data/create", payloads).await?;
        let outcome = WriteOutcome { ids, nodes };
        info!(
            records = outcome.ids.len(),
            ok = outcome.succeeded(),
            failed = outcome.failed(),
            "records written"
        );
        Ok(outcome)
    }

    /// Reads matching fragments from every node and recombines them by identity
    ///
    /// Groups missing fragments from some nodes are still recombined and
    /// flagged `degraded`; if that fails they are listed as unrecoverable.
    /// A node repeating an identity contributes only its first fragment.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`], [`Error::Configuration`] without a
    /// schema, and [`Error::Crypto`] if a group with every fragment present
    /// fails to recombine
    pub async fn read(&self, filter: serde_json::Value) -> Result<ReadOutcome> {
        let key = self.require_key()?;
        let schema = self.active_schema()?;
        let payload = json!({ "schema": schema, "filter": filter });
        let outcomes = self
            .fan_out(Method::POST, "data/read", vec![Some(payload); self.nodes.len()])
            .await?;

        let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut nodes = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let url = outcome.node.clone();
            let outcome = outcome.map(|body| data_field::<Vec<serde_json::Value>>(&url, body));
            let counted = match outcome.result {
                Ok(fragments) => {
                    // one fragment per identity per node
                    let mut seen = HashSet::new();
                    for fragment in fragments.into_iter().map(Value::from_fragment) {
                        let Some(id) = fragment.identity().map(ToString::to_string) else {
                            warn!(node = %url, "skipping fragment without a text identity");
                            continue;
                        };
                        if !seen.insert(id.clone()) {
                            warn!(node = %url, record = %id, "skipping duplicate fragment");
                            continue;
                        }
                        let slot = *index.entry(id.clone()).or_insert_with(|| {
                            groups.push((id, Vec::new()));
                            groups.len() - 1
                        });
                        groups[slot].1.push(fragment);
                    }
                    Ok(seen.len())
                }
                Err(err) => Err(err),
            };
            nodes.push(NodeOutcome {
                node: url,
                result: counted,
            });
        }

        let node_count = self.nodes.len();
        let mut records = Vec::with_capacity(groups.len());
        let mut unrecoverable = Vec::new();
        for (id, fragments) in groups {
            let degraded = fragments.len() < node_count;
            match transform::recombine(key, &fragments) {
                Ok(record) => records.push(ReconstructedRecord {
                    record,
                    fragments: fragments.len(),
                    degraded,
                }),
                Err(err) if degraded => {
                    warn!(record = %id, fragments = fragments.len(), error = %err, "record unrecoverable");
                    unrecoverable.push(UnrecoverableRecord {
                        id,
                        fragments: fragments.len(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            records = records.len(),
            unrecoverable = unrecoverable.len(),
            "records read"
        );
        Ok(ReadOutcome {
            records,
            unrecoverable,
            nodes,
        })
    }

    /// Deletes every record of the active schema on every node
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] or [`Error::Configuration`] without a schema
    pub async fn flush(&self) -> Result<Vec<NodeOutcome<serde_json::Value>>> {
        self.require_key()?;
        let schema = self.active_schema()?;
        let payload = json!({ "schema": schema });
        let nodes = self
            .fan_out(Method::POST, "data/flush", vec![Some(payload); self.nodes.len()])
            .await?;
        let (ok, failed) = tally(&nodes);
        info!(schema, ok, failed, "schema flushed");
        Ok(nodes)
    }

    fn require_key(&self) -> Result<&SplittingKey> {
        self.key.as_ref().ok_or(Error::NotInitialized)
    }

    fn active_schema(&self) -> Result<&str> {
        self.schema_id
            .as_deref()
            .ok_or_else(|| Error::Configuration("no schema selected".into()))
    }

    /// Sends `payloads[i]` to node `i`, all nodes concurrently
    async fn fan_out(
        &self,
        method: Method,
        endpoint: &str,
        payloads: Vec<Option<serde_json::Value>>,
    ) -> Result<Vec<NodeOutcome<serde_json::Value>>> {
        let tokens = self
            .nodes
            .iter()
            .map(|node| self.authenticator.issue_token(&node.did))
            .collect::<Result<Vec<_>>>()?;

        let calls = self
            .nodes
            .iter()
            .zip(tokens)
            .zip(payloads)
            .map(|((node, token), payload)| {
                let method = method.clone();
                async move {
                    let result = self.send(node, method, endpoint, &token, payload).await;
                    if let Err(err) = &result {
                        warn!(node = %node.url, endpoint, error = %err, "node request failed");
                    }
                    NodeOutcome {
                        node: node.url.clone(),
                        result,
                    }
                }
            });
        Ok(join_all(calls).await)
    }

    async fn send(
        &self,
        node: &Node,
        method: Method,
        endpoint: &str,
        token: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, NodeError> {
        let url = format!("{}/{API_PREFIX}/{endpoint}", node.url.trim_end_matches('/'));
        debug!(%url, %method, "sending node request");

        let mut request = self
            .http
            .request(method, &url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        if let Some(payload) = &payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| NodeError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| NodeError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(NodeError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| NodeError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

/// Ensures `record` is a record with a text identity and returns it
fn assign_identity(record: &mut Value) -> Result<String> {
    let Some(fields) = record.as_record_mut() else {
        return Err(Error::InvalidRecord("top level must be an object".into()));
    };
    match fields.get(ID_FIELD) {
        None => {
            let id = Uuid::new_v4().to_string();
            fields.insert(ID_FIELD.to_string(), Value::from(id.clone()));
            Ok(id)
        }
        Some(existing) => existing.as_text().map(ToString::to_string).ok_or_else(|| {
            Error::InvalidRecord(format!("{ID_FIELD} must be plain text, got {existing:?}"))
        }),
    }
}

/// Extracts and decodes the `data` member of a node response
fn data_field<T: for<'de> Deserialize<'de>>(
    url: &str,
    mut body: serde_json::Value,
) -> Result<T, NodeError> {
    let data = body
        .get_mut("data")
        .map(serde_json::Value::take)
        .ok_or_else(|| NodeError::Decode {
            url: url.to_string(),
            message: "response has no data member".into(),
        })?;
    serde_json::from_value(data).map_err(|e| NodeError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
