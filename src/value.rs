//! Record tree with explicit marked fields
//!
//! Records travel as JSON, but inside the crate they are a tagged tree so that
//! marked fields are a variant rather than a shape to sniff for. A JSON object
//! whose only key is [`MARKER`] becomes [`Value::Marked`]. Fragments read back
//! from nodes go through [`Value::from_fragment`], which also accepts
//! [`SHARE_MARKER`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key wrapping a value that must be secret-split
pub const MARKER: &str = "%allot";

/// Alias some node deployments store shares under
///
/// Only recognized in fragments parsed with [`Value::from_fragment`]; in caller
/// records `{"%share": ..}` is an ordinary object.
pub const SHARE_MARKER: &str = "%share";

/// Field holding a record's identity
pub const ID_FIELD: &str = "_id";

/// Named fields of a record
pub type Fields = BTreeMap<String, Value>;

/// Leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    /// Integer above `i64::MAX`
    UInt(u64),
    Float(f64),
    Text(String),
}

/// A node of a record tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Scalar(Scalar),
    /// Field flagged for secret splitting; holds the plaintext, the share
    /// sequence after splitting, or a single share in a share-document
    Marked(Box<Value>),
    Sequence(Vec<Value>),
    Record(Fields),
}

/// One step from a container to a child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// Location of a node inside a record tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path(Vec<Segment>);

impl Path {
    fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl Value {
    /// Wraps `inner` as a marked field
    #[must_use]
    pub fn marked(inner: impl Into<Value>) -> Self {
        Self::Marked(Box::new(inner.into()))
    }

    /// Fields of a record, or `None` for any other variant
    #[must_use]
    pub fn as_record(&self) -> Option<&Fields> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Mutable fields of a record
    pub fn as_record_mut(&mut self) -> Option<&mut Fields> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Text content of a scalar string
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Identity of a record, if it carries a textual `_id`
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.as_record()?.get(ID_FIELD)?.as_text()
    }

    /// Node at `path`, if the tree has that shape
    #[must_use]
    pub fn at(&self, path: &Path) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| match (node, segment) {
                (Self::Record(fields), Segment::Field(name)) => fields.get(name),
                (Self::Sequence(items), Segment::Index(idx)) => items.get(*idx),
                _ => None,
            })
    }

    /// True if any marked field exists anywhere in the tree
    #[must_use]
    pub fn has_marked(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Marked(_) => true,
            Self::Sequence(items) => items.iter().any(Self::has_marked),
            Self::Record(fields) => fields.values().any(Self::has_marked),
        }
    }

    /// Rebuilds the tree, replacing every marked field
    ///
    /// Depth-first; `visit` receives the location and content of each marked
    /// field and returns the node that takes its place. Marked fields are not
    /// descended into. Everything else is copied as is.
    ///
    /// # Errors
    /// Propagates the first error returned by `visit`
    pub fn map_marked<E, F>(&self, mut visit: F) -> Result<Value, E>
    where
        F: FnMut(&Path, &Value) -> Result<Value, E>,
    {
        let mut path = Path::default();
        self.map_marked_at(&mut path, &mut visit)
    }

    fn map_marked_at<E, F>(&self, path: &mut Path, visit: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Path, &Value) -> Result<Value, E>,
    {
        match self {
            Self::Scalar(_) => Ok(self.clone()),
            Self::Marked(inner) => visit(path, inner),
            Self::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    path.push(Segment::Index(idx));
                    let mapped = item.map_marked_at(path, visit);
                    path.pop();
                    out.push(mapped?);
                }
                Ok(Self::Sequence(out))
            }
            Self::Record(fields) => {
                let mut out = Fields::new();
                for (name, field) in fields {
                    path.push(Segment::Field(name.clone()));
                    let mapped = field.map_marked_at(path, visit);
                    path.pop();
                    out.insert(name.clone(), mapped?);
                }
                Ok(Self::Record(out))
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Scalar(Scalar::Text(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Scalar(Scalar::Text(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Scalar(Scalar::Int(n))
    }
}

impl Value {
    /// Parses a share-document returned by a node
    ///
    /// Same as `From<serde_json::Value>`, except that [`SHARE_MARKER`] is
    /// accepted as a marker key next to [`MARKER`].
    #[must_use]
    pub fn from_fragment(json: serde_json::Value) -> Self {
        Self::from_json(json, &[MARKER, SHARE_MARKER])
    }

    fn from_json(json: serde_json::Value, markers: &[&str]) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Scalar(Scalar::Null),
            Json::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Json::Number(n) => Self::Scalar(match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Scalar::Int(i),
                (None, Some(u)) => Scalar::UInt(u),
                (None, None) => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Json::String(s) => Self::Scalar(Scalar::Text(s)),
            Json::Array(items) => Self::Sequence(
                items
                    .into_iter()
                    .map(|item| Self::from_json(item, markers))
                    .collect(),
            ),
            Json::Object(mut map) => {
                if map.len() == 1 {
                    for key in markers {
                        if let Some(inner) = map.remove(*key) {
                            return Self::marked(Self::from_json(inner, markers));
                        }
                    }
                }
                Self::Record(
                    map.into_iter()
                        .map(|(k, v)| (k, Self::from_json(v, markers)))
                        .collect(),
                )
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json, &[MARKER])
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Value::Scalar(Scalar::Null) => Json::Null,
            Value::Scalar(Scalar::Bool(b)) => Json::Bool(b),
            Value::Scalar(Scalar::Int(i)) => Json::from(i),
            Value::Scalar(Scalar::UInt(u)) => Json::from(u),
            Value::Scalar(Scalar::Float(f)) => {
                serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number)
            }
            Value::Scalar(Scalar::Text(s)) => Json::String(s),
            Value::Marked(inner) => {
                let mut map = serde_json::Map::new();
                map.insert(MARKER.to_string(), Self::from(*inner));
                Json::Object(map)
            }
            Value::Sequence(items) => Json::Array(items.into_iter().map(Self::from).collect()),
            Value::Record(fields) => Json::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}
