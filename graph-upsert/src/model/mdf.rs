//! [`ModelIndex`] over MDF (model description format) YAML files.
//!
//! The model file declares nodes and relationships:
//!
//! ```yaml
//! Nodes:
//!   study:
//!     Props: [study_id, guid]
//!   sample:
//!     Props: [sample_id, guid, sample_type]
//! Relationships:
//!   of_study:
//!     Mul: many_to_one
//!     Ends:
//!       - Src: sample
//!         Dst: study
//! ```
//!
//! The properties file holds `PropDefinitions` with `Type`, `Req`, `Key` and
//! optionally `Enum`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use super::{ModelIndex, Multiplicity};
use crate::errors::{LoaderError, Result};

const DEFAULT_MULTIPLICITY: Multiplicity = Multiplicity::ManyToOne;

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(rename = "Handle", default)]
    handle: Option<String>,
    #[serde(rename = "Nodes", default)]
    nodes: Mapping,
    #[serde(rename = "Relationships", default)]
    relationships: Mapping,
}

#[derive(Debug, Default, Deserialize)]
struct RawNode {
    #[serde(rename = "Props", default)]
    props: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    #[serde(rename = "Mul", default)]
    mul: Option<String>,
    #[serde(rename = "Ends", default)]
    ends: Vec<RawEnd>,
}

#[derive(Debug, Deserialize)]
struct RawEnd {
    #[serde(rename = "Src")]
    src: String,
    #[serde(rename = "Dst")]
    dst: String,
    #[serde(rename = "Mul", default)]
    mul: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProps {
    #[serde(rename = "PropDefinitions", default)]
    prop_definitions: BTreeMap<String, RawProp>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProp {
    #[serde(rename = "Type", default)]
    ty: Option<Value>,
    #[serde(rename = "Enum", default)]
    enumeration: Option<Vec<Value>>,
    #[serde(rename = "Req", default)]
    req: Option<Value>,
    #[serde(rename = "Key", default)]
    key: Option<bool>,
}

#[derive(Debug, Clone)]
struct NodeDef {
    name: String,
    props: Vec<String>,
}

#[derive(Debug, Clone)]
struct EdgeDef {
    handle: String,
    src: String,
    dst: String,
    multiplicity: Multiplicity,
}

#[derive(Debug, Clone, Default)]
struct PropDef {
    required: bool,
    key: bool,
    values: Option<Vec<String>>,
}

/// Data model loaded from an MDF model file and its properties file.
#[derive(Debug, Clone)]
pub struct MdfModel {
    handle: Option<String>,
    nodes: Vec<NodeDef>,
    edges: Vec<EdgeDef>,
    props: BTreeMap<String, PropDef>,
}

impl MdfModel {
    /// Load from a model file and a properties file on disk.
    pub fn from_files(model_file: impl AsRef<Path>, props_file: impl AsRef<Path>) -> Result<Self> {
        let model = std::fs::read_to_string(model_file)?;
        let props = std::fs::read_to_string(props_file)?;
        Self::from_yaml_str(&model, &props)
    }

    /// Parse the model and properties YAML documents.
    pub fn from_yaml_str(model_yaml: &str, props_yaml: &str) -> Result<Self> {
        let raw: RawModel = serde_yaml::from_str(model_yaml)?;
        let raw_props: RawProps = if props_yaml.trim().is_empty() {
            RawProps {
                prop_definitions: BTreeMap::new(),
            }
        } else {
            serde_yaml::from_str(props_yaml)?
        };

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for (name, body) in raw.nodes {
            let name = mapping_key(&name, "Nodes")?;
            let node: RawNode = if body.is_null() {
                RawNode::default()
            } else {
                serde_yaml::from_value(body)?
            };
            nodes.push(NodeDef {
                name,
                props: node.props.unwrap_or_default(),
            });
        }

        let mut edges = Vec::new();
        for (handle, body) in raw.relationships {
            let handle = mapping_key(&handle, "Relationships")?;
            let rel: RawRelationship = serde_yaml::from_value(body)?;
            let default_mul = match rel.mul.as_deref() {
                Some(m) => m.parse()?,
                None => DEFAULT_MULTIPLICITY,
            };
            for end in rel.ends {
                let multiplicity = match end.mul.as_deref() {
                    Some(m) => m.parse()?,
                    None => default_mul,
                };
                edges.push(EdgeDef {
                    handle: handle.clone(),
                    src: end.src,
                    dst: end.dst,
                    multiplicity,
                });
            }
        }

        let props = raw_props
            .prop_definitions
            .into_iter()
            .map(|(name, raw)| (name, prop_def(raw)))
            .collect();

        Ok(Self {
            handle: raw.handle,
            nodes,
            edges,
            props,
        })
    }

    /// Model handle, if the file declares one.
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    fn node(&self, name: &str) -> Result<&NodeDef> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| LoaderError::lookup(format!("node '{name}' not found in the model")))
    }

    fn edge(&self, src: &str, dst: &str) -> Result<&EdgeDef> {
        self.edges
            .iter()
            .find(|e| e.src == src && e.dst == dst)
            .ok_or_else(|| {
                LoaderError::lookup(format!(
                    "relationship from '{src}' to '{dst}' not found in the model"
                ))
            })
    }

    fn node_prop(&self, node: &str, prop: &str) -> Result<&PropDef> {
        let def = self.node(node)?;
        if !def.props.iter().any(|p| p == prop) {
            return Err(LoaderError::lookup(format!(
                "node '{node}' has no property '{prop}'"
            )));
        }
        self.props.get(prop).ok_or_else(|| {
            LoaderError::lookup(format!("property '{prop}' has no definition"))
        })
    }
}

impl ModelIndex for MdfModel {
    fn edge_handle(&self, src: &str, dst: &str) -> Result<&str> {
        self.edge(src, dst).map(|e| e.handle.as_str())
    }

    fn multiplicity(&self, src: &str, dst: &str) -> Result<Multiplicity> {
        self.edge(src, dst).map(|e| e.multiplicity)
    }

    fn parents(&self, node: &str) -> Result<BTreeSet<String>> {
        self.node(node)?;
        Ok(self
            .edges
            .iter()
            .filter(|e| e.src == node)
            .map(|e| e.dst.clone())
            .collect())
    }

    fn children(&self, node: &str) -> Result<BTreeSet<String>> {
        self.node(node)?;
        Ok(self
            .edges
            .iter()
            .filter(|e| e.dst == node)
            .map(|e| e.src.clone())
            .collect())
    }

    fn root(&self) -> Result<&str> {
        self.nodes
            .iter()
            .find(|n| !self.edges.iter().any(|e| e.src == n.name))
            .map(|n| n.name.as_str())
            .ok_or_else(|| LoaderError::lookup("no root node found in the model"))
    }

    fn required_props(&self, node: &str) -> Result<BTreeSet<String>> {
        let def = self.node(node)?;
        Ok(def
            .props
            .iter()
            .filter(|p| self.props.get(p.as_str()).is_some_and(|d| d.required))
            .cloned()
            .collect())
    }

    fn key_prop(&self, node: &str) -> Result<&str> {
        let def = self.node(node)?;
        def.props
            .iter()
            .find(|p| self.props.get(p.as_str()).is_some_and(|d| d.key))
            .map(String::as_str)
            .ok_or_else(|| LoaderError::lookup(format!("node '{node}' has no key property")))
    }

    fn permissible_values(&self, node: &str, prop: &str) -> Result<Option<&[String]>> {
        Ok(self.node_prop(node, prop)?.values.as_deref())
    }
}

fn mapping_key(key: &Value, section: &str) -> Result<String> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| LoaderError::lookup(format!("non-string key in '{section}'")))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_list(values: &[Value]) -> Vec<String> {
    values.iter().filter_map(scalar_text).collect()
}

/// `Req` is either a boolean or one of `Yes` / `No` / `Preferred`.
fn is_required(req: Option<&Value>) -> bool {
    match req {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "yes" | "true"),
        _ => false,
    }
}

fn prop_def(raw: RawProp) -> PropDef {
    let mut values = raw.enumeration.as_deref().map(value_list);

    if values.is_none() {
        values = match &raw.ty {
            Some(Value::Sequence(seq)) => Some(value_list(seq)),
            Some(Value::Mapping(map)) => ["Enum", "item_type"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_sequence))
                .map(|seq| value_list(seq)),
            _ => None,
        };
    }

    PropDef {
        required: is_required(raw.req.as_ref()),
        key: raw.key.unwrap_or(false),
        values,
    }
}
