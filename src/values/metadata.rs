//! # Metadata
//!
//! Per-document sealing state stored under the reserved `sealit` key.

use super::node::Node;
use crate::constants::METADATA_KEY;
use crate::error::{Result, SealError};

/// Sealing state of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Secret name the values are bound to
    pub name: String,
    /// Secret namespace the values are bound to
    pub namespace: String,
    /// RFC 3339 time of the last seal
    pub sealed_at: String,
    /// PEM certificate used for the last seal
    pub cert: String,
}

impl Metadata {
    /// True for a document that was never sealed
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Read the metadata block; unknown fields are ignored
    pub(crate) fn from_node(node: &Node) -> Result<Self> {
        let mapping = match node {
            Node::Mapping(mapping) => mapping,
            Node::Scalar(scalar) if scalar.is_null() => return Ok(Self::default()),
            _ => {
                return Err(SealError::UnsupportedDocument(format!(
                    "`{METADATA_KEY}` must be a mapping"
                )))
            }
        };

        let mut metadata = Self::default();
        for entry in mapping.entries() {
            let field = match entry.key() {
                "name" => &mut metadata.name,
                "namespace" => &mut metadata.namespace,
                "sealedAt" => &mut metadata.sealed_at,
                "cert" => &mut metadata.cert,
                _ => continue,
            };
            let Some(scalar) = entry.value().as_scalar() else {
                return Err(SealError::UnsupportedDocument(format!(
                    "`{METADATA_KEY}.{}` must be a scalar",
                    entry.key()
                )));
            };
            if !scalar.is_null() {
                field.clone_from(&scalar.value);
            }
        }
        Ok(metadata)
    }
}
