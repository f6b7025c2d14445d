//! # Scope
//!
//! The `(name, namespace)` pair a sealed value is bound to, and the
//! encryption label derived from it.

use std::fmt;

use crate::values::Metadata;

/// How narrowly a sealed value is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Bound to one secret name in one namespace
    Strict,
    /// Bound to any secret name in one namespace
    NamespaceWide,
    /// Decryptable under any name and namespace
    ClusterWide,
}

/// Secret owner scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub namespace: String,
}

impl Scope {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Scope recorded in a document's metadata block
    pub fn of(metadata: &Metadata) -> Self {
        Self::new(metadata.name.clone(), metadata.namespace.clone())
    }

    pub fn kind(&self) -> ScopeKind {
        match (self.name.is_empty(), self.namespace.is_empty()) {
            (false, false) => ScopeKind::Strict,
            (true, false) => ScopeKind::NamespaceWide,
            _ => ScopeKind::ClusterWide,
        }
    }

    /// Encryption label bound into every sealed value.
    ///
    /// `namespace/name` for strict scope, `namespace` for namespace-wide
    /// scope, empty for cluster-wide scope.
    pub fn label(&self) -> String {
        match self.kind() {
            ScopeKind::Strict => format!("{}/{}", self.namespace, self.name),
            ScopeKind::NamespaceWide => self.namespace.clone(),
            ScopeKind::ClusterWide => String::new(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ScopeKind::Strict => write!(f, "secret {}/{}", self.namespace, self.name),
            ScopeKind::NamespaceWide => write!(f, "namespace {}", self.namespace),
            ScopeKind::ClusterWide => f.write_str("cluster-wide"),
        }
    }
}
