use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Namespaced identifier for a log, stream or consumer group.
///
/// The urn form is `namespace/label`. Using the same `Name` across append,
/// tail and lag queries is what keeps unrelated topologies from colliding
/// on a shared backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    urn: String,
}

impl Name {
    pub fn of(namespace: &str, label: &str) -> Self {
        Self {
            urn: format!("{}/{}", namespace, label),
        }
    }

    pub fn of_urn(urn: impl Into<String>) -> Self {
        Self { urn: urn.into() }
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Namespace part of the urn, empty for an un-namespaced name.
    pub fn namespace(&self) -> &str {
        match self.urn.split_once('/') {
            Some((ns, _)) => ns,
            None => "",
        }
    }

    /// Label part of the urn.
    pub fn label(&self) -> &str {
        match self.urn.split_once('/') {
            Some((_, label)) => label,
            None => &self.urn,
        }
    }

    /// Identifier safe for file system paths and backend registries.
    pub fn id(&self) -> String {
        self.urn.replace('/', "-")
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn)
    }
}
