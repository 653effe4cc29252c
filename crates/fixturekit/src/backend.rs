//! Target backends.
//!
//! A backend bundles the node and pod transforms, the file prefix and the
//! output shape one benchmark harness expects. It is picked once at startup.

use crate::error::{Error, Result};
use crate::generator::OutputMode;
use crate::packer::{MissPolicy, Packer};
use crate::transform::{HollowNodeTemplate, NodeVariant, PodVariant};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Nodes and pods as loaded
    #[default]
    Plain,
    /// Hollow nodes driven by kubemark
    Kubemark,
    /// Fake nodes managed by kwok
    Kwok,
    /// Offline scheduler simulator
    Simulator,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Plain,
        Backend::Kubemark,
        Backend::Kwok,
        Backend::Simulator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Plain => "plain",
            Backend::Kubemark => "kubemark",
            Backend::Kwok => "kwok",
            Backend::Simulator => "simulator",
        }
    }

    /// Prefix of every file written for this backend.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Backend::Plain => "",
            Backend::Kubemark => "kubemark-",
            Backend::Kwok => "kwok-",
            Backend::Simulator => "simulator-",
        }
    }

    /// Whether [`Backend::node_variant`] needs a hollow-node template.
    pub fn needs_template(&self) -> bool {
        matches!(self, Backend::Kubemark)
    }

    pub fn node_variant(&self, template: Option<HollowNodeTemplate>) -> Result<NodeVariant> {
        Ok(match self {
            Backend::Plain => NodeVariant::Passthrough,
            Backend::Kubemark => NodeVariant::HollowNode(template.ok_or_else(|| {
                Error::Template("the kubemark backend needs a hollow node template".to_string())
            })?),
            Backend::Kwok => NodeVariant::FakeNode,
            Backend::Simulator => NodeVariant::SimulatorNode,
        })
    }

    pub fn pod_variant(&self) -> PodVariant {
        match self {
            Backend::Plain | Backend::Simulator => PodVariant::Passthrough,
            Backend::Kubemark => PodVariant::HollowNodeAffinity,
            Backend::Kwok => PodVariant::FakeNodeToleration,
        }
    }

    /// Output mode used unless configuration overrides it.
    pub fn default_mode(&self) -> OutputMode {
        match self {
            Backend::Simulator => OutputMode::Delta,
            _ => OutputMode::Cumulative,
        }
    }

    /// Build the packer for this backend.
    pub fn packer(&self, template: Option<HollowNodeTemplate>, policy: MissPolicy) -> Result<Packer> {
        Ok(Packer::new(
            self.node_variant(template)?,
            self.pod_variant(),
            policy,
        ))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubemark_requires_template() {
        let err = Backend::Kubemark.node_variant(None).unwrap_err();
        assert!(matches!(err, Error::Template(_)));
        assert!(Backend::Kubemark.needs_template());
        assert!(!Backend::Kwok.needs_template());
    }

    #[test]
    fn test_variants_per_backend() {
        assert_eq!(Backend::Plain.node_variant(None).unwrap(), NodeVariant::Passthrough);
        assert_eq!(Backend::Kwok.node_variant(None).unwrap(), NodeVariant::FakeNode);
        assert_eq!(Backend::Kwok.pod_variant(), PodVariant::FakeNodeToleration);
        assert_eq!(
            Backend::Simulator.node_variant(None).unwrap(),
            NodeVariant::SimulatorNode
        );
        assert_eq!(Backend::Kubemark.pod_variant(), PodVariant::HollowNodeAffinity);
    }

    #[test]
    fn test_prefixes_and_modes() {
        assert_eq!(Backend::Plain.file_prefix(), "");
        assert_eq!(Backend::Kubemark.file_prefix(), "kubemark-");
        assert_eq!(Backend::Simulator.default_mode(), OutputMode::Delta);
        assert_eq!(Backend::Kwok.default_mode(), OutputMode::Cumulative);
    }

    #[test]
    fn test_backend_from_config_string() {
        let backend: Backend = serde_yaml::from_str("kwok").unwrap();
        assert_eq!(backend, Backend::Kwok);
        assert_eq!(Backend::ALL.len(), 4);
    }
}
