//! Publish decisions
//!
//! Whether a run uploads its artifact, refreshes the "latest" alias and
//! notifies the downstream verification pipeline. Branch and event
//! eligibility come from outside; this module only combines them with the
//! platform's own eligibility.

use super::platform::Platform;
use serde::{Deserialize, Serialize};

/// Inputs supplied by whoever decides branch and event eligibility
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishGate {
    /// The triggering event is one whose builds get published
    pub publishable_event: bool,
    /// The run builds the head of the primary branch
    pub primary_branch_head: bool,
    /// Name of the downstream verification consumer, if any
    pub downstream_consumer: Option<String>,
}

impl PublishGate {
    /// A gate that never publishes
    #[must_use]
    pub fn closed() -> Self {
        Self::default()
    }

    /// Upload the artifact to its versioned path
    #[must_use]
    pub fn should_upload(&self, platform: &Platform) -> bool {
        platform.publish_eligible && self.publishable_event
    }

    /// Also upload it under the "latest" alias
    #[must_use]
    pub fn should_upload_latest(&self, platform: &Platform) -> bool {
        self.should_upload(platform) && self.primary_branch_head
    }

    /// Notify the downstream verification consumer
    #[must_use]
    pub fn should_trigger_downstream(&self, platform: &Platform) -> bool {
        self.should_upload(platform) && self.downstream_consumer.is_some()
    }
}

/// Branch rules used to derive a [`PublishGate`] from a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishPolicy {
    /// Branches whose builds are published
    pub publishable_branches: Vec<String>,
    /// Primary branch; its builds also refresh "latest"
    pub default_branch: String,
    /// Downstream verification consumer
    pub downstream_consumer: Option<String>,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            publishable_branches: vec!["master".to_string()],
            default_branch: "master".to_string(),
            downstream_consumer: Some("Julia Coverage Testing".to_string()),
        }
    }
}

impl PublishPolicy {
    /// Gate for a build of `branch`
    #[must_use]
    pub fn gate_for(&self, branch: &str) -> PublishGate {
        PublishGate {
            publishable_event: self.publishable_branches.iter().any(|b| b == branch),
            primary_branch_head: branch == self.default_branch,
            downstream_consumer: self.downstream_consumer.clone(),
        }
    }
}
