//! Context provisioning.
//!
//! Builds bounded, phase-templated context windows under a token budget,
//! stamps every element with a globally unique typed ID, and tracks how much
//! of the provisioned context each agent response actually used. Utilization
//! feeds back into template tuning.

pub mod element;
pub mod provisioner;
pub mod template;
pub mod tracker;
pub mod window;

pub use element::{element_content, ElementIdGenerator};
pub use provisioner::{CollaborationSource, ContextProvisioner, NoCollaboration, RefreshTrigger};
pub use template::{ContextTemplate, LayerSplit};
pub use tracker::{Embedder, UsageReport, UtilizationTracker};
pub use window::{AgentContext, ContextLayer};
