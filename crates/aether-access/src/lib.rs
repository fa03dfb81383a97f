//! Access control and multi-factor authorization.
//!
//! Profiles bind each agent to a role, an access level, authorized
//! information categories and actions, and the phases it may act in. The
//! [`AuthorizationEngine`] evaluates six independent factors on every
//! privileged action and reports every failing factor, never short-circuiting.

pub mod engine;
pub mod policy_client;
pub mod profile;

pub use engine::{AuthorizationContext, AuthorizationEngine, Decision};
pub use policy_client::{PolicyClient, PolicyClientConfig};
pub use profile::{
    check_access, check_action, default_policies, default_profiles, AccessPolicy, AgentProfile,
    PolicySet,
};
