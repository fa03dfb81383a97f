//! Information broker - the single entry point for cross-category reads.
//!
//! Every query is checked against the caller's profile, routed to the
//! category's backend, sanitized per category policy at the caller's access
//! level, and audited. Backends are narrow async traits; production wires
//! adapters over the real stores, tests use the in-memory implementations.

pub mod adapters;
pub mod audit;
pub mod broker;
pub mod sanitize;

pub use adapters::{
    AllocationRequest, AssetBackend, DownBackend, MemoryAssetStore, MemoryMissionStore,
    MemoryOrgStore, MemoryMetricsStore, MemorySpectrumStore, MemoryThreatStore, MissionBackend,
    OrgBackend, MetricsBackend, SourceRecord, SpectrumBackend, ThreatBackend,
};
pub use audit::{AuditEntry, AuditLog};
pub use broker::{BrokerBackends, BrokerResponse, InformationBroker};
pub use sanitize::sanitize_record;
