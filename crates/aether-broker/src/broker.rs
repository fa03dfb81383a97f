//! The category-routed query facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;

use aether_access::{check_access, AgentProfile, PolicySet};
use aether_doctrine::DoctrineKb;
use aether_types::{AetherError, Clock, InformationCategory, Result};

use crate::adapters::{
    AllocationRequest, AssetBackend, MissionBackend, OrgBackend, MetricsBackend, SourceRecord,
    SpectrumBackend, ThreatBackend,
};
use crate::audit::AuditLog;
use crate::sanitize::sanitize_record;

/// The set of backend adapters the broker routes to.
pub struct BrokerBackends {
    pub threat: Arc<dyn ThreatBackend>,
    pub spectrum: Arc<dyn SpectrumBackend>,
    pub asset: Arc<dyn AssetBackend>,
    pub mission: Arc<dyn MissionBackend>,
    pub org: Arc<dyn OrgBackend>,
    pub metrics: Arc<dyn MetricsBackend>,
}

/// Result of a brokered query: sanitized records plus the backend IDs
/// supplied, for citation tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerResponse {
    pub category: InformationCategory,
    pub records: Vec<SourceRecord>,
    pub element_ids: Vec<String>,
    pub sanitized: bool,
}

/// Single entry point for all cross-category reads.
///
/// Order of operations per query: authorize, route, sanitize, audit, return.
/// The broker never retries a backend; retry policy belongs to the caller.
pub struct InformationBroker {
    policies: PolicySet,
    doctrine: Arc<DoctrineKb>,
    backends: BrokerBackends,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    backend_deadline: Duration,
    spectrum_conflicts: AtomicUsize,
    reservation_denials: AtomicUsize,
}

impl InformationBroker {
    pub fn new(
        policies: PolicySet,
        doctrine: Arc<DoctrineKb>,
        backends: BrokerBackends,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            doctrine,
            backends,
            audit,
            clock,
            backend_deadline: Duration::from_secs(5),
            spectrum_conflicts: AtomicUsize::new(0),
            reservation_denials: AtomicUsize::new(0),
        }
    }

    pub fn with_backend_deadline(mut self, deadline: Duration) -> Self {
        self.backend_deadline = deadline;
        self
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Query `category` on behalf of `profile`.
    pub async fn query(
        &self,
        profile: &AgentProfile,
        category: InformationCategory,
        params: &Value,
        current_phase: Option<aether_types::AtoPhase>,
    ) -> Result<BrokerResponse> {
        let policy = self
            .policies
            .get(category)
            .ok_or_else(|| AetherError::Unauthorized {
                reasons: vec![format!("no access policy for category {category}")],
            })?
            .clone();

        if let Err(reason) = check_access(profile, &self.policies, category, current_phase) {
            if policy.audit {
                self.audit
                    .append(
                        self.clock.now(),
                        &profile.id,
                        category,
                        summarize(params),
                        format!("denied: {reason}"),
                        profile.access_level,
                        false,
                    )
                    .await;
            }
            return Err(AetherError::Unauthorized {
                reasons: vec![reason],
            });
        }

        let mut records = self.route(category, params).await?;

        let mut sanitized = false;
        if policy.sanitize {
            for record in &mut records {
                sanitized |= sanitize_record(category, &mut record.body, profile.access_level);
            }
        }

        if policy.audit {
            self.audit
                .append(
                    self.clock.now(),
                    &profile.id,
                    category,
                    summarize(params),
                    "granted".to_string(),
                    profile.access_level,
                    sanitized,
                )
                .await;
        }

        let element_ids = records.iter().map(|r| r.id.clone()).collect();
        Ok(BrokerResponse {
            category,
            records,
            element_ids,
            sanitized,
        })
    }

    async fn route(
        &self,
        category: InformationCategory,
        params: &Value,
    ) -> Result<Vec<SourceRecord>> {
        let deadline = self.backend_deadline;
        let result = match category {
            InformationCategory::Doctrine => {
                let text = params
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let top_k = params
                    .get("top_k")
                    .and_then(Value::as_u64)
                    .unwrap_or(5) as usize;
                let filters = params.get("filters");
                let passages = timeout(deadline, self.doctrine.query(text, filters, top_k))
                    .await
                    .map_err(|_| AetherError::unavailable(category.to_string()))??;
                return Ok(passages
                    .into_iter()
                    .map(|p| {
                        let relevance = p.score;
                        SourceRecord {
                            id: p.id.clone(),
                            relevance,
                            body: serde_json::json!({
                                "content": p.content,
                                "source": p.source,
                                "metadata": p.metadata,
                            }),
                        }
                    })
                    .collect());
            }
            InformationCategory::ThreatData => {
                timeout(deadline, self.backends.threat.query(params)).await
            }
            InformationCategory::SpectrumAllocation => {
                timeout(deadline, self.backends.spectrum.query(params)).await
            }
            InformationCategory::AssetStatus => {
                timeout(deadline, self.backends.asset.query_availability(params)).await
            }
            InformationCategory::MissionPlan => {
                timeout(deadline, self.backends.mission.query(params)).await
            }
            InformationCategory::Organizational => {
                timeout(deadline, self.backends.org.query(params)).await
            }
            InformationCategory::ProcessMetrics => {
                timeout(deadline, self.backends.metrics.query(params)).await
            }
        };

        result.map_err(|_| AetherError::unavailable(category.to_string()))?
    }

    /// Check spectrum conflicts for a range and window, counting hits toward
    /// the per-cycle deconfliction telemetry.
    pub async fn check_spectrum_conflicts(
        &self,
        profile: &AgentProfile,
        range_mhz: (f64, f64),
        window: (DateTime<Utc>, DateTime<Utc>),
        current_phase: Option<aether_types::AtoPhase>,
    ) -> Result<Vec<SourceRecord>> {
        check_access(
            profile,
            &self.policies,
            InformationCategory::SpectrumAllocation,
            current_phase,
        )
        .map_err(|reason| AetherError::Unauthorized {
            reasons: vec![reason],
        })?;

        let conflicts = timeout(
            self.backend_deadline,
            self.backends.spectrum.check_conflicts(range_mhz, window),
        )
        .await
        .map_err(|_| AetherError::unavailable("spectrum_allocation"))??;

        if !conflicts.is_empty() {
            self.spectrum_conflicts
                .fetch_add(conflicts.len(), Ordering::Relaxed);
        }
        Ok(conflicts)
    }

    /// Create a spectrum allocation through the backend.
    pub async fn create_spectrum_allocation(
        &self,
        profile: &AgentProfile,
        request: AllocationRequest,
        current_phase: Option<aether_types::AtoPhase>,
    ) -> Result<SourceRecord> {
        check_access(
            profile,
            &self.policies,
            InformationCategory::SpectrumAllocation,
            current_phase,
        )
        .map_err(|reason| AetherError::Unauthorized {
            reasons: vec![reason],
        })?;

        timeout(
            self.backend_deadline,
            self.backends.spectrum.create_allocation(request),
        )
        .await
        .map_err(|_| AetherError::unavailable("spectrum_allocation"))?
    }

    /// Reserve an asset; denials count toward resource-bottleneck telemetry.
    pub async fn reserve_asset(
        &self,
        profile: &AgentProfile,
        asset_id: &str,
        mission_id: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
        current_phase: Option<aether_types::AtoPhase>,
    ) -> Result<bool> {
        check_access(
            profile,
            &self.policies,
            InformationCategory::AssetStatus,
            current_phase,
        )
        .map_err(|reason| AetherError::Unauthorized {
            reasons: vec![reason],
        })?;

        let granted = timeout(
            self.backend_deadline,
            self.backends.asset.reserve(asset_id, mission_id, window),
        )
        .await
        .map_err(|_| AetherError::unavailable("asset_status"))??;

        if !granted {
            self.reservation_denials.fetch_add(1, Ordering::Relaxed);
        }
        Ok(granted)
    }

    /// Spectrum conflicts observed since the last reset.
    pub fn spectrum_conflict_count(&self) -> usize {
        self.spectrum_conflicts.load(Ordering::Relaxed)
    }

    /// Asset-reservation denials observed since the last reset.
    pub fn reservation_denial_count(&self) -> usize {
        self.reservation_denials.load(Ordering::Relaxed)
    }

    /// Reset per-cycle telemetry counters. Called on cycle restart.
    pub fn reset_cycle_counters(&self) {
        self.spectrum_conflicts.store(0, Ordering::Relaxed);
        self.reservation_denials.store(0, Ordering::Relaxed);
    }
}

fn summarize(params: &Value) -> String {
    let text = params.to_string();
    if text.chars().count() > 160 {
        let clipped: String = text.chars().take(160).collect();
        format!("{clipped}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use aether_access::{default_policies, default_profiles};
    use aether_doctrine::MemoryDoctrineIndex;
    use aether_types::{AtoPhase, SystemClock};

    use crate::adapters::{
        MemoryAssetStore, MemoryMissionStore, MemoryOrgStore, MemoryMetricsStore,
        MemorySpectrumStore, MemoryThreatStore,
    };

    fn profile(id: &str) -> AgentProfile {
        default_profiles().into_iter().find(|p| p.id == id).unwrap()
    }

    async fn broker_with_threat() -> InformationBroker {
        let threat = MemoryThreatStore::new();
        threat
            .insert(SourceRecord::new(
                "THREAT-001",
                json!({
                    "threat_type": "SAM",
                    "location": {"lat": 36.0421, "lon": 44.0119},
                    "frequency_bands": ["S-band"],
                    "sources": ["SIGINT"],
                }),
            ))
            .await;

        InformationBroker::new(
            default_policies(),
            Arc::new(DoctrineKb::new(Arc::new(MemoryDoctrineIndex::new()))),
            BrokerBackends {
                threat: Arc::new(threat),
                spectrum: Arc::new(MemorySpectrumStore::new()),
                asset: Arc::new(MemoryAssetStore::new()),
                mission: Arc::new(MemoryMissionStore::new()),
                org: Arc::new(MemoryOrgStore::new()),
                metrics: Arc::new(MemoryMetricsStore::new()),
            },
            Arc::new(AuditLog::new()),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn unauthorized_category_is_rejected_and_audited() {
        let broker = broker_with_threat().await;
        // ato_producer is not authorized for threat data.
        let err = broker
            .query(
                &profile("ato_producer"),
                InformationCategory::ThreatData,
                &json!({}),
                Some(AtoPhase::Phase4AtoProduction),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AetherError::Unauthorized { .. }));
        let entries = broker.audit_log().entries(Some("ato_producer"), None).await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].decision.starts_with("denied"));
    }

    #[tokio::test]
    async fn threat_query_sanitizes_below_sensitive() {
        let broker = broker_with_threat().await;

        // spectrum_manager is OPERATIONAL: coarsened coordinates.
        let coarse = broker
            .query(
                &profile("spectrum_manager"),
                InformationCategory::ThreatData,
                &json!({}),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await
            .unwrap();
        assert!(coarse.sanitized);
        assert_eq!(coarse.records[0].body["location"]["lat"], json!(36.0));
        assert!(coarse.records[0].body.get("sources").is_none());

        // ew_planner is SENSITIVE: exact record.
        let exact = broker
            .query(
                &profile("ew_planner"),
                InformationCategory::ThreatData,
                &json!({}),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await
            .unwrap();
        assert!(!exact.sanitized);
        assert_eq!(exact.records[0].body["location"]["lat"], json!(36.0421));

        // Non-location fields identical in both responses.
        assert_eq!(
            coarse.records[0].body["frequency_bands"],
            exact.records[0].body["frequency_bands"]
        );
    }

    #[tokio::test]
    async fn element_ids_returned_for_citation() {
        let broker = broker_with_threat().await;
        let response = broker
            .query(
                &profile("ew_planner"),
                InformationCategory::ThreatData,
                &json!({}),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await
            .unwrap();
        assert_eq!(response.element_ids, vec!["THREAT-001".to_string()]);
    }

    #[tokio::test]
    async fn down_backend_reports_unavailable() {
        let broker = InformationBroker::new(
            default_policies(),
            Arc::new(DoctrineKb::new(Arc::new(MemoryDoctrineIndex::new()))),
            BrokerBackends {
                threat: Arc::new(crate::adapters::DownBackend("threat_data")),
                spectrum: Arc::new(MemorySpectrumStore::new()),
                asset: Arc::new(MemoryAssetStore::new()),
                mission: Arc::new(MemoryMissionStore::new()),
                org: Arc::new(MemoryOrgStore::new()),
                metrics: Arc::new(MemoryMetricsStore::new()),
            },
            Arc::new(AuditLog::new()),
            Arc::new(SystemClock),
        );
        let err = broker
            .query(
                &profile("ew_planner"),
                InformationCategory::ThreatData,
                &json!({}),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AetherError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn reservation_denials_are_counted() {
        let broker = broker_with_threat().await;
        let now = Utc::now();
        let window = (now, now + chrono::Duration::hours(2));
        // Unknown asset: denial.
        let granted = broker
            .reserve_asset(
                &profile("ew_planner"),
                "ASSET-NONE",
                "MSN-001",
                window,
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await
            .unwrap();
        assert!(!granted);
        assert_eq!(broker.reservation_denial_count(), 1);
        broker.reset_cycle_counters();
        assert_eq!(broker.reservation_denial_count(), 0);
    }
}
