//! End-to-end scenarios against the kernel API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use aether_access::AuthorizationContext;
use aether_agents::AetherAgent;
use aether_broker::{
    BrokerBackends, MemoryAssetStore, MemoryMissionStore, MemoryOrgStore, MemoryMetricsStore,
    MemorySpectrumStore, MemoryThreatStore, SourceRecord,
};
use aether_doctrine::{DoctrinePassage, MemoryDoctrineIndex};
use aether_kernel::{AetherConfig, AetherOs};
use aether_types::{AetherError, AtoPhase, Clock, InformationCategory, ManualClock};

struct NoopAgent {
    id: String,
}

#[async_trait]
impl AetherAgent for NoopAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    async fn handle_message(
        &self,
        from: &str,
        message_type: &str,
        _payload: Value,
    ) -> aether_types::Result<Value> {
        Ok(json!({"ack": true, "from": from, "type": message_type}))
    }

    async fn execute_phase_tasks(
        &self,
        phase: AtoPhase,
        cycle_id: &str,
    ) -> aether_types::Result<Value> {
        Ok(json!({"phase": phase.to_string(), "cycle": cycle_id}))
    }
}

const AGENT_IDS: [&str; 5] = [
    "ems_strategy",
    "spectrum_manager",
    "ew_planner",
    "ato_producer",
    "assessment",
];

async fn build_kernel() -> (AetherOs, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let index = MemoryDoctrineIndex::new();
    for i in 1..=5 {
        index
            .insert(DoctrinePassage {
                id: format!("afdp-{i}"),
                content: format!(
                    "mission planning and frequency allocation guidance {i} for EW missions"
                ),
                source: "AFDP 3-85".to_string(),
                metadata: json!({}),
                score: 0.0,
            })
            .await;
    }

    let threats = MemoryThreatStore::new();
    for i in 1..=5 {
        threats
            .insert(SourceRecord::new(
                format!("T-{i:03}"),
                json!({
                    "threat_type": "SAM",
                    "location": {"lat": 36.0 + i as f64 * 0.01, "lon": 44.0},
                    "frequency_bands": ["S-band"],
                    "sources": ["SIGINT"],
                }),
            ))
            .await;
    }

    let kernel = AetherOs::new(
        AetherConfig::default(),
        Arc::new(index),
        BrokerBackends {
            threat: Arc::new(threats),
            spectrum: Arc::new(MemorySpectrumStore::new()),
            asset: Arc::new(MemoryAssetStore::new()),
            mission: Arc::new(MemoryMissionStore::new()),
            org: Arc::new(MemoryOrgStore::new()),
            metrics: Arc::new(MemoryMetricsStore::new()),
        },
        clock.clone(),
    );

    for id in AGENT_IDS {
        kernel
            .register_agent(Arc::new(NoopAgent { id: id.to_string() }))
            .await
            .unwrap();
    }

    (kernel, clock)
}

#[tokio::test]
async fn activation_follows_phase_schedule() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();

    assert_eq!(kernel.current_phase(), Some(AtoPhase::Phase1Oeg));
    assert_eq!(kernel.active_agents(), vec!["ems_strategy".to_string()]);

    // Hour 15: PHASE3_WEAPONEERING.
    kernel.tick(start + Duration::hours(15)).await;
    assert_eq!(kernel.current_phase(), Some(AtoPhase::Phase3Weaponeering));
    assert_eq!(
        kernel.active_agents(),
        vec!["ew_planner".to_string(), "spectrum_manager".to_string()]
    );

    // The strategy agent is out of phase: dispatch from it fails.
    let err = kernel
        .send_agent_message("ems_strategy", "ew_planner", "strategy_update", json!({}))
        .await
        .unwrap_err();
    match err {
        AetherError::NotActive { agent_id } => assert_eq!(agent_id, "ems_strategy"),
        other => panic!("expected NotActive, got {other:?}"),
    }

    // Messaging between two in-phase agents works.
    let reply = kernel
        .send_agent_message(
            "ew_planner",
            "spectrum_manager",
            "frequency_request",
            json!({"mhz": [2400.0, 2500.0]}),
        )
        .await
        .unwrap();
    assert!(reply.is_ok());
}

#[tokio::test]
async fn authorization_matrix() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;
    assert_eq!(kernel.current_phase(), Some(AtoPhase::Phase3Weaponeering));

    let ctx = AuthorizationContext {
        categories: vec![InformationCategory::SpectrumAllocation],
        detail: json!({"frequency_range_mhz": [2400.0, 2500.0]}),
        ..AuthorizationContext::default()
    };

    // ew_planner may request allocations but not perform them.
    let decision = kernel
        .authorize_action("ew_planner", "allocate_frequency", &ctx)
        .await
        .unwrap();
    assert!(!decision.allow);
    assert!(decision.denied_for("role"));

    // spectrum_manager may, during PHASE3.
    let decision = kernel
        .authorize_action("spectrum_manager", "allocate_frequency", &ctx)
        .await
        .unwrap();
    assert!(decision.allow, "reasons: {:?}", decision.reasons);

    // Same action during PHASE1 is denied for phase.
    let (kernel, _clock) = build_kernel().await;
    kernel.start_cycle("C2").await.unwrap();
    assert_eq!(kernel.current_phase(), Some(AtoPhase::Phase1Oeg));
    let decision = kernel
        .authorize_action("spectrum_manager", "allocate_frequency", &ctx)
        .await
        .unwrap();
    assert!(!decision.allow);
    assert!(decision.denied_for("phase"));
}

#[tokio::test]
async fn authorization_flips_when_any_factor_fails() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;

    let passing = AuthorizationContext {
        categories: vec![InformationCategory::SpectrumAllocation],
        ..AuthorizationContext::default()
    };
    let decision = kernel
        .authorize_action("spectrum_manager", "allocate_frequency", &passing)
        .await
        .unwrap();
    assert!(decision.allow);

    // Mutate exactly one factor: touch a category outside the profile.
    let mutated = AuthorizationContext {
        categories: vec![InformationCategory::MissionPlan],
        ..AuthorizationContext::default()
    };
    let decision = kernel
        .authorize_action("spectrum_manager", "allocate_frequency", &mutated)
        .await
        .unwrap();
    assert!(!decision.allow);
    assert_eq!(decision.reasons, vec!["information_access".to_string()]);
}

#[tokio::test]
async fn threat_sanitization_by_access_level() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;

    // OPERATIONAL caller: coarsened coordinates, intel fields dropped.
    let coarse = kernel
        .query_information("spectrum_manager", InformationCategory::ThreatData, &json!({}))
        .await
        .unwrap();
    assert!(coarse.sanitized);
    assert_eq!(coarse.records[0].body["location"]["lat"], json!(36.0));
    assert!(coarse.records[0].body.get("sources").is_none());

    // SENSITIVE caller: exact record.
    let exact = kernel
        .query_information("ew_planner", InformationCategory::ThreatData, &json!({}))
        .await
        .unwrap();
    assert!(!exact.sanitized);
    let exact_lat = exact.records[0].body["location"]["lat"].as_f64().unwrap();
    assert!((exact_lat - 36.01).abs() < 1e-9);
    assert!(exact.records[0].body.get("sources").is_some());

    // Non-location fields identical across both responses.
    assert_eq!(
        coarse.records[0].body["frequency_bands"],
        exact.records[0].body["frequency_bands"]
    );

    // Audited both reads.
    assert_eq!(
        kernel
            .broker()
            .audit_log()
            .entries(None, Some(InformationCategory::ThreatData))
            .await
            .len(),
        2
    );
    assert!(kernel.broker().audit_log().verify_chain().await);
}

#[tokio::test]
async fn timing_flag_on_procedure_overrun() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;

    // Body "runs" 6 simulated hours against 4 expected: one flag, 2h wasted.
    let body_clock = clock.clone();
    kernel
        .procedures()
        .execute(
            "ew_planner",
            "C1",
            AtoPhase::Phase3Weaponeering,
            "Plan EW Missions",
            4.0,
            async move {
                body_clock.advance_hours(6.0);
                Ok(json!({"missions": 3}))
            },
        )
        .await
        .unwrap();

    let flags = kernel.improvement().flags();
    assert_eq!(flags.len(), 1);
    assert!((flags[0].time_wasted_hours.unwrap() - 2.0).abs() < 1e-6);

    // 5.1 simulated hours against 4 expected: below 1.3x, no new flag.
    let body_clock = clock.clone();
    kernel
        .procedures()
        .execute(
            "ew_planner",
            "C1",
            AtoPhase::Phase3Weaponeering,
            "Plan EW Missions",
            4.0,
            async move {
                body_clock.advance_hours(5.1);
                Ok(json!({}))
            },
        )
        .await
        .unwrap();
    assert_eq!(kernel.improvement().flags().len(), 1);
}

#[tokio::test]
async fn context_utilization_tracks_citations() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;

    let mut context = kernel
        .build_agent_context("ew_planner", "plan EW missions against SAM threats", None)
        .await
        .unwrap();
    let provisioned = context.element_count();
    assert!(provisioned >= 4, "expected several elements, got {provisioned}");
    assert!(context.check_invariants().is_ok());

    let doc_id = context.doctrinal[0].id.clone();
    let thr_id = context.situational[0].id.clone();
    let response = format!("Apply [{doc_id}]; the priority emitter is [{thr_id}].");
    let report = kernel.track_context_usage(&mut context, &response);

    let expected_rate = 2.0 / provisioned as f32;
    assert!((report.utilization_rate - expected_rate).abs() < 1e-6);
    assert_eq!(report.underutilized.len(), provisioned - 2);
    assert!(context.referenced.contains(&doc_id));
    assert!(context.referenced.contains(&thr_id));
}

#[tokio::test]
async fn pattern_mining_produces_one_recommendation() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;

    for i in 0..5 {
        let cycle = if i < 3 { "C1" } else { "C2" };
        kernel.improvement().flag_information_gap(
            cycle,
            AtoPhase::Phase3Weaponeering,
            "ew_planner",
            "Plan EW Missions",
            "threat emitter parameters",
        );
    }
    kernel.improvement().flag_doctrine_contradiction(
        "C2",
        AtoPhase::Phase3Weaponeering,
        "ew_planner",
        "Plan EW Missions",
        "afdp-1",
        "afdp-2",
    );

    let recommendations = kernel.improvement().analyze_patterns(5, 2);
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0].evidence.len(), 5);
    assert_eq!(recommendations[0].cycle_span, 2);

    let report = kernel.get_process_improvement_report();
    assert!(report.contains("information_gap"));
}

#[tokio::test]
async fn empty_results_flag_an_information_gap() {
    let (kernel, _clock) = build_kernel().await;
    kernel.start_cycle("C1").await.unwrap();

    // ems_strategy is authorized for process metrics; the store is empty.
    let response = kernel
        .query_information("ems_strategy", InformationCategory::ProcessMetrics, &json!({}))
        .await
        .unwrap();
    assert!(response.records.is_empty());

    let flags = kernel.improvement().flags_for_agent("ems_strategy");
    assert_eq!(flags.len(), 1);
    assert!(flags[0].description.contains("process_metrics"));
}

#[tokio::test]
async fn phase_sequence_is_a_prefix_of_the_cycle() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();

    let mut entered = vec![AtoPhase::Phase1Oeg];
    for hours in [3, 7, 20, 27, 40, 60] {
        for event in kernel.tick(start + Duration::hours(hours)).await {
            if event.kind == aether_kernel::PhaseEventKind::Entered {
                entered.push(event.phase);
            }
        }
    }
    assert_eq!(entered, AtoPhase::ALL.to_vec());

    // Idempotence: repeating the last tick emits nothing.
    assert!(kernel.tick(start + Duration::hours(60)).await.is_empty());
}

#[tokio::test]
async fn advance_restarts_after_assessment() {
    let (kernel, _clock) = build_kernel().await;
    kernel.start_cycle("C1").await.unwrap();
    for _ in 0..5 {
        kernel.advance_phase().await.unwrap();
    }
    assert_eq!(kernel.current_phase(), Some(AtoPhase::Phase6Assessment));
    assert_eq!(kernel.active_agents(), vec!["assessment".to_string()]);

    let phase = kernel.advance_phase().await.unwrap();
    assert_eq!(phase, AtoPhase::Phase1Oeg);
    assert_ne!(kernel.current_cycle_id().unwrap(), "C1");
    assert_eq!(kernel.active_agents(), vec!["ems_strategy".to_string()]);
}

#[tokio::test]
async fn performance_report_covers_flags_and_utilization() {
    let (kernel, clock) = build_kernel().await;
    let start = clock.now();
    kernel.start_cycle("C1").await.unwrap();
    kernel.tick(start + Duration::hours(15)).await;

    kernel.improvement().flag_information_gap(
        "C1",
        AtoPhase::Phase3Weaponeering,
        "ew_planner",
        "Plan EW Missions",
        "asset availability",
    );

    let report = kernel.get_performance_report("ew_planner", 5);
    assert!(report.contains("ew_planner"));
    assert!(report.contains("information_gap"));
}

#[tokio::test]
async fn llm_chain_dispatches_structured_output() {
    use aether_llm::{DeterministicProvider, FieldKind, LlmAdapter, OutputSchema};

    let (kernel, _clock) = build_kernel().await;
    let kernel = kernel.with_llm(Arc::new(LlmAdapter::new(vec![Arc::new(
        DeterministicProvider::new(),
    )])));

    let schema = OutputSchema::new().required("note", FieldKind::Text);
    let reply = kernel
        .llm()
        .unwrap()
        .complete_structured("ems_strategy", "system prompt", "user prompt", &schema)
        .await
        .unwrap();
    assert!(reply.value.get("note").is_some());
    assert!(reply.citations.is_empty());
}

#[tokio::test]
async fn unknown_agent_is_rejected_everywhere() {
    let (kernel, _clock) = build_kernel().await;
    kernel.start_cycle("C1").await.unwrap();

    assert!(matches!(
        kernel
            .query_information("ghost", InformationCategory::Doctrine, &json!({}))
            .await,
        Err(AetherError::UnknownAgent { .. })
    ));
    assert!(matches!(
        kernel
            .authorize_action("ghost", "query_doctrine", &AuthorizationContext::default())
            .await,
        Err(AetherError::UnknownAgent { .. })
    ));
    assert!(matches!(
        kernel
            .send_agent_message("ghost", "ew_planner", "x", json!({}))
            .await,
        Err(AetherError::UnknownAgent { .. })
    ));
}
