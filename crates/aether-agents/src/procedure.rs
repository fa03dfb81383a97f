//! Doctrinal-procedure instrumentation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aether_improvement::ImprovementLogger;
use aether_types::{AetherError, AtoPhase, Clock, Result};

/// Wraps doctrinal procedure execution with timing telemetry.
///
/// Timing anomalies never raise; the underlying result is returned and a
/// flag is recorded. Cancellation (deadline expiry) records a
/// timing-constraint flag and surfaces `DeadlineExceeded`.
pub struct ProcedureRunner {
    improvement: Arc<ImprovementLogger>,
    clock: Arc<dyn Clock>,
}

impl ProcedureRunner {
    pub fn new(improvement: Arc<ImprovementLogger>, clock: Arc<dyn Clock>) -> Self {
        Self { improvement, clock }
    }

    /// Execute `body`, measure it against `expected_hours`, and auto-flag
    /// when the elapsed time crosses the timing threshold.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<T, F>(
        &self,
        agent_id: &str,
        cycle_id: &str,
        phase: AtoPhase,
        procedure_name: &str,
        expected_hours: f64,
        body: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tracing::info!(
            agent = agent_id,
            procedure = procedure_name,
            expected_hours,
            "starting doctrinal procedure"
        );
        let started = self.clock.now();
        let result = body.await;
        let elapsed_hours =
            (self.clock.now() - started).num_milliseconds() as f64 / 3_600_000.0;

        tracing::info!(
            agent = agent_id,
            procedure = procedure_name,
            elapsed_hours = format!("{elapsed_hours:.2}"),
            ok = result.is_ok(),
            "doctrinal procedure finished"
        );

        self.improvement.record_procedure_timing(
            cycle_id,
            phase,
            agent_id,
            procedure_name,
            expected_hours,
            elapsed_hours,
            false,
        );

        result
    }

    /// Execute `body` under a wall-clock deadline. On expiry the in-flight
    /// procedure counts as cancelled: a timing flag is recorded and the
    /// caller sees `DeadlineExceeded`.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_with_deadline<T, F>(
        &self,
        agent_id: &str,
        cycle_id: &str,
        phase: AtoPhase,
        procedure_name: &str,
        expected_hours: f64,
        deadline: Duration,
        body: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = self.clock.now();
        match tokio::time::timeout(deadline, body).await {
            Ok(result) => {
                let elapsed_hours =
                    (self.clock.now() - started).num_milliseconds() as f64 / 3_600_000.0;
                self.improvement.record_procedure_timing(
                    cycle_id,
                    phase,
                    agent_id,
                    procedure_name,
                    expected_hours,
                    elapsed_hours,
                    false,
                );
                result
            }
            Err(_) => {
                let elapsed_hours =
                    (self.clock.now() - started).num_milliseconds() as f64 / 3_600_000.0;
                self.improvement.record_procedure_timing(
                    cycle_id,
                    phase,
                    agent_id,
                    procedure_name,
                    expected_hours,
                    elapsed_hours,
                    true,
                );
                Err(AetherError::DeadlineExceeded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_improvement::{FlagThresholds, InefficiencyType};
    use aether_types::ManualClock;
    use chrono::Utc;

    fn runner() -> (ProcedureRunner, Arc<ImprovementLogger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let improvement = Arc::new(ImprovementLogger::new(
            FlagThresholds::default(),
            clock.clone() as Arc<dyn Clock>,
        ));
        (
            ProcedureRunner::new(improvement.clone(), clock.clone()),
            improvement,
            clock,
        )
    }

    #[tokio::test]
    async fn overrun_procedure_is_flagged_with_time_wasted() {
        let (runner, improvement, clock) = runner();
        let clock_in_body = clock.clone();

        // Body "runs" for 6 simulated hours against 4 expected.
        let result = runner
            .execute("ew_planner", "C1", AtoPhase::Phase3Weaponeering, "Plan EW Missions", 4.0, async move {
                clock_in_body.advance_hours(6.0);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(result, 42);

        let flags = improvement.flags();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].kind, InefficiencyType::TimingConstraint);
        assert!((flags[0].time_wasted_hours.unwrap() - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn small_overrun_is_not_flagged() {
        let (runner, improvement, clock) = runner();
        let clock_in_body = clock.clone();
        runner
            .execute("ew_planner", "C1", AtoPhase::Phase3Weaponeering, "Plan EW Missions", 4.0, async move {
                clock_in_body.advance_hours(5.1);
                Ok(())
            })
            .await
            .unwrap();
        assert!(improvement.flags().is_empty());
    }

    #[tokio::test]
    async fn procedure_error_still_propagates() {
        let (runner, improvement, clock) = runner();
        let clock_in_body = clock.clone();
        let result: Result<()> = runner
            .execute("ew_planner", "C1", AtoPhase::Phase3Weaponeering, "Check Fratricide", 1.0, async move {
                clock_in_body.advance_hours(2.0);
                Err(AetherError::unavailable("threat_data"))
            })
            .await;
        assert!(result.is_err());
        // Timing was still recorded.
        assert_eq!(improvement.flags().len(), 1);
    }

    #[tokio::test]
    async fn deadline_expiry_flags_cancellation() {
        let (runner, improvement, _clock) = runner();
        let result: Result<()> = runner
            .execute_with_deadline(
                "spectrum_manager",
                "C1",
                AtoPhase::Phase5Execution,
                "Emergency Reallocation",
                1.0,
                Duration::from_millis(10),
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                },
            )
            .await;
        assert!(matches!(result, Err(AetherError::DeadlineExceeded)));
        let flags = improvement.flags();
        assert_eq!(flags.len(), 1);
        assert!(flags[0].description.contains("cancelled"));
    }
}
