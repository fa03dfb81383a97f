//! External policy evaluator client.
//!
//! Posts authorization inputs to an OPA-style HTTP endpoint. A circuit
//! breaker opens after a run of consecutive failures and degrades the factor
//! to deny until a half-open probe succeeds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use aether_types::Clock;

#[derive(Debug, Clone)]
pub struct PolicyClientConfig {
    pub base_url: String,
    /// Policy package path under `/v1/data/`.
    pub package: String,
    pub timeout: Duration,
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a half-open probe.
    pub open_duration: Duration,
}

impl Default for PolicyClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("AETHER_POLICY_URL")
                .unwrap_or_else(|_| "http://localhost:8181".to_string()),
            package: "aether/agent_authorization".to_string(),
            timeout: Duration::from_millis(100),
            failure_threshold: 3,
            open_duration: Duration::from_secs(60),
        }
    }
}

/// Outcome of one policy evaluation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Allowed,
    Denied,
    /// The evaluator could not be reached; the breaker is still closed.
    Unreachable,
    /// The breaker is open; the factor degrades to deny.
    CircuitOpen,
}

#[derive(Debug, Serialize)]
struct PolicyRequest<'a> {
    input: PolicyInput<'a>,
}

#[derive(Debug, Serialize)]
struct PolicyInput<'a> {
    agent: &'a serde_json::Value,
    action: &'a serde_json::Value,
    ato_cycle: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PolicyResponse {
    #[serde(default)]
    result: bool,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

/// HTTP client for the external policy evaluator.
pub struct PolicyClient {
    config: PolicyClientConfig,
    client: reqwest::Client,
    breaker: Mutex<BreakerState>,
}

impl PolicyClient {
    pub fn new(config: PolicyClientConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            breaker: Mutex::new(BreakerState::default()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(PolicyClientConfig::default())
    }

    /// Evaluate the external policy for `(agent, action, ato_cycle)`.
    ///
    /// The evaluator's decision is authoritative when reachable. Transport
    /// failures count toward the breaker; once open, evaluation degrades to
    /// [`PolicyOutcome::CircuitOpen`] until `open_duration` elapses and a
    /// probe call succeeds.
    pub async fn evaluate(
        &self,
        agent: &serde_json::Value,
        action: &serde_json::Value,
        ato_cycle: &serde_json::Value,
        clock: &dyn Clock,
    ) -> PolicyOutcome {
        {
            let mut breaker = self.breaker.lock().await;
            if let Some(opened_at) = breaker.opened_at {
                let elapsed = clock.now() - opened_at;
                if elapsed.to_std().unwrap_or_default() < self.config.open_duration {
                    return PolicyOutcome::CircuitOpen;
                }
                // Half-open: allow one probe through.
                breaker.opened_at = None;
            }
        }

        let url = format!(
            "{}/v1/data/{}/allow",
            self.config.base_url, self.config.package
        );
        let body = PolicyRequest {
            input: PolicyInput {
                agent,
                action,
                ato_cycle,
            },
        };

        let outcome = async {
            let response = self
                .client
                .post(&url)
                .timeout(self.config.timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("HTTP {}", response.status()));
            }
            let parsed: PolicyResponse = response.json().await.map_err(|e| e.to_string())?;
            Ok(parsed.result)
        }
        .await;

        let mut breaker = self.breaker.lock().await;
        match outcome {
            Ok(true) => {
                breaker.consecutive_failures = 0;
                PolicyOutcome::Allowed
            }
            Ok(false) => {
                breaker.consecutive_failures = 0;
                PolicyOutcome::Denied
            }
            Err(error) => {
                breaker.consecutive_failures += 1;
                tracing::warn!(
                    %error,
                    failures = breaker.consecutive_failures,
                    "external policy evaluator unreachable"
                );
                if breaker.consecutive_failures >= self.config.failure_threshold {
                    breaker.opened_at = Some(clock.now());
                    PolicyOutcome::CircuitOpen
                } else {
                    PolicyOutcome::Unreachable
                }
            }
        }
    }
}
