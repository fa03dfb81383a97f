//! Append-only, hash-chained audit log of information access.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use aether_types::{AccessLevel, InformationCategory};

/// One audited information access. Entries carry strictly increasing
/// sequence numbers and chain through SHA-256 hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub agent_id: String,
    pub category: InformationCategory,
    pub query_summary: String,
    /// `granted` or `denied: <reason>`.
    pub decision: String,
    pub access_level: AccessLevel,
    pub sanitized: bool,
    pub previous_hash: String,
    pub hash: String,
}

impl AuditEntry {
    fn compute_hash(&self) -> String {
        let content = format!(
            "{}:{}:{}:{}:{}:{}",
            self.previous_hash, self.seq, self.agent_id, self.category, self.decision, self.ts
        );
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// In-process audit log. Retained for the life of the process;
/// externalization is out of scope.
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    seq: AtomicU64,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        ts: DateTime<Utc>,
        agent_id: &str,
        category: InformationCategory,
        query_summary: String,
        decision: String,
        access_level: AccessLevel,
        sanitized: bool,
    ) -> AuditEntry {
        let mut entries = self.entries.write().await;
        let previous_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| "genesis".to_string());
        let mut entry = AuditEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            ts,
            agent_id: agent_id.to_string(),
            category,
            query_summary,
            decision,
            access_level,
            sanitized,
            previous_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entries.push(entry.clone());
        tracing::info!(
            agent = agent_id,
            category = %category,
            seq = entry.seq,
            "access audited"
        );
        entry
    }

    pub async fn entries(
        &self,
        agent_id: Option<&str>,
        category: Option<InformationCategory>,
    ) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| agent_id.map(|a| e.agent_id == a).unwrap_or(true))
            .filter(|e| category.map(|c| e.category == c).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Verify every entry's hash and the chain between entries.
    pub async fn verify_chain(&self) -> bool {
        let entries = self.entries.read().await;
        let mut previous = "genesis".to_string();
        for entry in entries.iter() {
            if entry.previous_hash != previous || !entry.verify() {
                return false;
            }
            previous = entry.hash.clone();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let log = AuditLog::new();
        for i in 0..5 {
            log.append(
                Utc::now(),
                "ew_planner",
                InformationCategory::ThreatData,
                format!("query {i}"),
                "granted".to_string(),
                AccessLevel::Sensitive,
                false,
            )
            .await;
        }
        let entries = log.entries(None, None).await;
        for pair in entries.windows(2) {
            assert!(pair[1].seq > pair[0].seq);
        }
    }

    #[tokio::test]
    async fn chain_verifies() {
        let log = AuditLog::new();
        log.append(
            Utc::now(),
            "spectrum_manager",
            InformationCategory::SpectrumAllocation,
            "conflict check".to_string(),
            "granted".to_string(),
            AccessLevel::Operational,
            false,
        )
        .await;
        log.append(
            Utc::now(),
            "ew_planner",
            InformationCategory::ThreatData,
            "area query".to_string(),
            "granted".to_string(),
            AccessLevel::Sensitive,
            true,
        )
        .await;
        assert!(log.verify_chain().await);
    }

    #[tokio::test]
    async fn filters_by_agent_and_category() {
        let log = AuditLog::new();
        log.append(
            Utc::now(),
            "a",
            InformationCategory::ThreatData,
            "q".into(),
            "granted".into(),
            AccessLevel::Operational,
            true,
        )
        .await;
        log.append(
            Utc::now(),
            "b",
            InformationCategory::AssetStatus,
            "q".into(),
            "granted".into(),
            AccessLevel::Operational,
            false,
        )
        .await;

        assert_eq!(log.entries(Some("a"), None).await.len(), 1);
        assert_eq!(
            log.entries(None, Some(InformationCategory::AssetStatus)).await.len(),
            1
        );
        assert_eq!(log.entries(Some("a"), Some(InformationCategory::AssetStatus)).await.len(), 0);
    }
}
