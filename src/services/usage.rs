//! Usage tracking
//!
//! In-memory per-session token counters. Entries live for the process
//! lifetime and are never evicted; `DELETE /api/usage/sessions/:id` is the
//! only way to drop one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Session id used when a request carries none
pub const DEFAULT_SESSION_ID: &str = "default";

/// Token totals for one provider within a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub request_count: u64,
}

impl ProviderUsage {
    fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.request_count += 1;
    }
}

/// Accumulated usage for one session
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub session_id: String,
    /// Provider of the most recent request
    pub provider: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub request_count: u64,
    pub by_provider: BTreeMap<String, ProviderUsage>,
    pub last_updated: DateTime<Utc>,
}

/// Totals across every session
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub sessions: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub request_count: u64,
    pub by_provider: BTreeMap<String, ProviderUsage>,
}

/// Concurrent usage table; upserts lock only the session's shard
#[derive(Debug, Default)]
pub struct UsageTracker {
    records: DashMap<String, UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one request's tokens to the session
    pub fn track_usage(
        &self,
        session_id: &str,
        provider: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        let now = Utc::now();
        let mut entry = self
            .records
            .entry(session_id.to_string())
            .or_insert_with(|| UsageRecord {
                session_id: session_id.to_string(),
                provider: provider.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                request_count: 0,
                by_provider: BTreeMap::new(),
                last_updated: now,
            });

        let record = entry.value_mut();
        record.provider = provider.to_string();
        record.input_tokens += input_tokens;
        record.output_tokens += output_tokens;
        record.request_count += 1;
        record
            .by_provider
            .entry(provider.to_string())
            .or_default()
            .add(input_tokens, output_tokens);
        record.last_updated = now;

        debug!(
            "Usage for session {}: +{}/+{} via {} (total {}/{})",
            session_id,
            input_tokens,
            output_tokens,
            provider,
            record.input_tokens,
            record.output_tokens
        );
    }

    pub fn get(&self, session_id: &str) -> Option<UsageRecord> {
        self.records.get(session_id).map(|r| r.value().clone())
    }

    /// All sessions, most recently updated first
    pub fn get_all(&self) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        records
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.records.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Totals and per-provider sums across all sessions
    pub fn summary(&self) -> UsageSummary {
        let mut summary = UsageSummary::default();
        for record in self.records.iter() {
            summary.sessions += 1;
            summary.input_tokens += record.input_tokens;
            summary.output_tokens += record.output_tokens;
            summary.request_count += record.request_count;
            for (provider, usage) in &record.by_provider {
                let total = summary.by_provider.entry(provider.clone()).or_default();
                total.input_tokens += usage.input_tokens;
                total.output_tokens += usage.output_tokens;
                total.request_count += usage.request_count;
            }
        }
        summary
    }

    /// Per-provider sums across all sessions
    pub fn provider_totals(&self) -> BTreeMap<String, ProviderUsage> {
        self.summary().by_provider
    }
}
