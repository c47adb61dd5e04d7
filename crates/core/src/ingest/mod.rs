pub mod sec;
pub mod yahoo;

use crate::config::Settings;
use crate::domain::entity::{EntityRecord, EntitySpec};
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait::async_trait]
pub trait EntityProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_entity(&self, entity: &EntitySpec) -> Result<EntityRecord>;

    /// Record kept for an entity whose fetch failed, when the batch keeps failed entities.
    fn default_record(&self, entity: &EntitySpec) -> EntityRecord {
        EntityRecord::from_spec(entity)
    }
}

/// What the batch does with an entity whose fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Skip,
    Default,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub req_delay: Duration,
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub fetched: usize,
    pub failures: usize,
    pub used_fallback: bool,
}

/// Fetches every entity in order, one request at a time, sleeping `req_delay` between requests.
///
/// A failed entity never aborts the batch. If nothing usable comes back, `fallback` supplies the
/// records so the returned snapshot is never empty.
pub async fn fetch_snapshot<P, F>(
    provider: &P,
    entities: &[EntitySpec],
    opts: &BatchOptions,
    generated_at: DateTime<Utc>,
    fallback: F,
) -> (Snapshot, BatchStats)
where
    P: EntityProvider + ?Sized,
    F: FnOnce() -> Vec<EntityRecord>,
{
    let mut snapshot = Snapshot::new(generated_at);
    let mut stats = BatchStats::default();
    let total = entities.len();

    for (idx, entity) in entities.iter().enumerate() {
        if idx != 0 && !opts.req_delay.is_zero() {
            tokio::time::sleep(opts.req_delay).await;
        }

        match provider.fetch_entity(entity).await {
            Ok(record) => {
                stats.fetched += 1;
                tracing::info!(
                    provider = provider.provider_name(),
                    entity = %entity.display_name,
                    identifier = %entity.identifier,
                    metrics = ?record.metrics.values,
                    "fetched entity"
                );
                snapshot.insert(record);
            }
            Err(err) => {
                stats.failures += 1;
                tracing::warn!(
                    provider = provider.provider_name(),
                    entity = %entity.display_name,
                    identifier = %entity.identifier,
                    policy = ?opts.on_failure,
                    error = %format!("{err:#}"),
                    "entity fetch failed"
                );
                if opts.on_failure == FailurePolicy::Default {
                    snapshot.insert(provider.default_record(entity));
                }
            }
        }
    }

    if snapshot.is_empty() {
        tracing::warn!(
            provider = provider.provider_name(),
            total,
            "no entities fetched; using static fallback table"
        );
        for record in fallback() {
            snapshot.insert(record);
        }
        stats.used_fallback = true;
    }

    tracing::info!(
        provider = provider.provider_name(),
        total,
        fetched = stats.fetched,
        failures = stats.failures,
        entities = snapshot.len(),
        "fetch batch finished"
    );

    (snapshot, stats)
}

pub(crate) fn build_http_client(settings: &Settings, what: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .user_agent(settings.user_agent.clone())
        .build()
        .with_context(|| format!("failed to build {what} http client"))
}
