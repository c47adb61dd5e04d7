use crate::domain::entity::{EntityKind, EntityRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One run's worth of entity records, keyed by display name.
///
/// On disk this is a single JSON object whose keys are display names, plus the
/// reserved `generated_at` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub entities: BTreeMap<String, EntityRecord>,
}

impl Snapshot {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at: Some(generated_at),
            entities: BTreeMap::new(),
        }
    }

    pub fn from_records(generated_at: DateTime<Utc>, records: Vec<EntityRecord>) -> Self {
        let mut out = Self::new(generated_at);
        for record in records {
            out.insert(record);
        }
        out
    }

    pub fn insert(&mut self, record: EntityRecord) {
        self.entities.insert(record.display_name.clone(), record);
    }

    pub fn get(&self, display_name: &str) -> Option<&EntityRecord> {
        self.entities.get(display_name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn records_of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRecord> {
        self.entities
            .values()
            .filter(move |r| r.kind == Some(kind))
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize snapshot")
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let mut snapshot = serde_json::from_str::<Snapshot>(text)
            .context("snapshot is not a valid JSON object of entity records")?;
        for (name, record) in snapshot.entities.iter_mut() {
            record.display_name = name.clone();
        }
        Ok(snapshot)
    }

    /// Overwrites `path` with the indented JSON form, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json_pretty()?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        Ok(())
    }

    /// Returns `Ok(None)` when the file does not exist.
    pub async fn read_from(path: &Path) -> anyhow::Result<Option<Self>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read snapshot {}", path.display()))
            }
        };
        let snapshot = Self::from_json(&text)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
        Ok(Some(snapshot))
    }
}
