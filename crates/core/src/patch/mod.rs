//! Fixed-anchor text substitution over hand-written HTML pages.
//!
//! Every rule's anchor has a `pre` and a `post` named group. Those two spans are kept verbatim
//! and whatever sits between them is replaced by the rule's rendered value. At most one match is
//! replaced per rule, and every rule matches against the unpatched document; bytes outside the
//! matches are never touched.

pub mod rules;

use crate::domain::entity::{EntityKind, METRIC_PE_RATIO, METRIC_PRICE};
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

/// Where a rule's replacement text comes from.
#[derive(Debug, Clone)]
pub enum ValueSource {
    /// A numeric metric of one entity, with the literal the page was authored with as fallback.
    Metric {
        entity: &'static str,
        metric: &'static str,
        decimals: usize,
        fallback: f64,
    },
    FilingDate {
        entity: &'static str,
    },
    /// The run time rendered with a `chrono` format string.
    RunTime {
        format: &'static str,
    },
    /// Compact JSON map of every stock record: `symbol -> {"pe", "price"}`.
    StockPriceTable,
}

/// Where to put the value when the anchor is absent. Only used for script literals.
#[derive(Debug, Clone)]
pub struct Insertion {
    pub before: &'static str,
    pub pre: &'static str,
    pub post: &'static str,
}

#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    pub name: &'static str,
    anchor: Regex,
    source: ValueSource,
    insertion: Option<Insertion>,
}

impl SubstitutionRule {
    pub fn new(name: &'static str, pattern: &str, source: ValueSource) -> Result<Self> {
        let anchor =
            Regex::new(pattern).with_context(|| format!("invalid anchor for rule {name}"))?;
        let groups: Vec<&str> = anchor.capture_names().flatten().collect();
        anyhow::ensure!(
            groups.contains(&"pre") && groups.contains(&"post"),
            "anchor for rule {name} must define `pre` and `post` groups"
        );
        Ok(Self {
            name,
            anchor,
            source,
            insertion: None,
        })
    }

    pub fn insert_if_missing(mut self, insertion: Insertion) -> Self {
        self.insertion = Some(insertion);
        self
    }

    fn render(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<Option<String>> {
        match &self.source {
            ValueSource::Metric {
                entity,
                metric,
                decimals,
                fallback,
            } => Ok(snapshot.get(entity).map(|record| {
                let v = record.metric(metric).unwrap_or(*fallback);
                format!("{v:.prec$}", prec = *decimals)
            })),
            ValueSource::FilingDate { entity } => Ok(snapshot
                .get(entity)
                .and_then(|record| record.as_of_date.clone())),
            ValueSource::RunTime { format } => Ok(Some(now.format(format).to_string())),
            ValueSource::StockPriceTable => render_stock_price_table(snapshot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Replaced,
    Inserted,
    AnchorMissing,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub rules: Vec<(&'static str, RuleOutcome)>,
}

impl PatchReport {
    pub fn count(&self, outcome: RuleOutcome) -> usize {
        self.rules.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn outcome(&self, rule: &str) -> Option<RuleOutcome> {
        self.rules
            .iter()
            .find(|(name, _)| *name == rule)
            .map(|(_, o)| *o)
    }
}

/// An ordered rule list applied to one kind of page.
#[derive(Debug, Clone)]
pub struct Patcher {
    rules: Vec<SubstitutionRule>,
}

impl Patcher {
    pub fn new(rules: Vec<SubstitutionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    /// Applies every rule against the document as given. Each rule claims the first match that
    /// does not overlap a span already claimed by an earlier rule, so a value written by one rule
    /// can never become another rule's anchor.
    pub fn apply(
        &self,
        document: &str,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<(String, PatchReport)> {
        let mut edits: Vec<Edit> = Vec::new();
        let mut report = PatchReport::default();

        for rule in &self.rules {
            let Some(value) = rule.render(snapshot, now)? else {
                report.rules.push((rule.name, RuleOutcome::Skipped));
                continue;
            };

            let claimed = rule
                .anchor
                .captures_iter(document)
                .find(|caps| caps.get(0).is_some_and(|m| !overlaps_any(&edits, m.range())));

            let outcome = if let Some(caps) = claimed {
                let span = caps.get(0).map_or(0..0, |m| m.range());
                edits.push(Edit {
                    span,
                    text: splice(&caps, &value),
                });
                RuleOutcome::Replaced
            } else if let Some((ins, at)) = rule.insertion.as_ref().and_then(|ins| {
                // Never add a second declaration next to a malformed one.
                if document.contains(ins.pre) {
                    return None;
                }
                document.find(ins.before).map(|at| (ins, at))
            }) {
                edits.push(Edit {
                    span: at..at,
                    text: format!("\n    {}{}{}\n", ins.pre, value, ins.post),
                });
                RuleOutcome::Inserted
            } else {
                RuleOutcome::AnchorMissing
            };
            report.rules.push((rule.name, outcome));
        }

        edits.sort_by_key(|e| (e.span.start, e.span.end));
        let mut out = String::with_capacity(document.len());
        let mut cursor = 0;
        for edit in &edits {
            out.push_str(&document[cursor..edit.span.start]);
            out.push_str(&edit.text);
            cursor = edit.span.end;
        }
        out.push_str(&document[cursor..]);

        Ok((out, report))
    }
}

struct Edit {
    span: Range<usize>,
    text: String,
}

fn overlaps_any(edits: &[Edit], span: Range<usize>) -> bool {
    edits.iter().any(|e| overlaps(&e.span, &span))
}

// An empty span (an insertion point) only collides with a span strictly containing it.
fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => false,
        (true, false) => b.start < a.start && a.start < b.end,
        (false, true) => a.start < b.start && b.start < a.end,
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

fn splice(caps: &Captures<'_>, value: &str) -> String {
    let pre = caps.name("pre").map_or("", |m| m.as_str());
    let post = caps.name("post").map_or("", |m| m.as_str());
    format!("{pre}{value}{post}")
}

#[derive(Debug, Serialize)]
struct StockCell {
    pe: f64,
    price: f64,
}

fn render_stock_price_table(snapshot: &Snapshot) -> Result<Option<String>> {
    let cells: BTreeMap<&str, StockCell> = snapshot
        .records_of_kind(EntityKind::Stock)
        .filter(|r| !r.identifier.is_empty())
        .map(|r| {
            (
                r.identifier.as_str(),
                StockCell {
                    pe: r.metric(METRIC_PE_RATIO).unwrap_or(0.0),
                    price: r.metric(METRIC_PRICE).unwrap_or(0.0),
                },
            )
        })
        .collect();

    if cells.is_empty() {
        return Ok(None);
    }
    let json = serde_json::to_string(&cells).context("failed to serialize stock price table")?;
    Ok(Some(json))
}

/// Patches one document on disk in place. A missing document is an error and nothing is written.
pub async fn patch_document(
    path: &Path,
    patcher: &Patcher,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<PatchReport> {
    let original = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("target document not found: {}", path.display())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };

    let (patched, report) = patcher.apply(&original, snapshot, now)?;

    for (rule, outcome) in &report.rules {
        match outcome {
            RuleOutcome::AnchorMissing => tracing::warn!(
                document = %path.display(),
                rule,
                "anchor not found; value left stale"
            ),
            _ => tracing::debug!(document = %path.display(), rule, ?outcome, "rule applied"),
        }
    }

    if dry_run {
        tracing::info!(
            document = %path.display(),
            changed = patched != original,
            "dry-run: document not written"
        );
        return Ok(report);
    }

    tokio::fs::write(path, patched)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(report)
}
