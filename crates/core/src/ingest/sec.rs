use crate::config::Settings;
use crate::domain::catalog;
use crate::domain::entity::{EntityKind, EntityRecord, EntitySpec};
use crate::ingest::{build_http_client, EntityProvider};
use anyhow::{Context, Result};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};

const FILING_TYPE: &str = "13F-HR";
const RESULT_COUNT: &str = "10";

/// One row of the EDGAR filing listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRef {
    pub accession_number: String,
    pub filing_date: String,
}

/// Looks up a fund's most recent 13F-HR filing on EDGAR.
#[derive(Debug, Clone)]
pub struct SecEdgarClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    listing: FilingListingParser,
}

impl SecEdgarClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            http: build_http_client(settings, "SEC EDGAR")?,
            base_url: settings.sec_base_url.clone(),
            api_key: settings.sec_api_key.clone(),
            listing: FilingListingParser::new()?,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    pub async fn fetch_filings(&self, cik: &str) -> Result<Vec<FilingRef>> {
        let params = [
            ("action", "getcompany"),
            ("CIK", cik),
            ("type", FILING_TYPE),
            ("dateb", ""),
            ("owner", "exclude"),
            ("count", RESULT_COUNT),
        ];

        let res = self
            .http
            .get(&self.base_url)
            .headers(self.headers()?)
            .query(&params)
            .send()
            .await
            .context("SEC EDGAR request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read SEC EDGAR response")?;
        if !status.is_success() {
            anyhow::bail!("SEC EDGAR HTTP {status}");
        }

        Ok(self.listing.parse(&text))
    }
}

#[async_trait::async_trait]
impl EntityProvider for SecEdgarClient {
    fn provider_name(&self) -> &'static str {
        "sec_edgar"
    }

    async fn fetch_entity(&self, entity: &EntitySpec) -> Result<EntityRecord> {
        anyhow::ensure!(
            entity.kind == EntityKind::Fund,
            "SEC EDGAR only serves funds (got {:?} {})",
            entity.kind,
            entity.identifier
        );

        let filings = self.fetch_filings(entity.identifier).await?;
        let latest = filings
            .into_iter()
            .next()
            .with_context(|| format!("no {FILING_TYPE} filings listed for CIK {}", entity.identifier))?;

        // The information table itself is not parsed; holdings come from the reference table.
        let mut record = EntityRecord::from_spec(entity);
        anyhow::ensure!(
            catalog::apply_reference_holdings(&mut record),
            "no reference holdings for CIK {}",
            entity.identifier
        );
        record.as_of_date = Some(latest.filing_date);
        record.accession_number = Some(latest.accession_number);
        Ok(record)
    }
}

/// Extracts `13F-HR` rows from the EDGAR browse listing.
#[derive(Debug, Clone)]
pub struct FilingListingParser {
    row_split: Regex,
    filing_type: Regex,
    accession: Regex,
    date_cell: Regex,
}

impl FilingListingParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            row_split: Regex::new(r"(?i)<tr[\s>]")?,
            filing_type: Regex::new(r"<td[^>]*>\s*13F-HR\s*</td>")?,
            accession: Regex::new(r"(\d{10}-\d{2}-\d{6})")?,
            date_cell: Regex::new(r"<td[^>]*>\s*(\d{4}-\d{2}-\d{2})\s*</td>")?,
        })
    }

    /// Rows in listing order (newest first). Amendments (`13F-HR/A`) and rows missing an
    /// accession number or filing date are ignored.
    pub fn parse(&self, html: &str) -> Vec<FilingRef> {
        let mut out = Vec::new();
        for row in self.row_split.split(html) {
            if !self.filing_type.is_match(row) {
                continue;
            }
            let Some(accession) = self.accession.captures(row).map(|c| c[1].to_string()) else {
                continue;
            };
            let Some(date) = self.date_cell.captures(row).map(|c| c[1].to_string()) else {
                continue;
            };
            out.push(FilingRef {
                accession_number: accession,
                filing_date: date,
            });
        }
        out
    }
}
