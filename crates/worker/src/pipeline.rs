use chrono::{DateTime, Utc};
use clap::ValueEnum;
use pagefeed_core::config::Settings;
use pagefeed_core::domain::catalog;
use pagefeed_core::domain::entity::{EntityRecord, EntitySpec};
use pagefeed_core::ingest::sec::SecEdgarClient;
use pagefeed_core::ingest::yahoo::YahooQuoteClient;
use pagefeed_core::ingest::{self, BatchOptions, EntityProvider, FailurePolicy};
use pagefeed_core::patch::{self, rules, Patcher, RuleOutcome};
use pagefeed_core::snapshot::Snapshot;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pipeline {
    /// SEC 13F fund summaries.
    Funds,
    /// Yahoo Finance index P/E dashboard.
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Fetch, save the snapshot, then patch the pages.
    Run,
    /// Fetch and save the snapshot only.
    Fetch,
    /// Patch the pages from the saved snapshot.
    Patch,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub entities: Vec<EntitySpec>,
    pub snapshot_path: PathBuf,
    pub targets: Vec<PathBuf>,
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub entities: usize,
    pub written: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub stale_anchors: usize,
}

impl Pipeline {
    pub fn default_config(self) -> PipelineConfig {
        match self {
            Pipeline::Funds => PipelineConfig {
                entities: catalog::FUNDS.to_vec(),
                snapshot_path: PathBuf::from("scripts/13f-data.json"),
                targets: vec![
                    PathBuf::from("dist/index.html"),
                    PathBuf::from("dist/multi-fund-comparison.html"),
                ],
                on_failure: FailurePolicy::Skip,
            },
            Pipeline::Market => PipelineConfig {
                entities: catalog::market_entities(),
                snapshot_path: PathBuf::from("market_data.json"),
                targets: vec![PathBuf::from("dist/index.html")],
                on_failure: FailurePolicy::Default,
            },
        }
    }

    fn provider(self, settings: &Settings) -> anyhow::Result<Box<dyn EntityProvider>> {
        let provider: Box<dyn EntityProvider> = match self {
            Pipeline::Funds => Box::new(SecEdgarClient::from_settings(settings)?),
            Pipeline::Market => Box::new(YahooQuoteClient::from_settings(settings)?),
        };
        Ok(provider)
    }

    fn patcher(self) -> anyhow::Result<Patcher> {
        match self {
            Pipeline::Funds => rules::fund_patcher(),
            Pipeline::Market => rules::market_patcher(),
        }
    }

    fn fallback_records(self, filing_date: &str) -> Vec<EntityRecord> {
        match self {
            Pipeline::Funds => catalog::fallback_fund_records(filing_date),
            Pipeline::Market => catalog::fallback_index_records(),
        }
    }
}

pub async fn run(
    settings: &Settings,
    pipeline: Pipeline,
    mode: Mode,
    cfg: &PipelineConfig,
    dry_run: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();

    let fetched = if matches!(mode, Mode::Run | Mode::Fetch) {
        let snapshot = fetch(settings, pipeline, cfg, now).await?;
        summary.entities = snapshot.len();

        if dry_run {
            tracing::info!(path = %cfg.snapshot_path.display(), "dry-run: snapshot not written");
        } else {
            match snapshot.write_to(&cfg.snapshot_path).await {
                Ok(()) => tracing::info!(
                    path = %cfg.snapshot_path.display(),
                    entities = snapshot.len(),
                    "snapshot saved"
                ),
                Err(err) if mode == Mode::Fetch => return Err(err),
                Err(err) => tracing::error!(
                    path = %cfg.snapshot_path.display(),
                    error = %format!("{err:#}"),
                    "failed to save snapshot; patching from memory"
                ),
            }
        }
        Some(snapshot)
    } else {
        None
    };

    if mode == Mode::Fetch {
        return Ok(summary);
    }

    let snapshot = match fetched {
        Some(snapshot) => snapshot,
        None => load_snapshot(pipeline, cfg, now).await?,
    };
    summary.entities = snapshot.len();

    let patcher = pipeline.patcher()?;
    for target in &cfg.targets {
        match patch::patch_document(target, &patcher, &snapshot, now, dry_run).await {
            Ok(report) => {
                let stale = report.count(RuleOutcome::AnchorMissing);
                summary.stale_anchors += stale;
                tracing::info!(
                    document = %target.display(),
                    replaced = report.count(RuleOutcome::Replaced),
                    inserted = report.count(RuleOutcome::Inserted),
                    skipped = report.count(RuleOutcome::Skipped),
                    anchor_missing = stale,
                    "document patched"
                );
                summary.written.push(target.clone());
            }
            Err(err) => {
                tracing::error!(
                    document = %target.display(),
                    error = %format!("{err:#}"),
                    "document update failed"
                );
                summary.failed.push(target.clone());
            }
        }
    }

    Ok(summary)
}

async fn fetch(
    settings: &Settings,
    pipeline: Pipeline,
    cfg: &PipelineConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<Snapshot> {
    let provider = pipeline.provider(settings)?;
    let opts = BatchOptions {
        req_delay: settings.request_delay,
        on_failure: cfg.on_failure,
    };

    let (snapshot, stats) = ingest::fetch_snapshot(provider.as_ref(), &cfg.entities, &opts, now, || {
        pipeline.fallback_records(catalog::FALLBACK_FILING_DATE)
    })
    .await;

    if stats.used_fallback {
        tracing::warn!(?pipeline, "could not fetch live data; snapshot built from fallback table");
    }
    Ok(snapshot)
}

async fn load_snapshot(
    pipeline: Pipeline,
    cfg: &PipelineConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<Snapshot> {
    let path = &cfg.snapshot_path;
    if let Some(snapshot) = Snapshot::read_from(path).await? {
        tracing::info!(path = %path.display(), entities = snapshot.len(), "snapshot loaded");
        return Ok(snapshot);
    }

    match pipeline {
        Pipeline::Funds => {
            tracing::warn!(path = %path.display(), "snapshot not found; using fallback table");
            let today = now.format("%Y-%m-%d").to_string();
            Ok(Snapshot::from_records(now, pipeline.fallback_records(&today)))
        }
        Pipeline::Market => anyhow::bail!("snapshot not found: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use pagefeed_core::domain::entity::{METRIC_PE_RATIO, METRIC_PRICE};
    use std::path::Path;
    use std::time::Duration;

    const FUND_PAGE: &str = "<div class=\"summary-value\">$422.3B</div>\n<p>最後更新：2025年11月15日 08:00:00 UTC</p>\n";

    const LISTING: &str = "<table>\n<tr>\n<td nowrap=\"nowrap\">13F-HR</td>\n<td class=\"small\">Acc-no: 0000950123-25-005701</td>\n<td>2025-05-15</td>\n</tr>\n</table>";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 27, 9, 30, 0).unwrap()
    }

    fn config_in(dir: &Path, targets: &[&str]) -> PipelineConfig {
        PipelineConfig {
            snapshot_path: dir.join("scripts").join("13f-data.json"),
            targets: targets.iter().map(|t| dir.join(t)).collect(),
            ..Pipeline::Funds.default_config()
        }
    }

    #[test]
    fn default_configs_match_pipelines() {
        let funds = Pipeline::Funds.default_config();
        assert_eq!(funds.entities.len(), 3);
        assert_eq!(funds.targets.len(), 2);
        assert_eq!(funds.on_failure, FailurePolicy::Skip);

        let market = Pipeline::Market.default_config();
        assert_eq!(market.entities.len(), 26);
        assert_eq!(market.on_failure, FailurePolicy::Default);
    }

    #[tokio::test]
    async fn patch_mode_uses_saved_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), &["index.html"]);
        tokio::fs::write(&cfg.targets[0], FUND_PAGE).await.unwrap();

        let snapshot = Snapshot::from_json(
            r#"{"Berkshire Hathaway Inc": {"holdings": {"total_value": 430.0}}}"#,
        )
        .unwrap();
        snapshot.write_to(&cfg.snapshot_path).await.unwrap();

        let summary = run(&Settings::default(), Pipeline::Funds, Mode::Patch, &cfg, false, now())
            .await
            .unwrap();
        assert_eq!(summary.written.len(), 1);
        assert!(summary.failed.is_empty());

        let page = tokio::fs::read_to_string(&cfg.targets[0]).await.unwrap();
        assert_eq!(
            page,
            "<div class=\"summary-value\">$430.0B</div>\n<p>最後更新：2026年01月27日 09:30:00 UTC</p>\n"
        );
    }

    #[tokio::test]
    async fn missing_fund_snapshot_falls_back_and_missing_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), &["index.html", "multi-fund-comparison.html"]);
        tokio::fs::write(&cfg.targets[0], FUND_PAGE).await.unwrap();

        let summary = run(&Settings::default(), Pipeline::Funds, Mode::Patch, &cfg, false, now())
            .await
            .unwrap();
        assert_eq!(summary.entities, 3);
        assert_eq!(summary.written, vec![cfg.targets[0].clone()]);
        assert_eq!(summary.failed, vec![cfg.targets[1].clone()]);
        assert!(!cfg.targets[1].exists());
    }

    #[tokio::test]
    async fn missing_market_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            snapshot_path: dir.path().join("market_data.json"),
            targets: vec![dir.path().join("index.html")],
            ..Pipeline::Market.default_config()
        };

        let res = run(&Settings::default(), Pipeline::Market, Mode::Patch, &cfg, false, now()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn dry_run_leaves_documents_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), &["index.html"]);
        tokio::fs::write(&cfg.targets[0], FUND_PAGE).await.unwrap();

        let summary = run(&Settings::default(), Pipeline::Funds, Mode::Patch, &cfg, true, now())
            .await
            .unwrap();
        assert_eq!(summary.written.len(), 1);

        let page = tokio::fs::read_to_string(&cfg.targets[0]).await.unwrap();
        assert_eq!(page, FUND_PAGE);
    }

    fn mock_settings(server: &MockServer) -> Settings {
        Settings {
            sec_base_url: server.url("/cgi-bin/browse-edgar"),
            yahoo_quote_base_url: server.url("/v7/finance/quote"),
            request_timeout: Duration::from_millis(500),
            request_delay: Duration::ZERO,
            ..Settings::default()
        }
    }

    async fn mock_listing(server: &MockServer, cik: &str, delay: Duration) {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/cgi-bin/browse-edgar")
                    .query_param("CIK", cik);
                then.status(200).delay(delay).body(LISTING);
            })
            .await;
    }

    async fn mock_quote(server: &MockServer, symbol: &str, body: &str, delay: Duration) {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v7/finance/quote")
                    .query_param("symbols", symbol);
                then.status(200)
                    .delay(delay)
                    .header("content-type", "application/json")
                    .body(body);
            })
            .await;
    }

    #[tokio::test]
    async fn fund_run_with_one_timeout_saves_the_rest_and_patches() {
        let server = MockServer::start_async().await;
        mock_listing(&server, catalog::FUNDS[0].identifier, Duration::ZERO).await;
        mock_listing(&server, catalog::FUNDS[1].identifier, Duration::from_secs(2)).await;
        mock_listing(&server, catalog::FUNDS[2].identifier, Duration::ZERO).await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), &["index.html"]);
        tokio::fs::write(&cfg.targets[0], FUND_PAGE).await.unwrap();

        let summary = run(&mock_settings(&server), Pipeline::Funds, Mode::Run, &cfg, false, now())
            .await
            .unwrap();
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.written, vec![cfg.targets[0].clone()]);
        assert!(summary.failed.is_empty());

        let saved = Snapshot::read_from(&cfg.snapshot_path).await.unwrap().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.get(catalog::VANGUARD).is_none());
        let berkshire = saved.get(catalog::BERKSHIRE).unwrap();
        assert_eq!(berkshire.as_of_date.as_deref(), Some("2025-05-15"));
        assert!(saved.get(catalog::SOROS).is_some());

        let page = tokio::fs::read_to_string(&cfg.targets[0]).await.unwrap();
        assert!(page.contains("$422.3B"));
        assert!(page.contains("最後更新：2026年01月27日 09:30:00 UTC"));
    }

    #[tokio::test]
    async fn market_run_with_one_timeout_keeps_zeroed_entity() {
        let server = MockServer::start_async().await;
        mock_quote(
            &server,
            "AAPL",
            r#"{"quoteResponse": {"result": [{"symbol": "AAPL", "regularMarketPrice": 230.5, "trailingPE": 35.0}]}}"#,
            Duration::ZERO,
        )
        .await;
        mock_quote(
            &server,
            "MSFT",
            r#"{"quoteResponse": {"result": [{"symbol": "MSFT", "regularMarketPrice": 400.0}]}}"#,
            Duration::from_secs(2),
        )
        .await;
        mock_quote(
            &server,
            "GOOGL",
            r#"{"quoteResponse": {"result": [{"symbol": "GOOGL", "regularMarketPrice": 170.0}]}}"#,
            Duration::ZERO,
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            entities: catalog::STOCKS[..3].to_vec(),
            snapshot_path: dir.path().join("market_data.json"),
            targets: vec![dir.path().join("index.html")],
            ..Pipeline::Market.default_config()
        };
        let page = "<body>\n<p>數據來源：舊資料</p>\n<script>\nconst stockPriceData = {};\n</script>\n</body>\n";
        tokio::fs::write(&cfg.targets[0], page).await.unwrap();

        let summary = run(&mock_settings(&server), Pipeline::Market, Mode::Run, &cfg, false, now())
            .await
            .unwrap();
        assert_eq!(summary.entities, 3);
        assert_eq!(summary.written.len(), 1);
        assert!(summary.failed.is_empty());

        let saved = Snapshot::read_from(&cfg.snapshot_path).await.unwrap().unwrap();
        assert_eq!(saved.len(), 3);
        let msft = saved.get("Microsoft").unwrap();
        assert_eq!(msft.metric(METRIC_PRICE), Some(0.0));
        assert_eq!(msft.metric(METRIC_PE_RATIO), Some(0.0));

        let page = tokio::fs::read_to_string(&cfg.targets[0]).await.unwrap();
        assert!(page.contains(
            r#"const stockPriceData = {"AAPL":{"pe":35.0,"price":230.5},"GOOGL":{"pe":0.0,"price":170.0},"MSFT":{"pe":0.0,"price":0.0}};"#
        ));
        assert!(page.contains("數據來源：Yahoo Finance (更新於 09:30 UTC)</p>"));
        assert!(page.contains(r#"<body data-last-update="2026-01-27T09:30:00+00:00">"#));
    }

    #[tokio::test]
    async fn fetch_mode_saves_snapshot_without_patching() {
        let server = MockServer::start_async().await;
        for fund in &catalog::FUNDS {
            mock_listing(&server, fund.identifier, Duration::ZERO).await;
        }

        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), &["index.html"]);
        tokio::fs::write(&cfg.targets[0], FUND_PAGE).await.unwrap();

        let summary = run(&mock_settings(&server), Pipeline::Funds, Mode::Fetch, &cfg, false, now())
            .await
            .unwrap();
        assert_eq!(summary.entities, 3);
        assert!(summary.written.is_empty());

        let saved = Snapshot::read_from(&cfg.snapshot_path).await.unwrap().unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved.generated_at, Some(now()));

        let page = tokio::fs::read_to_string(&cfg.targets[0]).await.unwrap();
        assert_eq!(page, FUND_PAGE);
    }
}
