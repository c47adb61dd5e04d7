pub mod domain;
pub mod ingest;
pub mod patch;
pub mod snapshot;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_SEC_BASE_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar";
    const DEFAULT_YAHOO_QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
    const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const DEFAULT_TIMEOUT_SECS: u64 = 15;
    const DEFAULT_REQ_DELAY_MS: u64 = 500;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sec_base_url: String,
        pub sec_api_key: Option<String>,
        pub yahoo_quote_base_url: String,
        pub user_agent: String,
        pub request_timeout: Duration,
        pub request_delay: Duration,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                sec_base_url: DEFAULT_SEC_BASE_URL.to_string(),
                sec_api_key: None,
                yahoo_quote_base_url: DEFAULT_YAHOO_QUOTE_BASE_URL.to_string(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                request_delay: Duration::from_millis(DEFAULT_REQ_DELAY_MS),
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let timeout_secs = parse_u64(
                "PAGEFEED_TIMEOUT_SECS",
                non_empty_var("PAGEFEED_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?;
            let req_delay_ms = parse_u64(
                "PAGEFEED_REQ_DELAY_MS",
                non_empty_var("PAGEFEED_REQ_DELAY_MS"),
                DEFAULT_REQ_DELAY_MS,
            )?;

            anyhow::ensure!(timeout_secs > 0, "PAGEFEED_TIMEOUT_SECS must be > 0");

            Ok(Self {
                sec_base_url: non_empty_var("SEC_BASE_URL").unwrap_or(defaults.sec_base_url),
                sec_api_key: non_empty_var("SEC_API_KEY"),
                yahoo_quote_base_url: non_empty_var("YAHOO_QUOTE_BASE_URL")
                    .unwrap_or(defaults.yahoo_quote_base_url),
                user_agent: non_empty_var("PAGEFEED_USER_AGENT").unwrap_or(defaults.user_agent),
                request_timeout: Duration::from_secs(timeout_secs),
                request_delay: Duration::from_millis(req_delay_ms),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn parse_u64(key: &str, raw: Option<String>, default: u64) -> anyhow::Result<u64> {
        match raw {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be an integer, got {v:?}")),
            None => Ok(default),
        }
    }

}
