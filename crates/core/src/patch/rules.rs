use crate::domain::catalog::{BERKSHIRE, DOW_JONES, HANG_SENG, NASDAQ, SOROS, SP500, VANGUARD};
use crate::domain::entity::{METRIC_CASH, METRIC_PE_RATIO, METRIC_TOTAL_VALUE};
use crate::patch::{Insertion, Patcher, SubstitutionRule, ValueSource};
use anyhow::Result;

fn summary_value_rule(
    name: &'static str,
    entity: &'static str,
    metric: &'static str,
    authored: f64,
) -> Result<SubstitutionRule> {
    // Anchored on the literal the page was authored with; `$` and `.` need escaping.
    let literal = regex::escape(&format!("{authored:.1}"));
    let pattern = format!(r#"(?P<pre><div class="summary-value">\$){literal}(?P<post>B</div>)"#);
    SubstitutionRule::new(
        name,
        &pattern,
        ValueSource::Metric {
            entity,
            metric,
            decimals: 1,
            fallback: authored,
        },
    )
}

fn index_pe_rule(
    name: &'static str,
    entity: &'static str,
    color: &str,
    authored: f64,
) -> Result<SubstitutionRule> {
    let pattern = format!(
        r#"(?P<pre><div style="font-size: 1\.5em; font-weight: bold; color: {color}; margin: 10px 0;">)[\d.]+(?P<post></div>)"#
    );
    SubstitutionRule::new(
        name,
        &pattern,
        ValueSource::Metric {
            entity,
            metric: METRIC_PE_RATIO,
            decimals: 1,
            fallback: authored,
        },
    )
}

/// Rules for the 13F fund summary pages.
pub fn fund_patcher() -> Result<Patcher> {
    Ok(Patcher::new(vec![
        SubstitutionRule::new(
            "berkshire.filing_date",
            r"(?P<pre><span>數據日期：).*?(?P<post></span>)",
            ValueSource::FilingDate { entity: BERKSHIRE },
        )?,
        summary_value_rule("berkshire.total_value", BERKSHIRE, METRIC_TOTAL_VALUE, 422.3)?,
        summary_value_rule("berkshire.cash", BERKSHIRE, METRIC_CASH, 167.6)?,
        summary_value_rule("vanguard.total_value", VANGUARD, METRIC_TOTAL_VALUE, 750.2)?,
        summary_value_rule("soros.total_value", SOROS, METRIC_TOTAL_VALUE, 32.8)?,
        SubstitutionRule::new(
            "last_updated",
            r"(?P<pre>最後更新：)\d{4}年\d{2}月\d{2}日.*?(?P<post>UTC)",
            ValueSource::RunTime {
                format: "%Y年%m月%d日 %H:%M:%S ",
            },
        )?,
    ]))
}

/// Rules for the P/E dashboard page.
pub fn market_patcher() -> Result<Patcher> {
    Ok(Patcher::new(vec![
        index_pe_rule("sp500.pe_ratio", SP500, "#667eea", 29.2)?,
        index_pe_rule("nasdaq.pe_ratio", NASDAQ, "#764ba2", 36.5)?,
        index_pe_rule("hang_seng.pe_ratio", HANG_SENG, "#22c55e", 11.8)?,
        index_pe_rule("dow_jones.pe_ratio", DOW_JONES, "#f97316", 27.3)?,
        SubstitutionRule::new(
            "stock_price_data",
            r"(?s)(?P<pre>const stockPriceData = )\{.*?\}(?P<post>;)",
            ValueSource::StockPriceTable,
        )?
        .insert_if_missing(Insertion {
            before: "</script>\n</body>",
            pre: "const stockPriceData = ",
            post: ";",
        }),
        SubstitutionRule::new(
            "release_date",
            r"(?P<pre>發布日期：)\d{4}年\d{2}月\d{2}日(?P<post>)",
            ValueSource::RunTime {
                format: "%Y年%m月%d日",
            },
        )?,
        SubstitutionRule::new(
            "data_source",
            r"(?P<pre>數據來源：)[^<]+(?P<post>)",
            ValueSource::RunTime {
                format: "Yahoo Finance (更新於 %H:%M UTC)",
            },
        )?,
        SubstitutionRule::new(
            "body_last_update",
            r#"(?P<pre><body)(?: data-last-update="[^"]*")?(?P<post>>)"#,
            ValueSource::RunTime {
                format: r#" data-last-update="%Y-%m-%dT%H:%M:%S%:z""#,
            },
        )?,
    ]))
}
