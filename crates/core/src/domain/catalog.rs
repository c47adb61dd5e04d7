//! Compiled-in entity lists and reference tables.

use crate::domain::entity::{
    EntityRecord, EntitySpec, Position, Region, METRIC_CASH, METRIC_PE_RATIO, METRIC_TOTAL_VALUE,
};

pub const BERKSHIRE: &str = "Berkshire Hathaway Inc";
pub const VANGUARD: &str = "Vanguard Group Inc";
pub const SOROS: &str = "Soros Fund Management LLC";

pub const SP500: &str = "S&P 500";
pub const NASDAQ: &str = "Nasdaq";
pub const DOW_JONES: &str = "Dow Jones";
pub const HANG_SENG: &str = "Hang Seng";

pub const FUNDS: [EntitySpec; 3] = [
    EntitySpec::fund("0000086365", BERKSHIRE),
    EntitySpec::fund("0000102647", VANGUARD),
    EntitySpec::fund("0001086364", SOROS),
];

pub const INDICES: [EntitySpec; 4] = [
    EntitySpec::index("^GSPC", SP500),
    EntitySpec::index("^IXIC", NASDAQ),
    EntitySpec::index("^DJI", DOW_JONES),
    EntitySpec::index("^HSI", HANG_SENG),
];

pub const STOCKS: [EntitySpec; 22] = [
    EntitySpec::stock("AAPL", "Apple", Region::Us),
    EntitySpec::stock("MSFT", "Microsoft", Region::Us),
    EntitySpec::stock("GOOGL", "Google", Region::Us),
    EntitySpec::stock("NVDA", "NVIDIA", Region::Us),
    EntitySpec::stock("TSLA", "Tesla", Region::Us),
    EntitySpec::stock("AMZN", "Amazon", Region::Us),
    EntitySpec::stock("META", "Meta", Region::Us),
    EntitySpec::stock("JPM", "JPMorgan", Region::Us),
    EntitySpec::stock("BAC", "Bank of America", Region::Us),
    EntitySpec::stock("GS", "Goldman Sachs", Region::Us),
    EntitySpec::stock("XOM", "ExxonMobil", Region::Us),
    EntitySpec::stock("CVX", "Chevron", Region::Us),
    EntitySpec::stock("COP", "ConocoPhillips", Region::Us),
    EntitySpec::stock("0005.HK", "HSBC", Region::Hk),
    EntitySpec::stock("0001.HK", "中銀香港", Region::Hk),
    EntitySpec::stock("0939.HK", "中國銀行", Region::Hk),
    EntitySpec::stock("0016.HK", "新世界", Region::Hk),
    EntitySpec::stock("0083.HK", "信和置業", Region::Hk),
    EntitySpec::stock("1113.HK", "長實集團", Region::Hk),
    EntitySpec::stock("0288.HK", "恒安國際", Region::Hk),
    EntitySpec::stock("1928.HK", "金沙中國", Region::Hk),
    EntitySpec::stock("0700.HK", "騰訊控股", Region::Hk),
];

/// Index P/E values. The quote provider does not report a trailing P/E for aggregates.
const INDEX_PE: [(&str, f64); 4] = [("^GSPC", 29.2), ("^IXIC", 36.5), ("^DJI", 27.3), ("^HSI", 11.8)];

pub fn index_pe(symbol: &str) -> Option<f64> {
    INDEX_PE
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, pe)| *pe)
}

pub fn market_entities() -> Vec<EntitySpec> {
    INDICES.iter().chain(STOCKS.iter()).copied().collect()
}

pub const FALLBACK_FILING_DATE: &str = "2025-11-15";

struct FundHoldings {
    cik: &'static str,
    total_value: f64,
    cash: f64,
    positions: &'static [(&'static str, f64, f64)],
}

const FUND_HOLDINGS: [FundHoldings; 3] = [
    FundHoldings {
        cik: "0000086365",
        total_value: 422.3,
        cash: 167.6,
        positions: &[
            ("AAPL", 246.5, 915.6),
            ("BAC", 54.8, 1000.0),
            ("KO", 26.4, 400.0),
            ("AXP", 32.1, 151.0),
            ("CVX", 24.7, 152.0),
        ],
    },
    FundHoldings {
        cik: "0000102647",
        total_value: 750.2,
        cash: 3.75,
        positions: &[
            ("AAPL", 3200.0, 11900.0),
            ("MSFT", 3100.0, 8500.0),
            ("NVDA", 2800.0, 5200.0),
        ],
    },
    FundHoldings {
        cik: "0001086364",
        total_value: 32.8,
        cash: 4.9,
        positions: &[
            ("GOOGL", 8.2, 25.0),
            ("AMZN", 5.1, 15.0),
            ("MSFT", 3.8, 12.0),
        ],
    },
];

/// Fills a fund record's holdings from the reference table. Returns false for an unknown CIK.
pub fn apply_reference_holdings(record: &mut EntityRecord) -> bool {
    let Some(h) = FUND_HOLDINGS.iter().find(|h| h.cik == record.identifier) else {
        return false;
    };

    record.metrics.set(METRIC_TOTAL_VALUE, h.total_value);
    record.metrics.set(METRIC_CASH, h.cash);
    record.metrics.positions = h
        .positions
        .iter()
        .map(|(symbol, value, shares)| Position {
            symbol: symbol.to_string(),
            value: *value,
            shares: *shares,
        })
        .collect();
    true
}

/// The three fund records used when nothing could be fetched.
pub fn fallback_fund_records(filing_date: &str) -> Vec<EntityRecord> {
    FUNDS
        .iter()
        .map(|spec| {
            let mut record = EntityRecord::from_spec(spec);
            record.as_of_date = Some(filing_date.to_string());
            apply_reference_holdings(&mut record);
            record
        })
        .collect()
}

/// Index records carrying only the table P/E, used when no quote could be fetched.
pub fn fallback_index_records() -> Vec<EntityRecord> {
    INDICES
        .iter()
        .map(|spec| {
            let mut record = EntityRecord::from_spec(spec);
            if let Some(pe) = index_pe(spec.identifier) {
                record.metrics.set(METRIC_PE_RATIO, pe);
            }
            record
        })
        .collect()
}
