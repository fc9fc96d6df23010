// =============================================================================
// Period-bucketed benchmark series (day/week/month/year)
// =============================================================================
//
// Ports `original_source/services/market_data/app/services/benchmarks.py`
// (bucket construction) and the `_normalize_benchmarks` stabilization pass
// from `app/api.py` (canonical output shaping). Kept as two stages, exactly
// like the original, so the raw per-symbol point lists remain inspectable on
// their own.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use portfolio_common::symbols::infer_market_currency;
use portfolio_common::timez::{self, BERLIN};

use crate::app_state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchPoint {
    pub label: String,
    pub pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawBenchmarks {
    pub series: BTreeMap<String, Vec<BenchPoint>>,
}

const PCT_DP: u32 = 3; // 0.1% step -> 3 fractional digits as a fraction

fn qd_pct(x: Decimal) -> Decimal {
    x.round_dp(PCT_DP)
}

pub async fn get_benchmarks(state: &AppState, period: &str, symbols: &[String]) -> anyhow::Result<RawBenchmarks> {
    if !matches!(period, "d" | "w" | "m" | "y") {
        anyhow::bail!("invalid period");
    }

    let key = format!("bench:{period}:{}", symbols.join(","));
    if let Some(cached) = state.db.cache_get("benchmarks_cache", &key) {
        if let Ok(payload) = serde_json::from_str::<RawBenchmarks>(&cached) {
            return Ok(payload);
        }
    }

    let usd_eur = state.fx.usd_to_eur().await?;
    let mut series = BTreeMap::new();

    for symbol in symbols {
        let hist = state.eodhd.historical(symbol).await?;
        let (_, ccy) = infer_market_currency(symbol);

        let mut daily: Vec<(DateTime<Tz>, Decimal)> = Vec::with_capacity(hist.len());
        for bar in &hist {
            let Some(date_str) = bar.get("date").and_then(|v| v.as_str()) else { continue };
            let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else { continue };
            let Some(close) = bar.get("close").and_then(|v| v.as_f64()).and_then(|f| Decimal::try_from(f).ok()) else {
                continue;
            };
            let close_eur = if ccy == "USD" { close * usd_eur } else { close };
            daily.push((timez::end_of_day_berlin(date), close_eur));
        }
        daily.sort_by_key(|(dt, _)| *dt);

        let points = match period {
            "d" => bucket_today(&daily),
            "w" => bucket_week(&daily),
            "m" => bucket_month(&daily),
            "y" => bucket_year(&daily),
            _ => unreachable!(),
        };
        series.insert(symbol.clone(), points);
    }

    let payload = RawBenchmarks { series };
    state.db.cache_set("benchmarks_cache", &key, &serde_json::to_string(&payload)?, state.config.bench_ttl_sec)?;
    Ok(payload)
}

fn bucket_today(daily: &[(DateTime<Tz>, Decimal)]) -> Vec<BenchPoint> {
    let today = timez::now_berlin().date_naive();
    let todays: Vec<&(DateTime<Tz>, Decimal)> = daily.iter().filter(|(dt, _)| dt.date_naive() == today).collect();
    if let Some((_, first)) = todays.first() {
        let (_, last) = todays.last().unwrap();
        let pct = if *first > Decimal::ZERO { (*last / *first) - Decimal::ONE } else { Decimal::ZERO };
        vec![BenchPoint { label: "today".to_string(), pct: qd_pct(pct) }]
    } else {
        vec![BenchPoint { label: "today".to_string(), pct: Decimal::ZERO }]
    }
}

fn bucket_week(daily: &[(DateTime<Tz>, Decimal)]) -> Vec<BenchPoint> {
    let mut last7: Vec<(DateTime<Tz>, Decimal)> = Vec::with_capacity(7);
    let mut seen = std::collections::HashSet::new();
    for (dt, val) in daily.iter().rev() {
        let d = dt.date_naive();
        if seen.contains(&d) {
            continue;
        }
        seen.insert(d);
        last7.push((*dt, *val));
        if last7.len() == 7 {
            break;
        }
    }
    last7.reverse();

    let Some((_, base)) = last7.first().cloned() else { return vec![] };
    last7
        .into_iter()
        .map(|(dt, val)| {
            let pct = if base > Decimal::ZERO { (val / base) - Decimal::ONE } else { Decimal::ZERO };
            BenchPoint { label: timez::weekday_label(dt).to_string(), pct: qd_pct(pct) }
        })
        .collect()
}

fn bucket_month(daily: &[(DateTime<Tz>, Decimal)]) -> Vec<BenchPoint> {
    let today = timez::now_berlin();
    let base_friday = timez::friday_of_iso_week(today);
    let mut fridays: Vec<DateTime<Tz>> = (0..4).map(|k| base_friday - chrono::Duration::weeks(k)).collect();
    fridays.reverse(); // oldest..newest, fridays[3] is W0 (this week)

    let mut buckets: Vec<(String, Decimal)> = Vec::new();
    for (idx, fri) in fridays.iter().enumerate() {
        let chosen = daily.iter().rev().find(|(dt, _)| dt <= fri).map(|(_, v)| *v);
        if let Some(val) = chosen {
            let label = if idx == fridays.len() - 1 { "W0".to_string() } else { format!("W-{}", fridays.len() - 1 - idx) };
            buckets.push((label, val));
        }
    }

    let Some((_, base)) = buckets.first().cloned() else { return vec![] };
    buckets
        .into_iter()
        .map(|(label, val)| {
            let pct = if base > Decimal::ZERO { (val / base) - Decimal::ONE } else { Decimal::ZERO };
            BenchPoint { label, pct: qd_pct(pct) }
        })
        .collect()
}

fn bucket_year(daily: &[(DateTime<Tz>, Decimal)]) -> Vec<BenchPoint> {
    let this_year = timez::now_berlin().year();
    let mut by_month: BTreeMap<String, Decimal> = BTreeMap::new();
    for (dt, val) in daily {
        if dt.year() != this_year {
            continue;
        }
        let key = format!("{:04}-{:02}", dt.year(), dt.month());
        by_month.insert(key, *val); // last write wins because `daily` is sorted ascending
    }

    let labels: Vec<&String> = by_month.keys().collect();
    let Some(base_key) = labels.first().cloned() else { return vec![] };
    let base = by_month[base_key];
    labels
        .into_iter()
        .map(|m| {
            let val = by_month[m];
            let pct = if base > Decimal::ZERO { (val / base) - Decimal::ONE } else { Decimal::ZERO };
            let month: u32 = m[5..7].parse().unwrap_or(1);
            BenchPoint { label: timez::month_label(month).to_string(), pct: qd_pct(pct) }
        })
        .collect()
}

/// Reshape raw per-symbol point lists into the canonical wire shape per
/// period (`app/api.py::_normalize_benchmarks`): `d` collapses to a single
/// `{n_pct, o_pct}` object, `w` always emits all 7 weekdays (missing days
/// filled with `0.0`), `m` keeps only the buckets the bucketer actually
/// produced, and `y` passes the month array through as-is.
pub fn normalize_benchmarks(period: &str, raw: &RawBenchmarks, symbols: &[String]) -> serde_json::Value {
    const DAY_ORDER: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    const WEEK_ORDER: [&str; 4] = ["W0", "W-1", "W-2", "W-3"];

    let mut out = serde_json::Map::new();
    for symbol in symbols {
        let points = raw.series.get(symbol);
        let value = match period {
            "d" => {
                let n_pct = points.and_then(|pts| pts.iter().find(|p| p.label == "today").or_else(|| pts.first())).map(|p| p.pct.to_string().parse::<f64>().unwrap_or(0.0));
                serde_json::json!({ "n_pct": n_pct, "o_pct": 0.0 })
            }
            "w" => {
                let daymap: BTreeMap<&str, f64> = points
                    .map(|pts| {
                        pts.iter()
                            .filter(|p| DAY_ORDER.contains(&p.label.as_str()))
                            .map(|p| (p.label.as_str(), p.pct.to_string().parse::<f64>().unwrap_or(0.0)))
                            .collect()
                    })
                    .unwrap_or_default();
                let arr: Vec<serde_json::Value> = DAY_ORDER
                    .iter()
                    .map(|d| serde_json::json!({ "label": d, "pct": daymap.get(d).copied().unwrap_or(0.0) }))
                    .collect();
                serde_json::Value::Array(arr)
            }
            "m" => {
                let wmap: BTreeMap<&str, f64> = points
                    .map(|pts| {
                        pts.iter()
                            .filter(|p| WEEK_ORDER.contains(&p.label.as_str()))
                            .map(|p| (p.label.as_str(), p.pct.to_string().parse::<f64>().unwrap_or(0.0)))
                            .collect()
                    })
                    .unwrap_or_default();
                let arr: Vec<serde_json::Value> = WEEK_ORDER
                    .iter()
                    .filter(|w| wmap.contains_key(*w))
                    .map(|w| serde_json::json!({ "label": w, "pct": wmap[w] }))
                    .collect();
                serde_json::Value::Array(arr)
            }
            _ => {
                let arr: Vec<serde_json::Value> = points
                    .map(|pts| {
                        pts.iter()
                            .map(|p| serde_json::json!({ "label": p.label, "pct": p.pct.to_string().parse::<f64>().unwrap_or(0.0) }))
                            .collect()
                    })
                    .unwrap_or_default();
                serde_json::Value::Array(arr)
            }
        };
        out.insert(symbol.clone(), value);
    }
    serde_json::json!({ "benchmarks": out })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_fills_missing_days_with_zero() {
        let mut series = BTreeMap::new();
        series.insert(
            "AAPL.US".to_string(),
            vec![BenchPoint { label: "Mon".to_string(), pct: Decimal::new(5, 2) }],
        );
        let raw = RawBenchmarks { series };
        let normalized = normalize_benchmarks("w", &raw, &["AAPL.US".to_string()]);
        let arr = normalized["benchmarks"]["AAPL.US"].as_array().unwrap();
        assert_eq!(arr.len(), 7);
        assert_eq!(arr[0]["label"], "Mon");
        assert_eq!(arr[1]["pct"], 0.0);
    }

    #[test]
    fn month_keeps_only_provided_buckets() {
        let mut series = BTreeMap::new();
        series.insert(
            "AAPL.US".to_string(),
            vec![BenchPoint { label: "W0".to_string(), pct: Decimal::ZERO }],
        );
        let raw = RawBenchmarks { series };
        let normalized = normalize_benchmarks("m", &raw, &["AAPL.US".to_string()]);
        let arr = normalized["benchmarks"]["AAPL.US"].as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["label"], "W0");
    }
}
