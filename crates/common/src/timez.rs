// =============================================================================
// Timezone-aware freshness classification and bucket alignment
// =============================================================================
//
// Grounded in `original_source/services/market_data/app/utils/time.py`.
// Bucketing for analytics (spec §3, §4.6, §4.7) uses the Europe/Berlin local
// calendar; quote freshness uses each exchange's own session-start table.
// =============================================================================

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

pub const BERLIN: Tz = chrono_tz::Europe::Berlin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Live,
    PreviousCloseEod,
    PreviousCloseLastTradingDay,
}

impl Freshness {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Live => "Live",
            Self::PreviousCloseEod | Self::PreviousCloseLastTradingDay => "Previous close",
        }
    }

    pub fn note(&self) -> &'static str {
        match self {
            Self::Live => "During regular session",
            Self::PreviousCloseEod => "End of day price",
            Self::PreviousCloseLastTradingDay => "Last trading day",
        }
    }
}

/// `(tz, regular session start local time)` for a given exchange suffix.
/// Unknown suffixes default to the US table entry.
fn exchange_tz_and_start(suffix: &str) -> (Tz, NaiveTime) {
    let nine_thirty = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    match suffix.to_ascii_uppercase().as_str() {
        "XETRA" | "DE" | "F" => (chrono_tz::Europe::Berlin, nine),
        "LSE" | "L" => (chrono_tz::Europe::London, eight),
        "SIX" => (chrono_tz::Europe::Zurich, nine),
        "TSE" | "T" => (chrono_tz::Asia::Tokyo, nine),
        "HK" => (chrono_tz::Asia::Hong_Kong, nine_thirty),
        _ => (chrono_tz::America::New_York, nine_thirty),
    }
}

/// Classify a quote's freshness. `eod`/`delayed` provider flags win outright;
/// otherwise compare the quote timestamp's local trading-day date against
/// "now" in the exchange's own timezone.
pub fn classify_freshness(symbol_suffix: &str, ts: DateTime<Utc>, eod: bool, delayed: bool) -> Freshness {
    if eod || delayed {
        return Freshness::PreviousCloseEod;
    }
    let (tz, start) = exchange_tz_and_start(symbol_suffix);
    let now_local = Utc::now().with_timezone(&tz);
    let ts_local = ts.with_timezone(&tz);
    if ts_local.date_naive() == now_local.date_naive() && now_local.time() >= start {
        Freshness::Live
    } else {
        Freshness::PreviousCloseLastTradingDay
    }
}

/// 23:59:59 Berlin-local of the given calendar date, used as the canonical
/// "end of trading day" timestamp for daily bars (`benchmarks.py::end_of_day_berlin`).
pub fn end_of_day_berlin(date: NaiveDate) -> DateTime<Tz> {
    BERLIN
        .from_local_datetime(&date.and_hms_opt(23, 59, 59).unwrap())
        .single()
        .unwrap_or_else(|| BERLIN.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap()))
}

/// Friday 23:59:59 Berlin-local of the ISO week containing `dt`.
pub fn friday_of_iso_week(dt: DateTime<Tz>) -> DateTime<Tz> {
    let iso_weekday = dt.weekday().number_from_monday() as i64; // Mon=1..Sun=7
    let delta_days = 5 - iso_weekday;
    let target_date = dt.date_naive() + chrono::Duration::days(delta_days);
    BERLIN
        .from_local_datetime(&target_date.and_hms_opt(23, 59, 59).unwrap())
        .single()
        .unwrap_or_else(|| dt.with_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap()).unwrap())
}

/// Three-letter weekday label (`Mon`..`Sun`) in Berlin local time.
pub fn weekday_label(dt: DateTime<Tz>) -> &'static str {
    match dt.weekday() {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Three-letter month label (`Jan`..`Dec`).
pub fn month_label(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    NAMES[(month.saturating_sub(1) as usize).min(11)]
}

pub fn now_berlin() -> DateTime<Tz> {
    Utc::now().with_timezone(&BERLIN)
}

pub fn today_berlin_iso() -> String {
    now_berlin().date_naive().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_suffix_defaults_to_us() {
        let (tz, start) = exchange_tz_and_start("ZZZ");
        assert_eq!(tz, chrono_tz::America::New_York);
        assert_eq!(start, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }

    #[test]
    fn eod_flag_overrides_time_check() {
        let f = classify_freshness("US", Utc::now(), true, false);
        assert_eq!(f, Freshness::PreviousCloseEod);
        assert_eq!(f.note(), "End of day price");
    }

    #[test]
    fn month_labels_wrap_correctly() {
        assert_eq!(month_label(1), "Jan");
        assert_eq!(month_label(12), "Dec");
    }
}
