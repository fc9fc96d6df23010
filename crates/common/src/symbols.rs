// =============================================================================
// Symbol normalization — shared between the market-data aggregator and the
// portfolio ledger so a bare ticker always resolves the same way.
// =============================================================================
//
// Grounded in `original_source/services/market_data/app/utils/symbols.py`.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Stock,
    Etf,
    Crypto,
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
            Self::Crypto => "crypto",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AssetClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stock" | "stocks" | "equity" | "equities" | "share" | "shares" => Ok(Self::Stock),
            "etf" | "etfs" | "fund" | "funds" => Ok(Self::Etf),
            "crypto" | "crypt" | "cryptocurrency" | "coin" | "coins" | "btc" => Ok(Self::Crypto),
            _ => Err(()),
        }
    }
}

/// Uppercase, append `.US` to a bare ticker, and keep crypto pairs like
/// `BTC-USD` verbatim.
pub fn normalize_symbol(raw: &str) -> String {
    let s = raw.trim().to_ascii_uppercase();
    if s.contains('-') {
        return s;
    }
    if !s.contains('.') {
        return format!("{s}.US");
    }
    s
}

/// Infer `(market, currency)` from a normalized symbol's suffix.
pub fn infer_market_currency(symbol: &str) -> (&'static str, &'static str) {
    if symbol.contains('-') {
        return ("CRYPTO", "USD");
    }
    if symbol.ends_with(".XETRA") {
        return ("XETRA", "EUR");
    }
    ("US", "USD")
}

/// Infer the asset class a symbol most likely belongs to from its shape
/// alone (used as a fallback when no market-data meta is available).
pub fn infer_asset_class(symbol: &str) -> AssetClass {
    if symbol.contains('-') {
        AssetClass::Crypto
    } else if symbol.ends_with(".XETRA") || symbol.ends_with(".MI") {
        AssetClass::Etf
    } else {
        AssetClass::Stock
    }
}

/// Extract the exchange suffix (defaulting to `US`) used for session-start
/// lookups in the freshness classifier.
pub fn symbol_suffix(symbol: &str) -> &str {
    match symbol.rsplit_once('.') {
        Some((_, suffix)) => suffix,
        None => "US",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ticker_gets_us_suffix() {
        assert_eq!(normalize_symbol("aapl"), "AAPL.US");
    }

    #[test]
    fn crypto_kept_verbatim() {
        assert_eq!(normalize_symbol("btc-usd"), "BTC-USD");
    }

    #[test]
    fn explicit_suffix_kept() {
        assert_eq!(normalize_symbol("sap.xetra"), "SAP.XETRA");
    }

    #[test]
    fn infers_xetra_eur() {
        assert_eq!(infer_market_currency("SAP.XETRA"), ("XETRA", "EUR"));
    }

    #[test]
    fn asset_class_alias_resolves() {
        assert_eq!("shares".parse::<AssetClass>(), Ok(AssetClass::Stock));
        assert_eq!("btc".parse::<AssetClass>(), Ok(AssetClass::Crypto));
    }
}
