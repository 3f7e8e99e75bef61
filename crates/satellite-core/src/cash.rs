//! Cash position symbols of the form `CASH:<CURRENCY>:<bucket_id>`.

const CASH_PREFIX: &str = "CASH";

/// Symbol under which a bucket's cash in one currency is tracked as a position.
///
/// The currency is kept exactly as the ledger stores it, so parsing the
/// symbol yields a code that still matches the balance rows.
pub fn cash_symbol(currency: &str, bucket_id: &str) -> String {
    format!("{}:{}:{}", CASH_PREFIX, currency, bucket_id)
}

/// Split a cash symbol into `(currency, bucket_id)`.
pub fn parse_cash_symbol(symbol: &str) -> Option<(String, String)> {
    let mut parts = symbol.splitn(3, ':');
    if parts.next()? != CASH_PREFIX {
        return None;
    }
    let currency = parts.next()?;
    let bucket_id = parts.next()?;
    if currency.is_empty() || bucket_id.is_empty() {
        return None;
    }
    Some((currency.to_string(), bucket_id.to_string()))
}

pub fn is_cash_symbol(symbol: &str) -> bool {
    parse_cash_symbol(symbol).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_symbol_format() {
        assert_eq!(cash_symbol("EUR", "core"), "CASH:EUR:core");
        assert_eq!(cash_symbol("eur", "core"), "CASH:eur:core");
        assert_eq!(
            parse_cash_symbol("CASH:USD:momentum"),
            Some(("USD".to_string(), "momentum".to_string()))
        );
    }

    #[test]
    fn test_rejects_non_cash_symbols() {
        assert!(!is_cash_symbol("AAPL"));
        assert!(!is_cash_symbol("CASH:EUR"));
        assert!(!is_cash_symbol("CASH::core"));
        assert!(!is_cash_symbol("STOCK:EUR:core"));
    }
}
