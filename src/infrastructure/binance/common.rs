//! Shared constants and helpers for the Binance adapters (§6 exchange client
//! contract, implemented against Binance as the one supported exchange).

use crate::domain::errors::ExchangeError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// REST error bodies Binance returns carry a numeric `code`; codes in this
/// range are documented as filter/parameter/auth failures that retrying
/// will never fix (`-1000`..`-2999` covers general, request, and order
/// processing errors including insufficient balance and rule violations).
/// Anything else (network errors, 5xx, 429/418 rate limiting) is retryable.
pub fn classify_status(status: reqwest::StatusCode, body: &str) -> ExchangeError {
    if status.as_u16() == 429 || status.as_u16() == 418 || status.is_server_error() {
        return ExchangeError::Retryable(format!("http {status}: {body}"));
    }
    if let Some(code) = extract_binance_code(body) {
        if (-2999..=-1000).contains(&code) {
            return ExchangeError::NonRetryable(format!("binance error {code}: {body}"));
        }
    }
    ExchangeError::NonRetryable(format!("http {status}: {body}"))
}

fn extract_binance_code(body: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("code")?.as_i64()
}

/// HMAC-SHA256 signature over a query string, hex-encoded (teacher
/// precedent: `BinanceExecutionService::sign_request`).
pub fn sign_request(api_secret: &str, query_string: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(api_secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Binance kline interval string for a given timeframe. The engine's
/// `timeframe` config field is already the Binance-native string (e.g.
/// "4h"), so this only validates it against the set Binance accepts.
pub fn is_supported_interval(timeframe: &str) -> bool {
    matches!(
        timeframe,
        "1m" | "3m"
            | "5m"
            | "15m"
            | "30m"
            | "1h"
            | "2h"
            | "4h"
            | "6h"
            | "8h"
            | "12h"
            | "1d"
            | "3d"
            | "1w"
            | "1M"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_request_produces_64_hex_chars() {
        let sig = sign_request("secret", "symbol=BTCUSDT&side=BUY&timestamp=1");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn classifies_rate_limit_as_retryable() {
        let err = classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}");
        assert!(matches!(err, ExchangeError::Retryable(_)));
    }

    #[test]
    fn classifies_insufficient_balance_as_non_retryable() {
        let body = r#"{"code":-2010,"msg":"Account has insufficient balance"}"#;
        let err = classify_status(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ExchangeError::NonRetryable(_)));
    }

    #[test]
    fn recognizes_supported_intervals() {
        assert!(is_supported_interval("4h"));
        assert!(!is_supported_interval("7h"));
    }
}
