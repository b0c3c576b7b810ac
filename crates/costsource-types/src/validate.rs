//! Field-level predicates shared by plugins and conformance checks.

/// ISO-4217 codes accepted by the ecosystem.
const KNOWN_CURRENCIES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "DKK", "EUR", "GBP", "HKD", "INR", "JPY", "KRW", "MXN",
    "NOK", "NZD", "SEK", "SGD", "USD", "ZAR",
];

/// Three upper-case ASCII letters that name a known currency.
pub fn is_valid_currency(code: &str) -> bool {
    code.len() == 3
        && code.bytes().all(|b| b.is_ascii_uppercase())
        && KNOWN_CURRENCIES.contains(&code)
}

/// Finite and not below zero.
pub fn is_non_negative_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Finite and within `0.0..=1.0`.
pub fn is_probability(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Plugin names are lower-case identifiers: `[a-z0-9][a-z0-9_-]*`, at most 64 bytes.
pub fn is_valid_plugin_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => {}
        _ => return false,
    }
    name.len() <= 64
        && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency() {
        assert!(is_valid_currency("USD"));
        assert!(is_valid_currency("EUR"));
        assert!(!is_valid_currency("usd"));
        assert!(!is_valid_currency("US"));
        assert!(!is_valid_currency("XXX"));
        assert!(!is_valid_currency(""));
    }

    #[test]
    fn test_non_negative_amount() {
        assert!(is_non_negative_amount(0.0));
        assert!(is_non_negative_amount(12.5));
        assert!(!is_non_negative_amount(-0.01));
        assert!(!is_non_negative_amount(f64::NAN));
        assert!(!is_non_negative_amount(f64::INFINITY));
    }

    #[test]
    fn test_probability() {
        assert!(is_probability(0.0));
        assert!(is_probability(1.0));
        assert!(!is_probability(1.5));
        assert!(!is_probability(-0.1));
    }

    #[test]
    fn test_plugin_name() {
        assert!(is_valid_plugin_name("aws-public"));
        assert!(is_valid_plugin_name("kubecost_v2"));
        assert!(!is_valid_plugin_name(""));
        assert!(!is_valid_plugin_name("-leading"));
        assert!(!is_valid_plugin_name("Upper"));
        assert!(!is_valid_plugin_name(&"a".repeat(65)));
    }
}
