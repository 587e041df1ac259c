//! Conversion between decimal coin amounts and integer minor units.

use crate::marketplace::{Cryptocurrency, COIN};

/// Number of decimal places in one coin.
pub const DECIMALS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("malformed amount '{0}'")]
    Malformed(String),
    #[error("amount '{0}' is not an exact number of minor units")]
    Fractional(String),
    #[error("amount '{amount}' exceeds the maximum supply of {currency}")]
    ExceedsMaxSupply {
        amount: String,
        currency: Cryptocurrency,
    },
}

/// Parse a decimal string such as `"3.99995"` into minor units.
///
/// Digits beyond the eighth decimal place are only accepted when they are
/// zero; anything else would need rounding and is rejected.
pub fn parse_decimal(input: &str, currency: Cryptocurrency) -> Result<u64, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    let malformed = || AmountError::Malformed(input.to_string());

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
        || (s.contains('.') && frac.is_empty())
    {
        return Err(malformed());
    }

    let (kept, excess) = frac.split_at(frac.len().min(DECIMALS));
    if excess.bytes().any(|b| b != b'0') {
        return Err(AmountError::Fractional(input.to_string()));
    }

    let too_large = || AmountError::ExceedsMaxSupply {
        amount: input.to_string(),
        currency,
    };
    let whole: u64 = whole.parse().map_err(|_| too_large())?;
    let mut frac_units: u64 = 0;
    for (i, digit) in kept.bytes().enumerate() {
        let place = 10u64.pow((DECIMALS - 1 - i) as u32);
        frac_units += u64::from(digit - b'0') * place;
    }

    let units = whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(too_large)?;
    if units > currency.max_supply() {
        return Err(too_large());
    }
    Ok(units)
}

/// Format minor units as a decimal string with trailing zeros trimmed.
pub fn format_amount(units: u64) -> String {
    let whole = units / COIN;
    let frac = units % COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = DECIMALS);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Minor units for a whole number of coins.
pub const fn coins(n: u64) -> u64 {
    n * COIN
}
