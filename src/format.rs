//! Human-readable rendering of money, percentages and quantities for the CLI.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Shown wherever a percentage is undefined (zero cost basis).
pub const UNDEFINED_PERCENT: &str = "—";

/// How reporting-currency amounts are printed.
///
/// - `decimals`: rounding precision, half away from zero
/// - `grouping`: thousands separators (`,`)
/// - `symbol`: optional prefix such as `R$`
/// - `fixed_decimals`: pad to exactly `decimals` places
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoneyFormat {
    pub decimals: Option<u32>,
    pub grouping: bool,
    pub symbol: Option<String>,
    pub fixed_decimals: bool,
}

impl Default for MoneyFormat {
    fn default() -> Self {
        Self {
            decimals: Some(2),
            grouping: true,
            symbol: Some("R$ ".to_string()),
            fixed_decimals: true,
        }
    }
}

impl MoneyFormat {
    /// Canonical numeric form: rounded, trailing zeros stripped, nothing else.
    pub fn plain() -> Self {
        Self {
            decimals: None,
            grouping: false,
            symbol: None,
            fixed_decimals: false,
        }
    }

    pub fn format(&self, value: Decimal) -> String {
        let rounded = round(value, self.decimals);
        let negative = rounded.is_sign_negative() && !rounded.is_zero();

        let mut digits = rounded.abs().normalize().to_string();
        if self.fixed_decimals {
            if let Some(dp) = self.decimals {
                digits = pad_fraction(&digits, dp);
            }
        }
        if self.grouping {
            digits = group_thousands(&digits);
        }

        let mut out = String::new();
        if negative {
            out.push('-');
        }
        if let Some(symbol) = &self.symbol {
            out.push_str(symbol);
        }
        out.push_str(&digits);
        out
    }
}

fn round(value: Decimal, decimals: Option<u32>) -> Decimal {
    match decimals {
        Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        None => value,
    }
}

/// `12.35%`, or the undefined marker for `None`.
pub fn format_percent(value: Option<Decimal>) -> String {
    match value {
        Some(v) => format!("{}%", pad_fraction(&round(v, Some(2)).normalize().to_string(), 2)),
        None => UNDEFINED_PERCENT.to_string(),
    }
}

/// Percent with an explicit sign, for daily moves.
pub fn format_signed_percent(value: Decimal) -> String {
    let body = format_percent(Some(value));
    if value.is_sign_positive() && !value.is_zero() {
        format!("+{body}")
    } else {
        body
    }
}

pub fn format_quantity(value: Decimal) -> String {
    group_thousands(&value.normalize().to_string())
}

fn group_thousands(s: &str) -> String {
    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        grouped.push(ch);
        let remaining = len - i - 1;
        if remaining > 0 && remaining % 3 == 0 {
            grouped.push(',');
        }
    }

    match frac_part {
        Some(f) if !f.is_empty() => format!("{sign}{grouped}.{f}"),
        _ => format!("{sign}{grouped}"),
    }
}

fn pad_fraction(s: &str, dp: u32) -> String {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if dp == 0 {
        return int_part.to_string();
    }
    let dp = dp as usize;
    let mut frac: String = frac_part.chars().take(dp).collect();
    while frac.len() < dp {
        frac.push('0');
    }
    format!("{int_part}.{frac}")
}
