//! Display formatting for metric values and thresholds.
//!
//! Formatting never fails: non-finite values render as literal tokens so a
//! reason string can always be built.

use serde::{Deserialize, Serialize};

/// Values at or below this many decimal places are printed positionally;
/// smaller magnitudes fall back to scientific notation.
const MAX_DECIMALS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormatStyle {
    /// Ratio rendered as a percentage with one decimal (`0.871` -> `87.1%`).
    Percent,
    /// Decimal places adapted to magnitude.
    HighPrecision,
}

impl FormatStyle {
    /// Style used for a metric field: `*.pct` fields hold ratios.
    ///
    /// # Examples
    ///
    /// ```
    /// use metricwatch_common::format::FormatStyle;
    ///
    /// assert_eq!(FormatStyle::for_metric("system.cpu.total.pct"), FormatStyle::Percent);
    /// assert_eq!(FormatStyle::for_metric("system.load.1"), FormatStyle::HighPrecision);
    /// ```
    pub fn for_metric(metric: &str) -> Self {
        if metric.ends_with(".pct") {
            FormatStyle::Percent
        } else {
            FormatStyle::HighPrecision
        }
    }
}

/// Render `value` in the given style.
///
/// # Examples
///
/// ```
/// use metricwatch_common::format::{format_value, FormatStyle};
///
/// assert_eq!(format_value(0.871, FormatStyle::Percent), "87.1%");
/// assert_eq!(format_value(1234567.891, FormatStyle::HighPrecision), "1,234,567.9");
/// assert_eq!(format_value(0.001234, FormatStyle::HighPrecision), "0.00123");
/// assert_eq!(format_value(f64::NAN, FormatStyle::HighPrecision), "NaN");
/// ```
pub fn format_value(value: f64, style: FormatStyle) -> String {
    if let Some(token) = non_finite(value) {
        return token;
    }
    match style {
        FormatStyle::Percent => {
            let scaled = value * 100.0;
            match non_finite(scaled) {
                Some(token) => format!("{token}%"),
                None => format!("{scaled:.1}%"),
            }
        }
        FormatStyle::HighPrecision => high_precision(value),
    }
}

fn non_finite(value: f64) -> Option<String> {
    if value.is_nan() {
        Some("NaN".to_string())
    } else if value.is_infinite() {
        Some(if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string())
    } else {
        None
    }
}

fn high_precision(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let abs = value.abs();
    if abs >= 1000.0 {
        group_thousands(&trim_zeros(format!("{value:.1}")))
    } else if abs >= 1.0 {
        // Rounding can carry into the thousands (999.995 -> 1000).
        group_thousands(&trim_zeros(format!("{value:.2}")))
    } else {
        // Three significant digits below one.
        let decimals = (-abs.log10().floor()) as usize + 2;
        if decimals > MAX_DECIMALS {
            format!("{value:.2e}")
        } else {
            trim_zeros(format!("{value:.decimals$}"))
        }
    }
}

fn trim_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
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
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_multiplies_and_keeps_one_decimal() {
        assert_eq!(format_value(0.5, FormatStyle::Percent), "50.0%");
        assert_eq!(format_value(1.0, FormatStyle::Percent), "100.0%");
        assert_eq!(format_value(0.0, FormatStyle::Percent), "0.0%");
    }

    #[test]
    fn high_precision_adapts_to_magnitude() {
        assert_eq!(format_value(0.0, FormatStyle::HighPrecision), "0");
        assert_eq!(format_value(7.0, FormatStyle::HighPrecision), "7");
        assert_eq!(format_value(3.14159, FormatStyle::HighPrecision), "3.14");
        assert_eq!(format_value(512.5, FormatStyle::HighPrecision), "512.5");
        assert_eq!(format_value(-2500.0, FormatStyle::HighPrecision), "-2,500");
        assert_eq!(format_value(0.5, FormatStyle::HighPrecision), "0.5");
        assert_eq!(format_value(-0.0456789, FormatStyle::HighPrecision), "-0.0457");
    }

    #[test]
    fn rounding_up_to_a_thousand_is_grouped() {
        assert_eq!(format_value(999.995, FormatStyle::HighPrecision), "1,000");
        assert_eq!(format_value(-999.999, FormatStyle::HighPrecision), "-1,000");
        assert_eq!(format_value(999.99, FormatStyle::HighPrecision), "999.99");
    }

    #[test]
    fn tiny_values_use_scientific_notation() {
        assert_eq!(format_value(1.5e-20, FormatStyle::HighPrecision), "1.50e-20");
    }

    #[test]
    fn non_finite_values_render_as_tokens() {
        assert_eq!(format_value(f64::INFINITY, FormatStyle::HighPrecision), "Infinity");
        assert_eq!(format_value(f64::NEG_INFINITY, FormatStyle::Percent), "-Infinity");
        assert_eq!(format_value(f64::MAX, FormatStyle::Percent), "Infinity%");
    }

    #[test]
    fn formatting_is_deterministic() {
        for v in [0.0, 0.123, 42.0, 99_999.99, -1.0e-4] {
            assert_eq!(
                format_value(v, FormatStyle::HighPrecision),
                format_value(v, FormatStyle::HighPrecision)
            );
        }
    }
}
