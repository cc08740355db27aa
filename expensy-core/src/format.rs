//! Money and percentage display

use serde::{Deserialize, Serialize};

/// Display preferences for amounts. Defaults to Brazilian real, pt-BR style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub decimal_separator: char,
    pub grouping_separator: char,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            symbol: "R$".to_string(),
            decimal_separator: ',',
            grouping_separator: '.',
        }
    }
}

impl CurrencyFormat {
    /// `1234.5` -> `R$ 1.234,50`
    pub fn format(&self, amount: f64) -> String {
        let cents = (amount.abs() * 100.0).round() as u64;
        let whole = (cents / 100).to_string();
        let frac = cents % 100;

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(self.grouping_separator);
            }
            grouped.push(ch);
        }

        let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
        format!(
            "{sign}{} {grouped}{}{frac:02}",
            self.symbol, self.decimal_separator
        )
    }
}

pub fn format_percentage(value: f64) -> String {
    format!("{value:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brl_default() {
        let f = CurrencyFormat::default();
        assert_eq!(f.format(0.0), "R$ 0,00");
        assert_eq!(f.format(150.0), "R$ 150,00");
        assert_eq!(f.format(1234.5), "R$ 1.234,50");
        assert_eq!(f.format(1234567.891), "R$ 1.234.567,89");
        assert_eq!(f.format(-10.0), "-R$ 10,00");
    }

    #[test]
    fn test_custom_separators() {
        let f = CurrencyFormat {
            symbol: "$".to_string(),
            decimal_separator: '.',
            grouping_separator: ',',
        };
        assert_eq!(f.format(98765.4), "$ 98,765.40");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(format_percentage(87.625), "87.6%");
        assert_eq!(format_percentage(100.0), "100.0%");
    }
}
