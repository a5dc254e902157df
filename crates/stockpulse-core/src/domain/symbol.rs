use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Suffixes that mark a domestic listing (primary and secondary venue).
pub const DOMESTIC_SUFFIXES: [&str; 2] = ["TW", "TWO"];

/// Market classification derived from the lexical shape of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    Domestic,
    Foreign,
    Unknown,
}

impl Market {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Domestic => "DOMESTIC",
            Self::Foreign => "FOREIGN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trimmed, upper-cased ticker.
///
/// Parsing is idempotent: `Symbol::parse(s.as_str())` yields `s` again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            // '^' prefixes index tickers such as ^TWII.
            let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '^';
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn market(&self) -> Market {
        classify(&self.0)
    }

    /// Ticker without its exchange suffix.
    pub fn code(&self) -> &str {
        split_suffix(&self.0).0
    }

    pub fn suffix(&self) -> Option<&str> {
        split_suffix(&self.0).1
    }

    /// Appends `.suffix` unless the symbol already carries a suffix.
    pub fn with_default_suffix(&self, suffix: &str) -> Self {
        if self.suffix().is_some() {
            self.clone()
        } else {
            Self(format!("{}.{}", self.0, suffix.to_ascii_uppercase()))
        }
    }

    /// Removes the exchange suffix when it is one of `suffixes`.
    pub fn without_suffix(&self, suffixes: &[&str]) -> Self {
        match self.suffix() {
            Some(suffix) if suffixes.contains(&suffix) => Self(self.code().to_owned()),
            _ => self.clone(),
        }
    }
}

/// Classifies a normalized ticker.
///
/// A 4–6 digit code, optionally with a domestic suffix, is domestic. One to five letters
/// with an optional single-letter class suffix is foreign. Everything else is unknown.
pub fn classify(symbol: &str) -> Market {
    let (code, suffix) = split_suffix(symbol);

    let domestic_suffix = suffix.map_or(true, |suffix| DOMESTIC_SUFFIXES.contains(&suffix));
    if is_domestic_code(code) && domestic_suffix {
        return Market::Domestic;
    }

    let class_suffix = suffix.map_or(true, |suffix| {
        suffix.len() == 1 && suffix.chars().all(|ch| ch.is_ascii_uppercase())
    });
    if is_foreign_code(code) && class_suffix {
        return Market::Foreign;
    }

    Market::Unknown
}

pub(crate) fn is_domestic_code(code: &str) -> bool {
    (4..=6).contains(&code.len()) && code.chars().all(|ch| ch.is_ascii_digit())
}

pub(crate) fn is_foreign_code(code: &str) -> bool {
    (1..=5).contains(&code.len()) && code.chars().all(|ch| ch.is_ascii_uppercase())
}

fn split_suffix(symbol: &str) -> (&str, Option<&str>) {
    match symbol.split_once('.') {
        Some((code, suffix)) => (code, Some(suffix)),
        None => (symbol, None),
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
