#![forbid(unsafe_code)]

//! Dimension value parsing and formatting.
//!
//! A size expression arrives from the editing surface as a raw string,
//! a bare number, or nothing at all. [`parse`] normalizes any of these
//! into a [`DimensionValue`]; [`DimensionValue::format`] produces the
//! canonical string the rest of the engine caches and broadcasts.
//!
//! # Invariants
//!
//! 1. A `Some` numeric value never pairs with [`Unit::Auto`].
//! 2. `parse` never fails: malformed input degrades to an empty pixel
//!    value, absent input degrades to `auto`.
//! 3. `format` of an empty value is `"auto"` under `Auto` and `""`
//!    under `Px`/`Percent`.
//!
//! # Failure Modes
//!
//! None — parsing is total by design. A keystroke-by-keystroke editor
//! feeds half-typed expressions through here constantly; rejecting them
//! would make live editing unusable.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Measurement unit for a dimension value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Absolute pixels.
    Px,
    /// Percent of the reference box (the ancestor that defines 100%).
    Percent,
    /// No explicit size; the layout decides.
    Auto,
}

impl Unit {
    /// The unit suffix as it appears in a size expression.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Unit::Px => "px",
            Unit::Percent => "%",
            Unit::Auto => "auto",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Raw input to [`parse`]: the loose shapes the editing surface produces.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// A bare number (treated as pixels).
    Number(f64),
    /// A size expression such as `"100px"`, `"50%"`, or `"auto"`.
    Text(String),
    /// No input at all.
    Empty,
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i32> for RawValue {
    fn from(n: i32) -> Self {
        RawValue::Number(f64::from(n))
    }
}

impl From<u32> for RawValue {
    fn from(n: u32) -> Self {
        RawValue::Number(f64::from(n))
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => RawValue::Empty,
        }
    }
}

/// A parsed size: an optional numeric value plus its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionValue {
    /// Numeric magnitude. `None` means "no value" (empty or auto).
    pub value: Option<f64>,
    /// Unit the magnitude is expressed in.
    pub unit: Unit,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl DimensionValue {
    /// An automatic (layout-decided) size.
    #[must_use]
    pub const fn auto() -> Self {
        Self {
            value: None,
            unit: Unit::Auto,
        }
    }

    /// An empty pixel value (what malformed input degrades to).
    #[must_use]
    pub const fn empty_px() -> Self {
        Self {
            value: None,
            unit: Unit::Px,
        }
    }

    /// A pixel value.
    #[must_use]
    pub const fn px(value: f64) -> Self {
        Self {
            value: Some(value),
            unit: Unit::Px,
        }
    }

    /// A percent-of-reference value.
    #[must_use]
    pub const fn percent(value: f64) -> Self {
        Self {
            value: Some(value),
            unit: Unit::Percent,
        }
    }

    /// Whether this value carries a usable number.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.value.is_some() && !matches!(self.unit, Unit::Auto)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a raw size expression into a [`DimensionValue`].
///
/// Rules, in order:
/// - numeric input → that value in pixels (non-finite numbers degrade
///   to an empty pixel value);
/// - absent input or an empty/whitespace string → `auto`;
/// - the literal `"auto"` (any case) → `auto`;
/// - a plain decimal with an optional `px`/`%` suffix → that value in
///   the matched unit, pixels by default;
/// - anything else → an empty pixel value. Malformed input is not an
///   error.
#[must_use]
pub fn parse(raw: impl Into<RawValue>) -> DimensionValue {
    match raw.into() {
        RawValue::Number(n) => {
            if n.is_finite() {
                DimensionValue::px(n)
            } else {
                DimensionValue::empty_px()
            }
        }
        RawValue::Empty => DimensionValue::auto(),
        RawValue::Text(s) => parse_text(s.trim()),
    }
}

fn parse_text(text: &str) -> DimensionValue {
    if text.is_empty() || text.eq_ignore_ascii_case("auto") {
        return DimensionValue::auto();
    }

    let (body, unit) = if let Some(stripped) = text.strip_suffix("px") {
        (stripped, Unit::Px)
    } else if let Some(stripped) = text.strip_suffix('%') {
        (stripped, Unit::Percent)
    } else {
        (text, Unit::Px)
    };

    if is_plain_decimal(body) {
        match body.parse::<f64>() {
            Ok(n) if n.is_finite() => DimensionValue {
                value: Some(n),
                unit,
            },
            _ => DimensionValue::empty_px(),
        }
    } else {
        DimensionValue::empty_px()
    }
}

/// Whether `s` is an unsigned decimal: optional integer digits, at most
/// one dot, at least one digit, nothing else. Rejects signs, exponents,
/// and embedded whitespace, which a size expression never carries.
fn is_plain_decimal(s: &str) -> bool {
    let mut seen_dot = false;
    let mut last_was_digit = false;
    if s.is_empty() {
        return false;
    }
    for c in s.chars() {
        if c.is_ascii_digit() {
            last_was_digit = true;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            last_was_digit = false;
        } else {
            return false;
        }
    }
    last_was_digit
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

impl DimensionValue {
    /// Format as the canonical string: `"{value}{unit}"`, `"auto"` for
    /// automatic sizes, `""` for an empty px/percent value.
    #[must_use]
    pub fn format(&self) -> String {
        match (self.value, self.unit) {
            (_, Unit::Auto) => "auto".to_string(),
            (None, _) => String::new(),
            (Some(n), unit) => format!("{}{}", n, unit.suffix()),
        }
    }
}

impl std::fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
