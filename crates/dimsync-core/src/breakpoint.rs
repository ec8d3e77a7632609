#![forbid(unsafe_code)]

//! Device breakpoint tiers.
//!
//! An entity on the banner canvas can carry independent dimension values
//! per breakpoint. The tier set is fixed: desktop, tablet, mobile.
//!
//! # Invariants
//!
//! 1. `ALL` lists every tier exactly once, largest first.
//! 2. `parse_lossy` never fails: unknown labels fall back to `Desktop`.

use serde::{Deserialize, Serialize};

/// A named device/viewport context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breakpoint {
    /// Full-width desktop viewport (the authoring default).
    #[default]
    Desktop,
    /// Tablet-class viewport.
    Tablet,
    /// Phone-class viewport.
    Mobile,
}

impl Breakpoint {
    /// Every tier, largest first.
    pub const ALL: [Breakpoint; 3] = [Breakpoint::Desktop, Breakpoint::Tablet, Breakpoint::Mobile];

    /// Lowercase label as used on the wire and in diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Breakpoint::Desktop => "desktop",
            Breakpoint::Tablet => "tablet",
            Breakpoint::Mobile => "mobile",
        }
    }

    /// Parse a label, if it names a known tier.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "desktop" => Some(Breakpoint::Desktop),
            "tablet" => Some(Breakpoint::Tablet),
            "mobile" => Some(Breakpoint::Mobile),
            _ => None,
        }
    }

    /// Parse a label, falling back to [`Breakpoint::Desktop`] for
    /// anything unrecognized. The fallback is logged, not an error.
    #[must_use]
    pub fn parse_lossy(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            tracing::warn!(label, "unknown breakpoint label, falling back to desktop");
            Breakpoint::Desktop
        })
    }
}

impl std::fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for bp in Breakpoint::ALL {
            assert_eq!(Breakpoint::from_label(bp.label()), Some(bp));
        }
    }

    #[test]
    fn from_label_is_case_insensitive() {
        assert_eq!(Breakpoint::from_label("Desktop"), Some(Breakpoint::Desktop));
        assert_eq!(Breakpoint::from_label(" MOBILE "), Some(Breakpoint::Mobile));
    }

    #[test]
    fn unknown_label_is_none() {
        assert_eq!(Breakpoint::from_label("watch"), None);
        assert_eq!(Breakpoint::from_label(""), None);
    }

    #[test]
    fn parse_lossy_falls_back_to_desktop() {
        assert_eq!(Breakpoint::parse_lossy("watch"), Breakpoint::Desktop);
        assert_eq!(Breakpoint::parse_lossy("tablet"), Breakpoint::Tablet);
    }

    #[test]
    fn default_is_desktop() {
        assert_eq!(Breakpoint::default(), Breakpoint::Desktop);
    }

    #[test]
    fn display_matches_label() {
        assert_eq!(Breakpoint::Tablet.to_string(), "tablet");
    }

    #[test]
    fn all_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for bp in Breakpoint::ALL {
            assert!(seen.insert(bp));
        }
        assert_eq!(seen.len(), 3);
    }
}
