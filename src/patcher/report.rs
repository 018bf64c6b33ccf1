//! What a patch request did.

use std::fmt;

use strum::Display;

/// Kind of change applied to the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChangeKind {
    /// A type was added
    #[strum(serialize = "added type")]
    AddedType,
    /// Members were added to an existing enum
    #[strum(serialize = "updated enum")]
    UpdatedEnum,
    /// The body of an existing method was replaced
    #[strum(serialize = "spliced method")]
    SplicedMethod,
    /// A method was added to an existing type
    #[strum(serialize = "added method")]
    AddedMethod,
}

/// One applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Kind
    pub kind: ChangeKind,
    /// Affected symbol, `Type` or `Type::Member`
    pub symbol: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.symbol)
    }
}

/// Result of one patch request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Type the fragment declared
    pub target: String,
    /// Applied changes in order
    pub applied: Vec<Change>,
    /// Non-fatal problems, such as skipped methods
    pub warnings: Vec<String>,
}

impl PatchReport {
    /// An empty report for `target`.
    pub fn new(target: impl Into<String>) -> Self {
        PatchReport {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Record and log an applied change.
    pub fn applied(&mut self, kind: ChangeKind, symbol: impl Into<String>) {
        let change = Change {
            kind,
            symbol: symbol.into(),
        };
        log::info!("{change}");
        self.applied.push(change);
    }

    /// Record and log a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    /// Whether the request changed the module.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_changes_and_warnings() {
        let mut report = PatchReport::new("Game.Player");
        assert!(!report.changed());
        report.applied(ChangeKind::SplicedMethod, "Game.Player::Tick");
        report.warn("Method 'Dance' not found in compiled module, skipped");
        assert!(report.changed());
        assert_eq!(report.applied[0].to_string(), "spliced method Game.Player::Tick");
        assert_eq!(report.warnings.len(), 1);
    }
}
