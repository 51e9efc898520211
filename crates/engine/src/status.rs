//! Status and stage vocabularies.
//!
//! Status values are an open set configured on the backend. The tables below
//! only map the known ones to a visual tone; anything else falls back to
//! [`StatusTone::Neutral`].

use serde::{Deserialize, Serialize};

use crate::{RecordKind, util::fold_key};

/// Visual category of a status, consumed by badges and chart colors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Success,
    Warning,
    Danger,
    Info,
    #[default]
    Neutral,
}

impl StatusTone {
    /// Hex color used by chart series for this tone.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Success => "#52c41a",
            Self::Warning => "#faad14",
            Self::Danger => "#ff4d4f",
            Self::Info => "#1677ff",
            Self::Neutral => "#8c8c8c",
        }
    }
}

const LEAD_STATUSES: &[(&str, StatusTone)] = &[
    ("new", StatusTone::Info),
    ("not contacted", StatusTone::Info),
    ("attempted to contact", StatusTone::Warning),
    ("contact in future", StatusTone::Warning),
    ("contacted", StatusTone::Info),
    ("qualified", StatusTone::Success),
    ("pre qualified", StatusTone::Warning),
    ("converted", StatusTone::Success),
    ("not qualified", StatusTone::Danger),
    ("junk lead", StatusTone::Danger),
    ("lost lead", StatusTone::Danger),
];

const CONTACT_STATUSES: &[(&str, StatusTone)] = &[
    ("active", StatusTone::Success),
    ("engaged", StatusTone::Info),
    ("prospect", StatusTone::Info),
    ("customer", StatusTone::Success),
    ("inactive", StatusTone::Neutral),
    ("do not contact", StatusTone::Danger),
];

const DEAL_STAGES: &[(&str, StatusTone)] = &[
    ("qualification", StatusTone::Info),
    ("needs analysis", StatusTone::Info),
    ("value proposition", StatusTone::Info),
    ("identify decision makers", StatusTone::Info),
    ("proposal price quote", StatusTone::Warning),
    ("negotiation review", StatusTone::Warning),
    ("closed won", StatusTone::Success),
    ("won", StatusTone::Success),
    ("closed lost", StatusTone::Danger),
    ("lost", StatusTone::Danger),
    ("closed lost to competition", StatusTone::Danger),
];

fn table(kind: RecordKind) -> &'static [(&'static str, StatusTone)] {
    match kind {
        RecordKind::Lead => LEAD_STATUSES,
        RecordKind::Contact => CONTACT_STATUSES,
        RecordKind::Deal => DEAL_STAGES,
    }
}

/// Tone for a status of the given kind. Unknown or empty statuses are
/// [`StatusTone::Neutral`].
#[must_use]
pub fn tone_for(kind: RecordKind, status: &str) -> StatusTone {
    let key = fold_key(status);
    if key.is_empty() {
        return StatusTone::Neutral;
    }
    table(kind)
        .iter()
        .find_map(|(known, tone)| (*known == key).then_some(*tone))
        .unwrap_or_default()
}

/// Statuses known for a kind, in pipeline order.
pub fn known_statuses(kind: RecordKind) -> impl Iterator<Item = &'static str> {
    table(kind).iter().map(|(status, _)| *status)
}

/// `true` for stages counted as won in win-rate computations.
#[must_use]
pub fn is_won_stage(stage: &str) -> bool {
    matches!(fold_key(stage).as_str(), "closed won" | "won")
}

/// `true` for stages counted as lost.
#[must_use]
pub fn is_lost_stage(stage: &str) -> bool {
    let key = fold_key(stage);
    key == "lost" || key.starts_with("closed lost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_ignore_case_and_punctuation() {
        assert_eq!(tone_for(RecordKind::Lead, "Qualified"), StatusTone::Success);
        assert_eq!(tone_for(RecordKind::Lead, "junk-lead"), StatusTone::Danger);
        assert_eq!(
            tone_for(RecordKind::Deal, "Proposal/Price Quote"),
            StatusTone::Warning
        );
    }

    #[test]
    fn unknown_status_falls_back_to_neutral() {
        assert_eq!(tone_for(RecordKind::Contact, "Mystery"), StatusTone::Neutral);
        assert_eq!(tone_for(RecordKind::Deal, ""), StatusTone::Neutral);
    }

    #[test]
    fn won_and_lost_stages() {
        assert!(is_won_stage("Closed Won"));
        assert!(is_won_stage("WON"));
        assert!(!is_won_stage("Closed Lost"));
        assert!(is_lost_stage("Closed-Lost to Competition"));
        assert!(!is_lost_stage("Negotiation/Review"));
    }
}
