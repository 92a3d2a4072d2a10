/// Per-source cursor definitions
///
/// A cursor answers one question for the engine: has this candidate already
/// been emitted? It is advanced only after the corresponding record has been
/// persisted.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// How candidate IDs of a source are compared against the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
    /// IDs are monotonically increasing numbers; newer means greater
    #[default]
    Ordinal,

    /// IDs are opaque (hashes, tokens); newness is decided by set membership
    Membership,
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal => write!(f, "ordinal"),
            Self::Membership => write!(f, "membership"),
        }
    }
}

/// Persisted per-source crawl state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Greatest numeric candidate ID accepted so far
    pub last_seen_id: Option<String>,

    /// Detail URL of the most recently accepted item
    pub last_seen_url: Option<String>,

    /// Set once the first full backfill of the source has finished
    pub first_run_complete: bool,

    /// Opaque identities already accepted. Grows without eviction.
    #[serde(default)]
    pub seen_identity_set: BTreeSet<String>,
}

impl Cursor {
    /// Returns true if nothing has ever been recorded for this source
    pub fn is_empty(&self) -> bool {
        self.last_seen_id.is_none()
            && self.last_seen_url.is_none()
            && !self.first_run_complete
            && self.seen_identity_set.is_empty()
    }

    /// Decides whether a candidate ID has not been emitted yet
    ///
    /// Under ordinal identity a candidate is new iff it is numerically greater
    /// than `last_seen_id`. Candidates that do not parse as numbers cannot be
    /// ordered, so they fall back to a membership check instead of being
    /// re-emitted on every pass.
    pub fn is_new(&self, candidate_id: &str, mode: IdentityMode) -> bool {
        let candidate_id = candidate_id.trim();
        if candidate_id.is_empty() {
            return false;
        }

        match mode {
            IdentityMode::Membership => !self.seen_identity_set.contains(candidate_id),
            IdentityMode::Ordinal => match parse_ordinal(candidate_id) {
                Some(candidate) => match self.last_seen_ordinal() {
                    Some(last) => candidate > last,
                    None => true,
                },
                None => !self.seen_identity_set.contains(candidate_id),
            },
        }
    }

    /// Records an accepted candidate
    ///
    /// Empty IDs are ignored entirely. Under ordinal identity the last-seen
    /// marker only ever moves forward; an unparseable ID goes into the
    /// membership set and never touches the marker.
    ///
    /// # Returns
    ///
    /// `true` if the cursor changed
    pub fn record(
        &mut self,
        candidate_id: &str,
        detail_url: &str,
        mode: IdentityMode,
    ) -> bool {
        let candidate_id = candidate_id.trim();
        if candidate_id.is_empty() {
            return false;
        }

        let ordinal = match mode {
            IdentityMode::Ordinal => parse_ordinal(candidate_id),
            IdentityMode::Membership => None,
        };

        let changed = match ordinal {
            Some(candidate) => {
                let advances = self
                    .last_seen_ordinal()
                    .map_or(true, |last| candidate.cmp(&last) == Ordering::Greater);
                if advances {
                    self.last_seen_id = Some(candidate_id.to_string());
                }
                advances
            }
            None => self.seen_identity_set.insert(candidate_id.to_string()),
        };

        if changed {
            self.last_seen_url = Some(detail_url.to_string());
        }
        changed
    }

    /// Moves a chain source's position to a newly persisted detail page
    ///
    /// # Returns
    ///
    /// `true` if the cursor changed
    pub fn mark_chain_position(&mut self, detail_url: &str) -> bool {
        if detail_url.is_empty() || self.is_last_seen_url(detail_url) {
            return false;
        }
        self.last_seen_url = Some(detail_url.to_string());
        true
    }

    /// Returns true if a chain link points at the last item already emitted
    pub fn is_last_seen_url(&self, url: &str) -> bool {
        self.last_seen_url.as_deref() == Some(url)
    }

    /// Number of identities held in the membership set
    pub fn seen_count(&self) -> usize {
        self.seen_identity_set.len()
    }

    fn last_seen_ordinal(&self) -> Option<u64> {
        self.last_seen_id.as_deref().and_then(parse_ordinal)
    }
}

fn parse_ordinal(id: &str) -> Option<u64> {
    id.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor_at(id: &str) -> Cursor {
        Cursor {
            last_seen_id: Some(id.to_string()),
            first_run_complete: true,
            ..Cursor::default()
        }
    }

    #[test]
    fn test_default_is_empty() {
        assert!(Cursor::default().is_empty());
        assert!(!cursor_at("1").is_empty());
    }

    #[test]
    fn test_ordinal_comparison_is_numeric() {
        let cursor = cursor_at("100");
        assert!(!cursor.is_new("98", IdentityMode::Ordinal));
        assert!(!cursor.is_new("100", IdentityMode::Ordinal));
        assert!(cursor.is_new("101", IdentityMode::Ordinal));
        // "1000" > "100" numerically but also lexicographically; "99" is the trap
        assert!(!cursor.is_new("99", IdentityMode::Ordinal));
        assert!(cursor.is_new("1000", IdentityMode::Ordinal));
    }

    #[test]
    fn test_everything_is_new_without_marker() {
        let cursor = Cursor::default();
        assert!(cursor.is_new("1", IdentityMode::Ordinal));
        assert!(cursor.is_new("abc", IdentityMode::Membership));
    }

    #[test]
    fn test_empty_candidate_is_never_new() {
        assert!(!Cursor::default().is_new("", IdentityMode::Ordinal));
        assert!(!Cursor::default().is_new("  ", IdentityMode::Membership));
    }

    #[test]
    fn test_record_advances_monotonically() {
        let mut cursor = cursor_at("100");
        assert!(cursor.record("102", "https://a.kr/102", IdentityMode::Ordinal));
        assert!(!cursor.record("101", "https://a.kr/101", IdentityMode::Ordinal));
        assert_eq!(cursor.last_seen_id.as_deref(), Some("102"));
    }

    #[test]
    fn test_record_ignores_empty_id() {
        let mut cursor = cursor_at("100");
        cursor.last_seen_url = Some("https://a.kr/100".to_string());
        assert!(!cursor.record("", "https://a.kr/x", IdentityMode::Ordinal));
        assert_eq!(cursor.last_seen_id.as_deref(), Some("100"));
        assert_eq!(cursor.last_seen_url.as_deref(), Some("https://a.kr/100"));
    }

    #[test]
    fn test_unparseable_ordinal_goes_to_membership_set() {
        let mut cursor = cursor_at("100");
        assert!(cursor.record("draft-7", "https://a.kr/d7", IdentityMode::Ordinal));
        assert_eq!(cursor.last_seen_id.as_deref(), Some("100"));
        assert!(!cursor.is_new("draft-7", IdentityMode::Ordinal));
        assert!(cursor.is_new("101", IdentityMode::Ordinal));
    }

    #[test]
    fn test_membership_record_and_check() {
        let mut cursor = Cursor::default();
        assert!(cursor.record("a1f0", "https://a.kr/p", IdentityMode::Membership));
        assert!(!cursor.is_new("a1f0", IdentityMode::Membership));
        assert!(cursor.is_new("b2e1", IdentityMode::Membership));
        assert_eq!(cursor.seen_count(), 1);
    }

    #[test]
    fn test_membership_rerecord_leaves_cursor_alone() {
        let mut cursor = Cursor::default();
        assert!(cursor.record("a1f0", "https://a.kr/p1", IdentityMode::Membership));
        assert!(!cursor.record("a1f0", "https://a.kr/p2", IdentityMode::Membership));
        assert_eq!(cursor.last_seen_url.as_deref(), Some("https://a.kr/p1"));
        assert_eq!(cursor.seen_count(), 1);
    }

    #[test]
    fn test_chain_position() {
        let mut cursor = Cursor::default();
        assert!(cursor.mark_chain_position("https://a.kr/view?no=8"));
        assert!(cursor.is_last_seen_url("https://a.kr/view?no=8"));
        assert!(!cursor.mark_chain_position("https://a.kr/view?no=8"));
        assert!(!cursor.mark_chain_position(""));
    }

    #[test]
    fn test_serialized_layout() {
        let mut cursor = cursor_at("7");
        cursor.seen_identity_set.insert("x".to_string());
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(json["last_seen_id"], "7");
        assert_eq!(json["last_seen_url"], serde_json::Value::Null);
        assert_eq!(json["first_run_complete"], true);
        assert_eq!(json["seen_identity_set"][0], "x");
    }
}
