//! Card deck - the set of vote values a room permits
//!
//! The default deck is the usual estimation sequence plus an "unknown"
//! card for participants who cannot estimate the topic.

use serde::{Deserialize, Serialize};

/// A single card value. Serializes as a bare JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteValue {
    Number(u32),
    Label(String),
}

impl VoteValue {
    /// The "cannot estimate" card
    pub fn unknown() -> Self {
        VoteValue::Label("unknown".to_string())
    }
}

impl std::fmt::Display for VoteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteValue::Number(n) => write!(f, "{}", n),
            VoteValue::Label(s) => write!(f, "{}", s),
        }
    }
}

/// The set of vote values a round accepts
#[derive(Debug, Clone)]
pub struct Deck {
    values: Vec<VoteValue>,
}

impl Deck {
    pub fn new(values: Vec<VoteValue>) -> Self {
        Self { values }
    }

    /// Standard deck: 0,1,2,3,5,8,13,21,34,55,89 plus "unknown"
    pub fn fibonacci() -> Self {
        let mut values: Vec<VoteValue> = [0u32, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89]
            .iter()
            .map(|n| VoteValue::Number(*n))
            .collect();
        values.push(VoteValue::unknown());
        Self { values }
    }

    pub fn contains(&self, value: &VoteValue) -> bool {
        self.values.contains(value)
    }

    pub fn values(&self) -> &[VoteValue] {
        &self.values
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::fibonacci()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deck_membership() {
        let deck = Deck::default();
        assert!(deck.contains(&VoteValue::Number(8)));
        assert!(deck.contains(&VoteValue::Number(0)));
        assert!(deck.contains(&VoteValue::unknown()));
        assert!(!deck.contains(&VoteValue::Number(4)));
        assert!(!deck.contains(&VoteValue::Number(999)));
        assert!(!deck.contains(&VoteValue::Label("maybe".into())));
    }

    #[test]
    fn test_value_serialization() {
        let n = serde_json::to_string(&VoteValue::Number(13)).unwrap();
        assert_eq!(n, "13");

        let u = serde_json::to_string(&VoteValue::unknown()).unwrap();
        assert_eq!(u, "\"unknown\"");

        let decoded: VoteValue = serde_json::from_str("21").unwrap();
        assert_eq!(decoded, VoteValue::Number(21));

        let decoded: VoteValue = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(decoded, VoteValue::unknown());
    }
}
