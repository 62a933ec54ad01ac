use serde::{Deserialize, Serialize};

use crate::request::{KeyScheme, RequestError};

// ── Unit ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Loading,
    Ready,
    Failed,
}

/// One discrete piece of the generated result (a day, a recipe, a
/// category). Created as a placeholder at session start; only `status`
/// and `payload` mutate afterwards. Never reordered, never removed
/// mid-stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    /// Stable identity used for reconciliation (a date string or an
    /// ordinal like `recipe-3`).
    pub key: String,
    pub status: UnitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Render order, fixed at skeleton creation.
    pub position: usize,
}

impl Unit {
    /// A loading placeholder with no payload.
    pub fn placeholder(key: String, position: usize) -> Self {
        Unit {
            key,
            status: UnitStatus::Loading,
            payload: None,
            position,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == UnitStatus::Ready
    }

    /// Attach a payload and mark the unit ready. Overwrites any earlier
    /// payload; repeat calls for the same unit are harmless.
    pub fn mark_ready(&mut self, payload: serde_json::Value) {
        self.payload = Some(payload);
        self.status = UnitStatus::Ready;
    }
}

// ── Skeletons ──

/// Build the placeholder collection for a new session: `count` loading
/// units with scheme-derived keys at positions `0..count`. Called once
/// per session, before the remote request is issued, so the first
/// rendered frame already shows final cardinality.
pub fn skeletons(count: usize, scheme: &KeyScheme) -> Result<Vec<Unit>, RequestError> {
    if count == 0 {
        return Err(RequestError::ZeroUnitCount);
    }
    (0..count)
        .map(|i| Ok(Unit::placeholder(scheme.key(i)?, i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn skeletons_match_requested_count() {
        let scheme = KeyScheme::Ordinal {
            prefix: "recipe".into(),
        };
        let units = skeletons(5, &scheme).unwrap();
        assert_eq!(units.len(), 5);
        assert!(units.iter().all(|u| u.status == UnitStatus::Loading));
        assert!(units.iter().all(|u| u.payload.is_none()));
    }

    #[test]
    fn skeleton_keys_are_unique_and_ordered() {
        let scheme = KeyScheme::DateFrom {
            start: date!(2026 - 08 - 17),
        };
        let units = skeletons(7, &scheme).unwrap();
        let mut keys: Vec<&str> = units.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys[0], "2026-08-17");
        assert_eq!(keys[6], "2026-08-23");
        keys.dedup();
        assert_eq!(keys.len(), 7);
        for (i, u) in units.iter().enumerate() {
            assert_eq!(u.position, i);
        }
    }

    #[test]
    fn zero_count_rejected() {
        let scheme = KeyScheme::Ordinal { prefix: "x".into() };
        assert_eq!(skeletons(0, &scheme), Err(RequestError::ZeroUnitCount));
    }

    #[test]
    fn skeletons_stop_at_the_calendar_end() {
        let scheme = KeyScheme::DateFrom {
            start: time::Date::MAX,
        };
        assert!(skeletons(1, &scheme).is_ok());
        assert_eq!(skeletons(2, &scheme), Err(RequestError::DateOutOfRange(1)));
    }

    #[test]
    fn mark_ready_sets_payload_and_status() {
        let mut unit = Unit::placeholder("2026-08-17".into(), 0);
        assert!(!unit.is_ready());
        unit.mark_ready(serde_json::json!({"meals": []}));
        assert!(unit.is_ready());
        assert!(unit.payload.is_some());
    }

    #[test]
    fn mark_ready_overwrites_payload() {
        let mut unit = Unit::placeholder("recipe-1".into(), 0);
        unit.mark_ready(serde_json::json!({"v": 1}));
        unit.mark_ready(serde_json::json!({"v": 2}));
        assert_eq!(unit.payload.unwrap()["v"], 2);
        assert_eq!(unit.status, UnitStatus::Ready);
    }
}
