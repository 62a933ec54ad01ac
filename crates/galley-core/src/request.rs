use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use time::Date;

time::serde::format_description!(ymd, Date, "[year]-[month]-[day]");

/// What is being generated. Drives unit naming, progress copy, and the
/// store layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    MealPlan,
    Recipes,
    ShoppingList,
}

impl GenerationKind {
    /// Stable identifier, matches the wire/store spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::MealPlan => "meal_plan",
            GenerationKind::Recipes => "recipes",
            GenerationKind::ShoppingList => "shopping_list",
        }
    }

    /// Human-readable name for progress copy and CLI output.
    pub fn display_name(&self) -> &'static str {
        match self {
            GenerationKind::MealPlan => "meal plan",
            GenerationKind::Recipes => "recipes",
            GenerationKind::ShoppingList => "shopping list",
        }
    }

    /// Noun for one generated unit, pluralized by count.
    pub fn unit_noun(&self, count: usize) -> &'static str {
        match (self, count) {
            (GenerationKind::MealPlan, 1) => "day",
            (GenerationKind::MealPlan, _) => "days",
            (GenerationKind::Recipes, 1) => "recipe",
            (GenerationKind::Recipes, _) => "recipes",
            (GenerationKind::ShoppingList, 1) => "category",
            (GenerationKind::ShoppingList, _) => "categories",
        }
    }
}

impl FromStr for GenerationKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meal_plan" | "meal-plan" => Ok(GenerationKind::MealPlan),
            "recipes" => Ok(GenerationKind::Recipes),
            "shopping_list" | "shopping-list" => Ok(GenerationKind::ShoppingList),
            other => Err(RequestError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How unit keys are derived from positions. Serialized so a resize
/// mid-stream can extend the sequence with the same rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyScheme {
    /// Calendar-date keys, one day per unit, starting at `start`.
    DateFrom {
        #[serde(with = "ymd")]
        start: Date,
    },
    /// Ordinal keys: `prefix-1`, `prefix-2`, ...
    Ordinal { prefix: String },
}

impl KeyScheme {
    /// Stable key for the unit at `index`. Date schemes refuse indexes
    /// past the supported calendar instead of repeating a key.
    pub fn key(&self, index: usize) -> Result<String, RequestError> {
        match self {
            KeyScheme::DateFrom { start } => {
                let days =
                    i64::try_from(index).map_err(|_| RequestError::DateOutOfRange(index))?;
                let date = start
                    .checked_add(time::Duration::days(days))
                    .ok_or(RequestError::DateOutOfRange(index))?;
                Ok(format!(
                    "{:04}-{:02}-{:02}",
                    date.year(),
                    u8::from(date.month()),
                    date.day()
                ))
            }
            KeyScheme::Ordinal { prefix } => Ok(format!("{prefix}-{}", index + 1)),
        }
    }
}

/// Parameters for one generation run. Immutable once generation starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    /// Opaque user/profile identifier the result belongs to.
    pub subject: String,
    /// The upstream choice the backend requires (goal or profile id).
    pub selection: String,
    /// Expected unit count; the skeleton is built from this before any
    /// network activity. A `skeleton_count` stream event may revise it.
    pub unit_count: usize,
    pub key_scheme: KeyScheme,
    /// Free-form generation parameters passed through to the backend.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl GenerationRequest {
    /// Check preconditions before any network call is made.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.subject.trim().is_empty() {
            return Err(RequestError::MissingSubject);
        }
        if self.selection.trim().is_empty() {
            return Err(RequestError::MissingSelection);
        }
        if self.unit_count == 0 {
            return Err(RequestError::ZeroUnitCount);
        }
        Ok(())
    }
}

/// Why a generation request cannot start.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("a subject id is required")]
    MissingSubject,
    #[error("a selection must be made before generating")]
    MissingSelection,
    #[error("unit count must be at least 1")]
    ZeroUnitCount,
    #[error("no calendar date available for unit {0}")]
    DateOutOfRange(usize),
    #[error("unknown generation kind: \"{0}\"")]
    UnknownKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn request() -> GenerationRequest {
        GenerationRequest {
            kind: GenerationKind::MealPlan,
            subject: "user-1".into(),
            selection: "goal-lean".into(),
            unit_count: 7,
            key_scheme: KeyScheme::DateFrom {
                start: date!(2026 - 08 - 17),
            },
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn validate_accepts_complete_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_subject() {
        let mut r = request();
        r.subject = "  ".into();
        assert_eq!(r.validate(), Err(RequestError::MissingSubject));
    }

    #[test]
    fn validate_rejects_missing_selection() {
        let mut r = request();
        r.selection = String::new();
        assert_eq!(r.validate(), Err(RequestError::MissingSelection));
    }

    #[test]
    fn validate_rejects_zero_units() {
        let mut r = request();
        r.unit_count = 0;
        assert_eq!(r.validate(), Err(RequestError::ZeroUnitCount));
    }

    #[test]
    fn date_scheme_keys_advance_by_day() {
        let scheme = KeyScheme::DateFrom {
            start: date!(2026 - 08 - 17),
        };
        assert_eq!(scheme.key(0).unwrap(), "2026-08-17");
        assert_eq!(scheme.key(1).unwrap(), "2026-08-18");
        assert_eq!(scheme.key(6).unwrap(), "2026-08-23");
    }

    #[test]
    fn date_scheme_crosses_month_boundary() {
        let scheme = KeyScheme::DateFrom {
            start: date!(2026 - 08 - 30),
        };
        assert_eq!(scheme.key(2).unwrap(), "2026-09-01");
    }

    #[test]
    fn date_scheme_refuses_dates_past_the_calendar() {
        let scheme = KeyScheme::DateFrom {
            start: time::Date::MAX,
        };
        assert!(scheme.key(0).is_ok());
        assert_eq!(scheme.key(1), Err(RequestError::DateOutOfRange(1)));
    }

    #[test]
    fn ordinal_scheme_keys_are_one_based() {
        let scheme = KeyScheme::Ordinal {
            prefix: "recipe".into(),
        };
        assert_eq!(scheme.key(0).unwrap(), "recipe-1");
        assert_eq!(scheme.key(4).unwrap(), "recipe-5");
    }

    #[test]
    fn kind_parses_both_spellings() {
        assert_eq!(
            "meal-plan".parse::<GenerationKind>().unwrap(),
            GenerationKind::MealPlan
        );
        assert_eq!(
            "shopping_list".parse::<GenerationKind>().unwrap(),
            GenerationKind::ShoppingList
        );
        assert!("smoothies".parse::<GenerationKind>().is_err());
    }

    #[test]
    fn unit_noun_pluralizes() {
        assert_eq!(GenerationKind::MealPlan.unit_noun(1), "day");
        assert_eq!(GenerationKind::MealPlan.unit_noun(7), "days");
        assert_eq!(GenerationKind::ShoppingList.unit_noun(3), "categories");
    }

    #[test]
    fn request_roundtrip_json() {
        let r = request();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"meal_plan\""));
        assert!(json.contains("\"2026-08-17\""));
        let restored: GenerationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, r);
    }

    #[test]
    fn scheme_deserializes_from_tagged_json() {
        let json = r#"{"type":"ordinal","prefix":"recipe"}"#;
        let scheme: KeyScheme = serde_json::from_str(json).unwrap();
        assert_eq!(scheme.key(0).unwrap(), "recipe-1");
    }
}
