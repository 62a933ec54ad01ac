use serde::{Deserialize, Serialize};

use crate::request::GenerationKind;

/// The [start, end] percentage window a pipeline step may report
/// progress within. A standalone generation uses the full bar; a
/// generation embedded in a larger flow gets a sub-range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnchorRange {
    pub start: u8,
    pub end: u8,
}

impl Default for AnchorRange {
    fn default() -> Self {
        AnchorRange { start: 0, end: 100 }
    }
}

/// Map ready units against the total into an overall percentage inside
/// the anchor window. `floor` guarantees the first ready unit shows
/// visible progress; `cap` keeps the bar from claiming completion
/// before the terminal event. `total == 0` yields `anchor.start`.
/// Pure; monotonically non-decreasing in `ready` for fixed inputs.
pub fn anchored_percentage(
    ready: usize,
    total: usize,
    anchor: AnchorRange,
    floor: u8,
    cap: u8,
) -> u8 {
    if total == 0 {
        return anchor.start;
    }
    let lo = usize::from(anchor.start);
    let hi = usize::from(anchor.end.min(cap)).max(lo);
    if ready == 0 {
        return anchor.start;
    }
    let span = hi - lo;
    let scaled = lo + span * ready.min(total) / total;
    scaled.max(usize::from(floor)).clamp(lo, hi) as u8
}

/// What the progress surface shows. Derived from (ready, total, step,
/// kind); never stored independently of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    pub percentage: u8,
    pub title: String,
    pub subtitle: String,
    pub message: String,
}

impl ProgressState {
    /// Before any session exists.
    pub fn idle() -> Self {
        ProgressState {
            percentage: 0,
            title: "Ready to generate".into(),
            subtitle: String::new(),
            message: String::new(),
        }
    }

    /// Mid-stream copy while units arrive.
    pub fn streaming(kind: GenerationKind, ready: usize, total: usize, percentage: u8) -> Self {
        ProgressState {
            percentage,
            title: streaming_title(kind).into(),
            subtitle: format!("{ready} of {total} {} ready", kind.unit_noun(total)),
            message: streaming_message(kind).into(),
        }
    }

    /// After a stream fault, while the store is being checked for a
    /// server-side result.
    pub fn recovering(kind: GenerationKind, percentage: u8) -> Self {
        ProgressState {
            percentage,
            title: streaming_title(kind).into(),
            subtitle: "Finishing up".into(),
            message: "Checking for your completed results".into(),
        }
    }

    /// Terminal success; the bar may claim 100% now.
    pub fn complete(kind: GenerationKind, total: usize) -> Self {
        let title = match kind {
            GenerationKind::MealPlan => "Your meal plan is ready",
            GenerationKind::Recipes => "Your recipes are ready",
            GenerationKind::ShoppingList => "Your shopping list is ready",
        };
        ProgressState {
            percentage: 100,
            title: title.into(),
            subtitle: format!("All {total} {} generated", kind.unit_noun(total)),
            message: "Review the result and save it".into(),
        }
    }

    /// Terminal failure; keeps the last reached percentage rather than
    /// snapping to 0 or 100.
    pub fn failed(kind: GenerationKind, percentage: u8) -> Self {
        ProgressState {
            percentage,
            title: "Generation didn't finish".into(),
            subtitle: format!("Your {} couldn't be completed", kind.display_name()),
            message: String::new(),
        }
    }
}

fn streaming_title(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::MealPlan => "Generating your meal plan",
        GenerationKind::Recipes => "Generating your recipes",
        GenerationKind::ShoppingList => "Building your shopping list",
    }
}

fn streaming_message(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::MealPlan => "Planning balanced meals for your week",
        GenerationKind::Recipes => "Matching recipes to your preferences",
        GenerationKind::ShoppingList => "Sorting ingredients into categories",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: AnchorRange = AnchorRange { start: 0, end: 100 };

    #[test]
    fn zero_total_yields_anchor_start() {
        assert_eq!(anchored_percentage(0, 0, FULL, 10, 90), 0);
        let sub = AnchorRange { start: 30, end: 90 };
        assert_eq!(anchored_percentage(3, 0, sub, 10, 90), 30);
    }

    #[test]
    fn zero_ready_stays_at_anchor_start() {
        assert_eq!(anchored_percentage(0, 7, FULL, 10, 90), 0);
    }

    #[test]
    fn first_unit_reaches_the_floor() {
        // 1 of 30 scales to 3%; the floor lifts it to visible progress.
        assert_eq!(anchored_percentage(1, 30, FULL, 10, 90), 10);
    }

    #[test]
    fn all_ready_stops_at_the_cap() {
        assert_eq!(anchored_percentage(7, 7, FULL, 10, 90), 90);
    }

    #[test]
    fn never_exceeds_cap_before_all_ready() {
        for ready in 0..7 {
            assert!(anchored_percentage(ready, 7, FULL, 10, 90) < 90);
        }
    }

    #[test]
    fn monotonic_in_ready() {
        let mut last = 0;
        for ready in 0..=12 {
            let pct = anchored_percentage(ready, 12, FULL, 10, 90);
            assert!(pct >= last, "{pct} < {last} at ready={ready}");
            last = pct;
        }
    }

    #[test]
    fn respects_sub_anchor_window() {
        let sub = AnchorRange { start: 30, end: 60 };
        let first = anchored_percentage(1, 7, sub, 10, 90);
        let last = anchored_percentage(7, 7, sub, 10, 90);
        assert!(first >= 30);
        assert_eq!(last, 60);
    }

    #[test]
    fn floor_never_escapes_the_window() {
        let narrow = AnchorRange { start: 0, end: 5 };
        assert_eq!(anchored_percentage(1, 2, narrow, 10, 90), 5);
    }

    #[test]
    fn streaming_copy_counts_units() {
        let p = ProgressState::streaming(GenerationKind::MealPlan, 3, 7, 43);
        assert_eq!(p.percentage, 43);
        assert_eq!(p.subtitle, "3 of 7 days ready");
        assert!(p.title.contains("meal plan"));
    }

    #[test]
    fn complete_copy_claims_full_bar() {
        let p = ProgressState::complete(GenerationKind::Recipes, 5);
        assert_eq!(p.percentage, 100);
        assert_eq!(p.subtitle, "All 5 recipes generated");
    }

    #[test]
    fn failed_copy_keeps_last_percentage() {
        let p = ProgressState::failed(GenerationKind::ShoppingList, 57);
        assert_eq!(p.percentage, 57);
        assert!(p.subtitle.contains("shopping list"));
    }
}
