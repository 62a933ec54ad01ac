//! Folds stream events into a session's unit grid: key-addressed
//! merging, skeleton resizing, and terminal latching.

use galley_core::{anchored_percentage, ProgressState, Unit};

use crate::config::PipelineConfig;
use crate::session::GenerationSession;
use crate::wire::StreamEvent;

/// What applying one event did to the session. The controller drives
/// step transitions and side effects from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Skeleton grew or shrank to match a revised declared total.
    Resized { total: usize },
    /// A placeholder became ready.
    UnitReady { key: String },
    /// A unit arrived for a key outside the declared set.
    Appended { key: String },
    /// Terminal success with every unit delivered.
    Completed,
    /// The stream cannot produce a usable result on its own. Recovery
    /// decides what the user ultimately sees.
    Faulted { message: String },
    /// Duplicate, unknown, or post-terminal event. No state change
    /// observers would care about.
    Ignored,
}

impl GenerationSession {
    /// Fold one stream event into the session. The first terminal
    /// event latches; anything after it is ignored.
    pub fn apply(&mut self, event: StreamEvent, config: &PipelineConfig) -> Applied {
        if self.terminal {
            return Applied::Ignored;
        }
        match event {
            StreamEvent::SkeletonCount { total } => self.resize(total, config),
            StreamEvent::Unit { key, payload } => self.merge_unit(key, payload, config),
            StreamEvent::Complete {
                artifact_id,
                summary,
            } => {
                self.terminal = true;
                self.artifact_id = artifact_id;
                self.summary = summary;
                if self.units.iter().all(|u| u.is_ready()) {
                    self.progress =
                        ProgressState::complete(self.request.kind, self.units.len());
                    Applied::Completed
                } else {
                    // The backend persisted a full artifact it never
                    // finished streaming to us; recovery fetches it.
                    let message = format!(
                        "stream reported completion with {} of {} units delivered",
                        self.ready_count(),
                        self.units.len()
                    );
                    self.fail_loading_units();
                    Applied::Faulted { message }
                }
            }
            StreamEvent::Error { message } => {
                self.terminal = true;
                self.fail_loading_units();
                Applied::Faulted { message }
            }
            StreamEvent::Unknown => Applied::Ignored,
        }
    }

    /// Grow or shrink the grid to a revised declared total. Growth
    /// appends placeholders keyed by the request's scheme; shrinking
    /// never discards a unit that is already ready.
    fn resize(&mut self, total: usize, config: &PipelineConfig) -> Applied {
        if total == self.declared_total && total == self.units.len() {
            return Applied::Ignored;
        }
        if total > config.max_units {
            self.terminal = true;
            self.fail_loading_units();
            return Applied::Faulted {
                message: format!(
                    "declared unit count {total} exceeds the limit of {}",
                    config.max_units
                ),
            };
        }
        if total > self.declared_total {
            for i in self.declared_total..total {
                let key = match self.request.key_scheme.key(i) {
                    Ok(key) => key,
                    Err(e) => {
                        self.terminal = true;
                        self.fail_loading_units();
                        return Applied::Faulted {
                            message: e.to_string(),
                        };
                    }
                };
                // A unit event may have landed this key early.
                if self.index.contains_key(&key) {
                    continue;
                }
                let position = self.units.len();
                self.index.insert(key.clone(), position);
                self.units.push(Unit::placeholder(key, position));
            }
        } else {
            let keep = self
                .units
                .iter()
                .rposition(|u| u.is_ready())
                .map_or(total, |last_ready| total.max(last_ready + 1));
            for dropped in self.units.drain(keep..) {
                self.index.remove(&dropped.key);
            }
        }
        self.declared_total = total;
        self.refresh_progress(config);
        Applied::Resized { total }
    }

    /// Merge a delivered unit by key. Known keys flip their
    /// placeholder to ready; unknown keys append, up to a bound.
    fn merge_unit(
        &mut self,
        key: String,
        payload: serde_json::Value,
        config: &PipelineConfig,
    ) -> Applied {
        if let Some(&i) = self.index.get(&key) {
            let already_ready = self.units[i].is_ready();
            self.units[i].mark_ready(payload);
            if already_ready {
                // Duplicate delivery. Latest payload wins, counts once.
                return Applied::Ignored;
            }
            self.refresh_progress(config);
            return Applied::UnitReady { key };
        }
        if self.appended >= config.max_appended {
            self.terminal = true;
            self.fail_loading_units();
            return Applied::Faulted {
                message: format!(
                    "stream sent more than {} units beyond the declared set",
                    config.max_appended
                ),
            };
        }
        self.appended += 1;
        let position = self.units.len();
        let mut unit = Unit::placeholder(key.clone(), position);
        unit.mark_ready(payload);
        self.index.insert(key.clone(), position);
        self.units.push(unit);
        self.refresh_progress(config);
        Applied::Appended { key }
    }

    pub(crate) fn refresh_progress(&mut self, config: &PipelineConfig) {
        let ready = self.ready_count();
        let total = self.units.len();
        let percentage = anchored_percentage(
            ready,
            total,
            config.anchor,
            config.progress_floor,
            config.progress_cap,
        )
        .max(self.percent_floor);
        self.percent_floor = percentage;
        self.progress = ProgressState::streaming(self.request.kind, ready, total, percentage);
    }

    pub(crate) fn fail_loading_units(&mut self) {
        for unit in &mut self.units {
            if !unit.is_ready() {
                unit.status = galley_core::UnitStatus::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::{GenerationKind, GenerationRequest, KeyScheme, UnitStatus};
    use serde_json::json;

    fn session(count: usize) -> GenerationSession {
        GenerationSession::new(GenerationRequest {
            kind: GenerationKind::Recipes,
            subject: "user-1".into(),
            selection: "goal-lean".into(),
            unit_count: count,
            key_scheme: KeyScheme::Ordinal {
                prefix: "recipe".into(),
            },
            params: serde_json::Value::Null,
        })
        .unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn unit_event(key: &str) -> StreamEvent {
        StreamEvent::Unit {
            key: key.into(),
            payload: json!({"title": key}),
        }
    }

    #[test]
    fn unit_event_marks_placeholder_ready() {
        let mut s = session(3);
        let applied = s.apply(unit_event("recipe-1"), &config());
        assert_eq!(
            applied,
            Applied::UnitReady {
                key: "recipe-1".into()
            }
        );
        assert_eq!(s.ready_count(), 1);
        assert_eq!(s.units[0].status, UnitStatus::Ready);
        assert_eq!(s.progress.percentage, 30);
        assert_eq!(s.progress.subtitle, "1 of 3 recipes ready");
    }

    #[test]
    fn duplicate_unit_counts_once() {
        let mut s = session(3);
        s.apply(unit_event("recipe-1"), &config());
        let applied = s.apply(
            StreamEvent::Unit {
                key: "recipe-1".into(),
                payload: json!({"title": "revised"}),
            },
            &config(),
        );
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(s.ready_count(), 1);
        // Latest payload wins.
        assert_eq!(s.units[0].payload.as_ref().unwrap()["title"], "revised");
    }

    #[test]
    fn unknown_key_appends_ready_unit() {
        let mut s = session(3);
        let applied = s.apply(unit_event("bonus"), &config());
        assert_eq!(
            applied,
            Applied::Appended {
                key: "bonus".into()
            }
        );
        assert_eq!(s.units.len(), 4);
        assert!(s.units[3].is_ready());
        assert_eq!(s.progress.subtitle, "1 of 4 recipes ready");
    }

    #[test]
    fn too_many_appends_fault_the_session() {
        let mut s = session(2);
        let mut cfg = config();
        cfg.max_appended = 2;
        s.apply(unit_event("extra-1"), &cfg);
        s.apply(unit_event("extra-2"), &cfg);
        let applied = s.apply(unit_event("extra-3"), &cfg);
        assert!(matches!(applied, Applied::Faulted { .. }));
        assert!(s.units[0].status == UnitStatus::Failed);
    }

    #[test]
    fn skeleton_growth_appends_scheme_keyed_placeholders() {
        let mut s = session(3);
        let applied = s.apply(StreamEvent::SkeletonCount { total: 5 }, &config());
        assert_eq!(applied, Applied::Resized { total: 5 });
        assert_eq!(s.units.len(), 5);
        assert_eq!(s.units[3].key, "recipe-4");
        assert_eq!(s.units[4].key, "recipe-5");
        assert_eq!(s.units[4].status, UnitStatus::Loading);
        assert_eq!(s.index["recipe-5"], 4);
    }

    #[test]
    fn skeleton_growth_uses_date_keys_for_date_schemes() {
        let mut s = GenerationSession::new(GenerationRequest {
            kind: GenerationKind::MealPlan,
            subject: "user-1".into(),
            selection: "goal-lean".into(),
            unit_count: 2,
            key_scheme: KeyScheme::DateFrom {
                start: time::macros::date!(2026 - 08 - 17),
            },
            params: serde_json::Value::Null,
        })
        .unwrap();
        s.apply(StreamEvent::SkeletonCount { total: 3 }, &config());
        assert_eq!(s.units[2].key, "2026-08-19");
    }

    #[test]
    fn skeleton_growth_past_calendar_end_faults() {
        let mut s = GenerationSession::new(GenerationRequest {
            kind: GenerationKind::MealPlan,
            subject: "user-1".into(),
            selection: "goal-lean".into(),
            unit_count: 1,
            key_scheme: KeyScheme::DateFrom {
                start: time::Date::MAX,
            },
            params: serde_json::Value::Null,
        })
        .unwrap();
        let applied = s.apply(StreamEvent::SkeletonCount { total: 3 }, &config());
        assert!(matches!(applied, Applied::Faulted { .. }));
        assert!(s.units.iter().all(|u| u.status == UnitStatus::Failed));
    }

    #[test]
    fn skeleton_shrink_truncates_loading_placeholders() {
        let mut s = session(5);
        let applied = s.apply(StreamEvent::SkeletonCount { total: 2 }, &config());
        assert_eq!(applied, Applied::Resized { total: 2 });
        assert_eq!(s.units.len(), 2);
        assert!(!s.index.contains_key("recipe-3"));
    }

    #[test]
    fn skeleton_shrink_never_drops_ready_units() {
        let mut s = session(5);
        s.apply(unit_event("recipe-4"), &config());
        s.apply(StreamEvent::SkeletonCount { total: 2 }, &config());
        // recipe-4 (index 3) is ready, so everything up to it stays.
        assert_eq!(s.units.len(), 4);
        assert!(s.units[3].is_ready());
        assert!(!s.index.contains_key("recipe-5"));
    }

    #[test]
    fn resize_to_current_total_is_ignored() {
        let mut s = session(3);
        assert_eq!(
            s.apply(StreamEvent::SkeletonCount { total: 3 }, &config()),
            Applied::Ignored
        );
    }

    #[test]
    fn oversized_skeleton_count_faults() {
        let mut s = session(3);
        let mut cfg = config();
        cfg.max_units = 10;
        let applied = s.apply(StreamEvent::SkeletonCount { total: 5000 }, &cfg);
        assert!(matches!(applied, Applied::Faulted { .. }));
        assert!(s.units.iter().all(|u| u.status == UnitStatus::Failed));
    }

    #[test]
    fn progress_never_moves_backwards_across_resize() {
        let mut s = session(3);
        s.apply(unit_event("recipe-1"), &config());
        s.apply(unit_event("recipe-2"), &config());
        let before = s.progress.percentage;
        assert_eq!(before, 60);

        // Growing the grid halves the ready ratio, but the shown
        // percentage holds.
        s.apply(StreamEvent::SkeletonCount { total: 6 }, &config());
        assert_eq!(s.progress.percentage, before);
        assert_eq!(s.progress.subtitle, "2 of 6 recipes ready");
    }

    #[test]
    fn complete_with_all_units_finishes_at_100() {
        let mut s = session(2);
        s.apply(unit_event("recipe-1"), &config());
        s.apply(unit_event("recipe-2"), &config());
        let applied = s.apply(
            StreamEvent::Complete {
                artifact_id: Some("art_01abc".into()),
                summary: Some("Two quick dinners".into()),
            },
            &config(),
        );
        assert_eq!(applied, Applied::Completed);
        assert_eq!(s.progress.percentage, 100);
        assert_eq!(s.artifact_id.as_deref(), Some("art_01abc"));
        assert_eq!(s.summary.as_deref(), Some("Two quick dinners"));
    }

    #[test]
    fn complete_with_missing_units_faults() {
        let mut s = session(3);
        s.apply(unit_event("recipe-1"), &config());
        let applied = s.apply(
            StreamEvent::Complete {
                artifact_id: None,
                summary: None,
            },
            &config(),
        );
        assert!(matches!(applied, Applied::Faulted { .. }));
        assert_eq!(s.units[1].status, UnitStatus::Failed);
        assert!(s.units[0].is_ready());
    }

    #[test]
    fn error_event_fails_loading_units_only() {
        let mut s = session(3);
        s.apply(unit_event("recipe-1"), &config());
        let applied = s.apply(
            StreamEvent::Error {
                message: "model quota exceeded".into(),
            },
            &config(),
        );
        assert_eq!(
            applied,
            Applied::Faulted {
                message: "model quota exceeded".into()
            }
        );
        assert!(s.units[0].is_ready());
        assert_eq!(s.units[1].status, UnitStatus::Failed);
        assert_eq!(s.units[2].status, UnitStatus::Failed);
    }

    #[test]
    fn events_after_terminal_are_ignored() {
        let mut s = session(1);
        s.apply(unit_event("recipe-1"), &config());
        s.apply(
            StreamEvent::Complete {
                artifact_id: None,
                summary: None,
            },
            &config(),
        );
        assert_eq!(s.apply(unit_event("late"), &config()), Applied::Ignored);
        assert_eq!(
            s.apply(StreamEvent::SkeletonCount { total: 9 }, &config()),
            Applied::Ignored
        );
        assert_eq!(s.units.len(), 1);
    }

    #[test]
    fn unknown_events_are_ignored() {
        let mut s = session(1);
        assert_eq!(s.apply(StreamEvent::Unknown, &config()), Applied::Ignored);
    }
}
