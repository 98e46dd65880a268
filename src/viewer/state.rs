//! Session state management

use std::sync::Arc;

use crate::catalog::DocumentDescriptor;

use super::request::Generation;
use super::types::TaskState;

/// Selection, scale and generation of a viewer session
#[derive(Clone, Debug)]
pub struct SessionState {
    /// Ordered catalog, as given by the caller
    pub catalog: Vec<Arc<DocumentDescriptor>>,

    /// Selected entry; `None` while the catalog is empty
    pub selected: Option<usize>,

    /// Scale handed to new render tasks
    pub scale: f32,

    /// Generation of the authoritative render request
    pub generation: Generation,

    /// Progress of the task for `generation`, if one was started
    pub active: Option<TaskState>,

    pub disposed: bool,
}

impl SessionState {
    #[must_use]
    pub fn new(scale: f32) -> Self {
        Self {
            catalog: Vec::new(),
            selected: None,
            scale: if scale.is_finite() && scale > 0.0 {
                scale
            } else {
                1.0
            },
            generation: Generation::default(),
            active: None,
            disposed: false,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        if self.disposed {
            return vec![];
        }

        match cmd {
            Command::LoadCatalog(items) => {
                self.catalog = items.into_iter().map(Arc::new).collect();
                self.bump();
                if self.catalog.is_empty() {
                    self.selected = None;
                    self.active = None;
                    vec![Effect::CancelActive, Effect::NotifyCatalogLoaded]
                } else {
                    self.selected = Some(0);
                    self.active = Some(TaskState::Pending);
                    vec![
                        Effect::CancelActive,
                        Effect::NotifyCatalogLoaded,
                        Effect::NotifySelectionChanged(0),
                        Effect::StartRender,
                    ]
                }
            }

            Command::Select(index) => {
                if index >= self.catalog.len() {
                    return vec![];
                }
                // Reselecting the current entry only restarts a render that did not complete
                let retry = matches!(
                    self.active,
                    Some(TaskState::Failed | TaskState::Cancelled)
                );
                if self.selected == Some(index) && !retry {
                    return vec![];
                }
                self.selected = Some(index);
                self.bump();
                self.active = Some(TaskState::Pending);
                vec![
                    Effect::CancelActive,
                    Effect::NotifySelectionChanged(index),
                    Effect::StartRender,
                ]
            }

            Command::SetScale(scale) => {
                if !scale.is_finite() || scale <= 0.0 {
                    return vec![];
                }
                if (self.scale - scale).abs() <= f32::EPSILON {
                    return vec![];
                }
                self.scale = scale;
                self.bump();
                if self.selected.is_some() {
                    self.active = Some(TaskState::Pending);
                    vec![Effect::CancelActive, Effect::StartRender]
                } else {
                    vec![Effect::CancelActive]
                }
            }

            Command::Dispose => {
                self.disposed = true;
                self.bump();
                self.active = match self.active {
                    Some(state) if !state.is_terminal() => Some(TaskState::Cancelled),
                    other => other,
                };
                vec![Effect::CancelActive, Effect::StopWorkers]
            }
        }
    }

    /// Record progress reported for `generation`.
    ///
    /// Returns `false` and changes nothing when the report is stale.
    pub fn record_progress(&mut self, generation: Generation, state: TaskState) -> bool {
        if self.disposed || generation != self.generation {
            return false;
        }
        self.active = Some(state);
        true
    }

    /// Descriptor of the selected entry
    #[must_use]
    pub fn selected_descriptor(&self) -> Option<&Arc<DocumentDescriptor>> {
        self.selected.and_then(|i| self.catalog.get(i))
    }

    /// Whether nothing is left to wait for
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.disposed || self.active.is_none_or(TaskState::is_terminal)
    }

    fn bump(&mut self) {
        self.generation = self.generation.next();
    }
}

/// Commands that modify session state
#[derive(Clone, Debug)]
pub enum Command {
    /// Replace the catalog and select its first entry
    LoadCatalog(Vec<DocumentDescriptor>),
    /// Select a catalog entry
    Select(usize),
    /// Change the render scale
    SetScale(f32),
    /// Tear the session down
    Dispose,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Publish the new generation so older tasks stop at their next checkpoint
    CancelActive,
    /// Tell the sink the catalog was replaced
    NotifyCatalogLoaded,
    /// Tell the sink which entry is selected
    NotifySelectionChanged(usize),
    /// Submit a render of the selected entry at the current scale
    StartRender,
    /// Shut the workers down
    StopWorkers,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<DocumentDescriptor> {
        vec![
            DocumentDescriptor::new("B-101", "doc101"),
            DocumentDescriptor::new("B-102", "doc102"),
        ]
    }

    fn loaded_state() -> SessionState {
        let mut state = SessionState::new(1.0);
        let _ = state.apply(Command::LoadCatalog(catalog()));
        state
    }

    #[test]
    fn load_catalog_selects_first_and_starts_render() {
        let mut state = SessionState::new(1.0);
        let effects = state.apply(Command::LoadCatalog(catalog()));

        assert_eq!(state.selected, Some(0));
        assert_eq!(state.generation, Generation::new(1));
        assert_eq!(
            effects,
            vec![
                Effect::CancelActive,
                Effect::NotifyCatalogLoaded,
                Effect::NotifySelectionChanged(0),
                Effect::StartRender,
            ]
        );
    }

    #[test]
    fn empty_catalog_clears_selection_without_render() {
        let mut state = loaded_state();
        let effects = state.apply(Command::LoadCatalog(vec![]));

        assert_eq!(state.selected, None);
        assert_eq!(state.active, None);
        assert_eq!(state.generation, Generation::new(2));
        assert_eq!(effects, vec![Effect::CancelActive, Effect::NotifyCatalogLoaded]);
        assert!(state.is_settled());
    }

    #[test]
    fn select_out_of_range_is_noop() {
        let mut state = loaded_state();
        let before = state.generation;

        assert!(state.apply(Command::Select(2)).is_empty());
        assert!(state.apply(Command::Select(usize::MAX)).is_empty());
        assert_eq!(state.selected, Some(0));
        assert_eq!(state.generation, before);
    }

    #[test]
    fn select_bumps_generation_and_restarts() {
        let mut state = loaded_state();
        let effects = state.apply(Command::Select(1));

        assert_eq!(state.selected, Some(1));
        assert_eq!(state.generation, Generation::new(2));
        assert_eq!(state.active, Some(TaskState::Pending));
        assert_eq!(
            effects,
            vec![
                Effect::CancelActive,
                Effect::NotifySelectionChanged(1),
                Effect::StartRender,
            ]
        );
    }

    #[test]
    fn reselecting_current_entry_only_retries_failures() {
        let mut state = loaded_state();
        assert!(state.apply(Command::Select(0)).is_empty());

        assert!(state.record_progress(state.generation, TaskState::Failed));
        let effects = state.apply(Command::Select(0));
        assert!(effects.contains(&Effect::StartRender));
        assert_eq!(state.generation, Generation::new(2));
    }

    #[test]
    fn same_scale_is_ignored() {
        let mut state = loaded_state();
        let effects = state.apply(Command::SetScale(1.1));
        assert_eq!(effects, vec![Effect::CancelActive, Effect::StartRender]);

        let generation = state.generation;
        assert!(state.apply(Command::SetScale(1.1)).is_empty());
        assert_eq!(state.generation, generation);
    }

    #[test]
    fn invalid_scale_is_ignored() {
        let mut state = loaded_state();
        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(state.apply(Command::SetScale(scale)).is_empty());
        }
        assert!((state.scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn scale_change_without_catalog_only_stores_scale() {
        let mut state = SessionState::new(1.0);
        let effects = state.apply(Command::SetScale(0.8));
        assert_eq!(effects, vec![Effect::CancelActive]);
        assert!((state.scale - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn stale_progress_is_rejected() {
        let mut state = loaded_state();
        let old = state.generation;
        let _ = state.apply(Command::Select(1));

        assert!(!state.record_progress(old, TaskState::Completed));
        assert_eq!(state.active, Some(TaskState::Pending));
    }

    #[test]
    fn dispose_is_idempotent_and_final() {
        let mut state = loaded_state();
        let effects = state.apply(Command::Dispose);
        assert_eq!(effects, vec![Effect::CancelActive, Effect::StopWorkers]);
        assert_eq!(state.active, Some(TaskState::Cancelled));

        let generation = state.generation;
        assert!(state.apply(Command::Dispose).is_empty());
        assert!(state.apply(Command::Select(1)).is_empty());
        assert!(state.apply(Command::LoadCatalog(catalog())).is_empty());
        assert_eq!(state.generation, generation);
        assert!(state.is_settled());
    }
}
