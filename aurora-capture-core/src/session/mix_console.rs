use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::mix::{DeviceMixConfiguration, MixState};

/// Gain lookup handed to a capture session; returns the endpoint's current gain.
pub type GainQuery = Arc<dyn Fn() -> f32 + Send + Sync + 'static>;

/// Per-endpoint mix state with live gain computation.
///
/// All reads and writes go through a single lock so the solo scan in
/// [`effective_gain`](Self::effective_gain) always sees a consistent table.
/// Capture callbacks read once per buffer; UI updates write at any time.
#[derive(Debug, Default)]
pub struct MixConsole {
    states: Mutex<HashMap<String, MixState>>,
}

impl MixConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the state for `endpoint_id`.
    pub fn update(&self, endpoint_id: &str, state: MixState) {
        let mut states = self.states.lock();
        match states.get_mut(endpoint_id) {
            Some(existing) => *existing = state,
            None => {
                states.insert(endpoint_id.to_string(), state);
            }
        }
    }

    pub fn apply(&self, config: &DeviceMixConfiguration) {
        self.update(&config.endpoint_id, config.mix_state());
    }

    /// Gain to apply to `endpoint_id` right now.
    ///
    /// Zero for unknown, unselected or muted endpoints. While any selected
    /// endpoint is solo, only solo endpoints are audible. Otherwise the volume,
    /// clamped to `[0, 4]`.
    pub fn effective_gain(&self, endpoint_id: &str) -> f32 {
        let states = self.states.lock();
        let Some(state) = states.get(endpoint_id) else {
            return 0.0;
        };

        if !state.selected || state.muted {
            return 0.0;
        }

        let any_solo = states.values().any(|s| s.selected && s.solo);
        if any_solo && !state.solo {
            return 0.0;
        }

        state.clamped_volume()
    }

    /// Drop every entry.
    pub fn reset(&self) {
        self.states.lock().clear();
    }

    pub fn state(&self, endpoint_id: &str) -> Option<MixState> {
        self.states.lock().get(endpoint_id).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, MixState> {
        self.states.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    /// Closure over this console that reads the gain of `endpoint_id`.
    pub fn gain_query(self: &Arc<Self>, endpoint_id: &str) -> GainQuery {
        let console = Arc::clone(self);
        let endpoint_id = endpoint_id.to_string();
        Arc::new(move || console.effective_gain(&endpoint_id))
    }
}
