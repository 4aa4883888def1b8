use serde::{Deserialize, Serialize};

/// Upper bound applied to volume when computing gain.
pub const MAX_VOLUME: f64 = 4.0;

/// Live mix settings for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixState {
    pub selected: bool,
    pub muted: bool,
    pub solo: bool,
    /// Stored as received; clamped to `[0, MAX_VOLUME]` when read.
    pub volume: f64,
}

impl MixState {
    pub fn clamped_volume(&self) -> f32 {
        if self.volume.is_nan() {
            return 0.0;
        }
        self.volume.clamp(0.0, MAX_VOLUME) as f32
    }
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            selected: false,
            muted: false,
            solo: false,
            volume: 1.0,
        }
    }
}

/// Mix update for one endpoint as produced by the UI or settings layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMixConfiguration {
    pub endpoint_id: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl DeviceMixConfiguration {
    /// A selected, unmuted, non-solo endpoint at unity volume.
    pub fn selected(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            selected: true,
            muted: false,
            solo: false,
            volume: 1.0,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_solo(mut self, solo: bool) -> Self {
        self.solo = solo;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn mix_state(&self) -> MixState {
        MixState {
            selected: self.selected,
            muted: self.muted,
            solo: self.solo,
            volume: self.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_volume_is_unity() {
        assert_eq!(MixState::default().volume, 1.0);

        let cfg: DeviceMixConfiguration = serde_json::from_str(r#"{"endpoint_id":"mic"}"#).unwrap();
        assert_eq!(cfg.volume, 1.0);
        assert!(!cfg.selected);
    }

    #[test]
    fn volume_clamped_on_read() {
        let loud = MixState { volume: 9.5, ..Default::default() };
        assert_eq!(loud.clamped_volume(), 4.0);

        let negative = MixState { volume: -1.0, ..Default::default() };
        assert_eq!(negative.clamped_volume(), 0.0);

        let nan = MixState { volume: f64::NAN, ..Default::default() };
        assert_eq!(nan.clamped_volume(), 0.0);
    }
}
