use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// Default weight of the synthetic location term
pub const DEFAULT_LOCATION_WEIGHT: i32 = 100;

/// Matching configuration shared by all queries of a document type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Add cheap unranked word terms next to positional operators under AND
    pub split_unpacking_iterators: bool,
    /// Mark positional operators as lazily unpacked (evaluated last)
    pub delay_unpacking_iterators: bool,
    /// Upper bound on dictionary keys a prefix/substring/regexp term may expand to
    pub max_term_expansions: usize,
    /// Weight of the injected location term
    pub location_weight: i32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            split_unpacking_iterators: false,
            delay_unpacking_iterators: false,
            max_term_expansions: 1024,
            location_weight: DEFAULT_LOCATION_WEIGHT,
        }
    }
}

/// Flags steering the unpacking-mode optimizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnpackingFlags {
    pub split: bool,
    pub delay: bool,
}

impl UnpackingFlags {
    pub fn is_noop(&self) -> bool {
        !self.split && !self.delay
    }
}

/// Presets for the unpacking flags
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnpackingProfile {
    Eager,
    Split,
    Delayed,
    SplitDelayed,
}

impl UnpackingProfile {
    pub fn flags(&self) -> UnpackingFlags {
        match self {
            UnpackingProfile::Eager => UnpackingFlags::default(),
            UnpackingProfile::Split => UnpackingFlags {
                split: true,
                delay: false,
            },
            UnpackingProfile::Delayed => UnpackingFlags {
                split: false,
                delay: true,
            },
            UnpackingProfile::SplitDelayed => UnpackingFlags {
                split: true,
                delay: true,
            },
        }
    }

    /// Apply this profile to a MatchingConfig
    pub fn apply_to(&self, config: &mut MatchingConfig) {
        let flags = self.flags();
        config.split_unpacking_iterators = flags.split;
        config.delay_unpacking_iterators = flags.delay;
    }

    /// Parse a profile name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "eager" => Some(UnpackingProfile::Eager),
            "split" => Some(UnpackingProfile::Split),
            "delayed" | "delay" => Some(UnpackingProfile::Delayed),
            "split-delayed" | "split_delayed" => Some(UnpackingProfile::SplitDelayed),
            _ => None,
        }
    }
}

impl MatchingConfig {
    /// Load a configuration from JSON, filling unspecified fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MatchingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_term_expansions == 0 {
            return Err(MatchError::InvalidConfig(
                "max_term_expansions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply an unpacking profile to this configuration
    pub fn with_profile(mut self, profile: UnpackingProfile) -> Self {
        profile.apply_to(&mut self);
        self
    }

    pub fn with_max_term_expansions(mut self, max: usize) -> Self {
        self.max_term_expansions = max;
        self
    }

    pub fn with_location_weight(mut self, weight: i32) -> Self {
        self.location_weight = weight;
        self
    }

    /// Flags handed to the unpacking-mode optimizer
    pub fn unpacking(&self) -> UnpackingFlags {
        UnpackingFlags {
            split: self.split_unpacking_iterators,
            delay: self.delay_unpacking_iterators,
        }
    }
}
