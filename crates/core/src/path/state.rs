//! Path state bits and the composite state derived from them.

use serde::Serialize;

/// The four independent path state bits.
///
/// A set bit means the named condition holds; a clear bit means its opposite
/// (clear `ACTIVE` is passive, clear `NON_CONGESTED` is congested, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PathFlags(u8);

impl PathFlags {
    pub const TRIAL: Self = Self(1);
    pub const NON_LOSSY: Self = Self(2);
    pub const NON_CONGESTED: Self = Self(4);
    pub const ACTIVE: Self = Self(8);

    /// Active, non-congested, non-lossy and not in trial.
    pub const DEFAULT: Self = Self(Self::ACTIVE.0 | Self::NON_CONGESTED.0 | Self::NON_LOSSY.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0f)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub(crate) fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl Default for PathFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Composite path state, ordered by priority (highest first).
///
/// `TRIAL` is orthogonal and does not participate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    /// `ACTIVE` bit clear.
    Passive,
    /// `NON_CONGESTED` bit clear.
    Congested,
    /// `NON_LOSSY` bit clear.
    Lossy,
    NonCongested,
}

impl PathState {
    pub fn from_flags(flags: PathFlags) -> Self {
        if !flags.contains(PathFlags::ACTIVE) {
            PathState::Passive
        } else if !flags.contains(PathFlags::NON_CONGESTED) {
            PathState::Congested
        } else if !flags.contains(PathFlags::NON_LOSSY) {
            PathState::Lossy
        } else {
            PathState::NonCongested
        }
    }
}

impl std::fmt::Display for PathState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PathState::Passive => "passive",
            PathState::Congested => "congested",
            PathState::Lossy => "lossy",
            PathState::NonCongested => "non-congested",
        };
        f.write_str(name)
    }
}

/// Nanosecond timestamps of the last transition into each state.
///
/// Zero means the transition never happened. Consumers use these for
/// hysteresis and backoff decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateTransitions {
    pub active_since: u64,
    pub passive_since: u64,
    pub congested_since: u64,
    pub non_congested_since: u64,
    pub lossy_since: u64,
    pub non_lossy_since: u64,
    pub trial_started: u64,
    pub trial_ended: u64,
}
