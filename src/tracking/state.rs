//! Tracking state reported by the engine after every frame.

use std::fmt;

/// State of the tracking thread, as reported after the last submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// Engine is still loading (vocabulary, threads).
    SystemNotReady,
    /// Engine is ready but no frame has been submitted yet.
    NoImagesYet,
    /// System not yet initialized (waiting for initial pose).
    #[default]
    NotInitialized,
    /// Tracking successfully.
    Ok,
    /// Lost tracking recently, attempting recovery.
    RecentlyLost,
    /// Completely lost, need relocalization.
    Lost,
}

impl TrackingState {
    /// Frames counted as "no init" in the session performance log.
    pub fn is_not_initialized(self) -> bool {
        matches!(self, Self::NotInitialized)
    }

    /// Frames counted as "lost" in the session performance log.
    ///
    /// `RecentlyLost` is still attempting recovery and is not counted.
    pub fn is_lost(self) -> bool {
        matches!(self, Self::Lost)
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SystemNotReady => "SYSTEM_NOT_READY",
            Self::NoImagesYet => "NO_IMAGES_YET",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Ok => "OK",
            Self::RecentlyLost => "RECENTLY_LOST",
            Self::Lost => "LOST",
        };
        f.write_str(name)
    }
}
