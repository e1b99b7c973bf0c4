//! # Commit Batching
//!
//! Decides when the upstream session is told to process the audio appended
//! so far. Committing after every 20ms frame would waste round trips, so
//! frames are counted and a commit is signalled once per `threshold` frames.
//!
//! ## Observed Profiles:
//! - **20 frames** ≈ 400ms of telephony audio
//! - **25 frames** ≈ 500ms of telephony audio
//!
//! The threshold is fixed for the lifetime of a pair. Audio content is never
//! inspected; only frame counts matter.

/// Frame counter owned by a single session pair.
#[derive(Debug, Clone)]
pub struct CommitBatcher {
    threshold: u32,
    frames_since_commit: u32,
}

impl CommitBatcher {
    /// Create a batcher with an empty counter.
    ///
    /// A threshold of 0 is treated as 1 (commit after every frame).
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            frames_since_commit: 0,
        }
    }

    /// Count one forwarded frame.
    ///
    /// ## Returns:
    /// - **true**: a commit is due; the caller sends it and then calls
    ///   [`CommitBatcher::committed`]
    /// - **false**: keep accumulating
    ///
    /// The counter only resets once the commit is confirmed sent, so a
    /// commit that could not be queued is due again on the next frame.
    pub fn record_frame(&mut self) -> bool {
        self.frames_since_commit += 1;
        self.frames_since_commit >= self.threshold
    }

    /// Reset the counter after a commit was queued.
    pub fn committed(&mut self) {
        self.frames_since_commit = 0;
    }

    /// Take the residual frames that were never committed, resetting the counter.
    pub fn take_residual(&mut self) -> u32 {
        std::mem::take(&mut self.frames_since_commit)
    }

    pub fn pending(&self) -> u32 {
        self.frames_since_commit
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
