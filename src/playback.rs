//! Playback clock and position monitoring.
//!
//! The scrobbler does not play audio itself. It observes a player through
//! the [`PlaybackClock`] trait, and a [`Monitor`] forwards the position of
//! that clock to the [`Registry`] once per second, so that seeking past
//! the played threshold is noticed.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{track::TrackId, tracker::Registry};

/// Read-only view on the clock of a player.
pub trait PlaybackClock: Send + Sync {
    /// Duration of the current song.
    fn duration(&self) -> Duration;

    /// Position in the current song.
    fn current_position(&self) -> Duration;

    fn is_playing(&self) -> bool;
}

#[derive(Debug)]
struct ClockState {
    /// Position at the moment `resumed_at` was taken, or the position at
    /// which playback was paused.
    position: Duration,
    resumed_at: Option<Instant>,
}

/// Clock of a player that plays nothing, in real time.
///
/// Starts paused at the beginning of the song.
#[derive(Debug)]
pub struct SimulatedClock {
    duration: Duration,
    state: Mutex<ClockState>,
}

impl SimulatedClock {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Mutex::new(ClockState {
                position: Duration::ZERO,
                resumed_at: None,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn position_of(&self, state: &ClockState) -> Duration {
        let elapsed = state
            .resumed_at
            .map_or(Duration::ZERO, |resumed_at| resumed_at.elapsed());
        (state.position + elapsed).min(self.duration)
    }

    pub fn resume(&self) {
        let mut state = self.state();
        if state.resumed_at.is_none() {
            state.resumed_at = Some(Instant::now());
        }
    }

    pub fn pause(&self) {
        let mut state = self.state();
        state.position = self.position_of(&state);
        state.resumed_at = None;
    }

    /// Jumps to `position`, keeping the playing state.
    pub fn seek(&self, position: Duration) {
        let mut state = self.state();
        state.position = position.min(self.duration);
        if state.resumed_at.is_some() {
            state.resumed_at = Some(Instant::now());
        }
    }
}

impl PlaybackClock for SimulatedClock {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn current_position(&self) -> Duration {
        self.position_of(&self.state())
    }

    fn is_playing(&self) -> bool {
        let state = self.state();
        state.resumed_at.is_some() && self.position_of(&state) < self.duration
    }
}

/// Background task forwarding clock positions to a registry.
#[derive(Debug)]
pub struct Monitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Monitor {
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Starts polling `clock` on behalf of the tracker of `track_id`.
    ///
    /// Polls until stopped, or until the clock has reached the end of the
    /// song and stopped playing.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn spawn(registry: Arc<Registry>, track_id: TrackId, clock: Arc<dyn PlaybackClock>) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run(registry, track_id, clock, cancel.clone()));
        Self { cancel, handle }
    }

    async fn run(
        registry: Arc<Registry>,
        track_id: TrackId,
        clock: Arc<dyn PlaybackClock>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(Self::POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let duration = clock.duration();
            let position = clock.current_position();
            if clock.is_playing() {
                registry.update_playback_position(track_id, position, duration);
            } else if position >= duration {
                debug!("playback of {track_id} ended");
                break;
            }
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits until the monitor has stopped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("position monitor failed: {e}");
        }
    }
}
