//! Scrobble tracking of playing songs.
//!
//! The [`Registry`] keeps one tracker per song that is being played. Every
//! tracker runs a background task that waits, reports "now playing",
//! waits some more, and finally reports the song as played:
//!
//! ```text
//! start ──10s──▶ NowPlaying ──(50% of duration − 10s)──▶ Played
//! ```
//!
//! Position updates from the player can report the song as played early,
//! for example after seeking past the halfway point. Either way, "played"
//! is submitted at most once per tracker, whether that succeeds or not.
//!
//! All methods are fire-and-forget: failures are logged, never returned.
//! A submission that is rejected or fails to be delivered is not tried
//! again; transient transport failures are already retried underneath.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{runtime::Handle, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::Config,
    scrobble::{ScrobbleEvent, ScrobbleResult, Submit},
    track::{Song, TrackId},
};

/// Timing parameters of tracking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub min_duration: Duration,
    pub now_playing_delay: Duration,
    pub played_fraction: f64,
}

impl Thresholds {
    /// Position at which a song of `duration` counts as played.
    #[must_use]
    pub fn played_at(&self, duration: Duration) -> Duration {
        duration.mul_f64(self.played_fraction)
    }
}

impl From<&Config> for Thresholds {
    fn from(config: &Config) -> Self {
        let played_fraction = if config.played_threshold.is_finite() {
            config.played_threshold.clamp(0.0, 1.0)
        } else {
            warn!("invalid played threshold {}, using 0.5", config.played_threshold);
            0.5
        };

        Self {
            min_duration: config.min_duration,
            now_playing_delay: config.now_playing_delay,
            played_fraction,
        }
    }
}

/// What has been reported for a tracked song so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrackerStatus {
    pub now_playing_emitted: bool,
    pub played_emitted: bool,
}

/// Tracking state of a single play.
#[derive(Debug)]
struct Tracker {
    song: Song,
    duration: Duration,
    started_at: Instant,

    now_playing_emitted: AtomicBool,
    played_emitted: AtomicBool,

    /// Set by whichever of the scheduled task and an early trigger submits
    /// "played" first. Only set while holding `played_gate`.
    played_attempted: AtomicBool,

    /// Serializes "played" emissions between the scheduled task and early
    /// triggers.
    played_gate: tokio::sync::Mutex<()>,

    /// Set while an early "played" emission has been spawned.
    early_pending: AtomicBool,

    cancel: CancellationToken,
}

impl Tracker {
    fn new(song: Song, duration: Duration, cancel: CancellationToken) -> Self {
        Self {
            song,
            duration,
            started_at: Instant::now(),
            now_playing_emitted: AtomicBool::new(false),
            played_emitted: AtomicBool::new(false),
            played_attempted: AtomicBool::new(false),
            played_gate: tokio::sync::Mutex::new(()),
            early_pending: AtomicBool::new(false),
            cancel,
        }
    }

    fn status(&self) -> TrackerStatus {
        TrackerStatus {
            now_playing_emitted: self.now_playing_emitted.load(Ordering::Acquire),
            played_emitted: self.played_emitted.load(Ordering::Acquire),
        }
    }

    /// Submits `event` unless cancelled first.
    ///
    /// Returns `None` when cancelled, in which case nothing is logged as a
    /// failure.
    async fn submit(&self, submitter: &dyn Submit, event: ScrobbleEvent) -> Option<bool> {
        let kind = event.kind();
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = submitter.scrobble(event) => Some(result),
        };

        match result {
            None => {
                trace!("{kind} for {} cancelled", self.song);
                None
            }
            Some(result @ ScrobbleResult::Success(_)) => {
                info!("{kind} {}: {result}", self.song);
                Some(true)
            }
            Some(ScrobbleResult::NetworkError(e)) if e.is_cancelled() => {
                trace!("{kind} for {} cancelled: {e}", self.song);
                None
            }
            Some(result @ ScrobbleResult::ServerError { .. }) => {
                error!("{kind} {}: {result}", self.song);
                Some(false)
            }
            Some(result @ ScrobbleResult::NetworkError(_)) => {
                warn!("{kind} {}: {result}", self.song);
                Some(false)
            }
        }
    }

    async fn emit_now_playing(&self, submitter: &dyn Submit) {
        if self.cancel.is_cancelled() || self.now_playing_emitted.load(Ordering::Acquire) {
            return;
        }

        let event = ScrobbleEvent::now_playing(self.song.id);
        if self.submit(submitter, event).await == Some(true) {
            self.now_playing_emitted.store(true, Ordering::Release);
        }
    }

    async fn emit_played(&self, submitter: &dyn Submit) {
        let _gate = self.played_gate.lock().await;
        if self.cancel.is_cancelled() || self.played_attempted.load(Ordering::Acquire) {
            return;
        }
        self.played_attempted.store(true, Ordering::Release);

        let played = self.started_at.elapsed().min(self.duration);
        let event = ScrobbleEvent::played(self.song.id, played);
        if self.submit(submitter, event).await == Some(true) {
            self.played_emitted.store(true, Ordering::Release);
        }
    }

    /// Sleeps for `duration`, returning `false` if cancelled meanwhile.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    /// Body of the background task of a tracker.
    async fn run(self: Arc<Self>, submitter: Arc<dyn Submit>, thresholds: Thresholds) {
        trace!("waiting {:?} to report {} as now playing", thresholds.now_playing_delay, self.song);
        if !self.wait(thresholds.now_playing_delay).await {
            trace!("tracking {} cancelled before now playing", self.song);
            return;
        }
        self.emit_now_playing(&*submitter).await;

        let remaining = thresholds
            .played_at(self.duration)
            .saturating_sub(thresholds.now_playing_delay);
        if !remaining.is_zero() {
            trace!("waiting {remaining:?} to report {} as played", self.song);
            if !self.wait(remaining).await {
                trace!("tracking {} cancelled before played", self.song);
                return;
            }
        }
        self.emit_played(&*submitter).await;
    }
}

/// Owner of all trackers of a playback session.
///
/// Trackers are kept until stopped or replaced, also after both events
/// have been reported.
pub struct Registry {
    trackers: Mutex<HashMap<TrackId, Arc<Tracker>>>,
    submitter: Arc<dyn Submit>,
    thresholds: Thresholds,

    runtime: Handle,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Registry {
    /// Creates a registry that spawns its tasks on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn new(config: &Config, submitter: Arc<dyn Submit>) -> Self {
        Self::with_handle(config, submitter, Handle::current())
    }

    #[must_use]
    pub fn with_handle(config: &Config, submitter: Arc<dyn Submit>, runtime: Handle) -> Self {
        Self {
            trackers: Mutex::new(HashMap::new()),
            submitter,
            thresholds: Thresholds::from(config),
            runtime,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn trackers(&self) -> MutexGuard<'_, HashMap<TrackId, Arc<Tracker>>> {
        // Every critical section leaves the map consistent, so a panic
        // elsewhere cannot have left it half-updated.
        self.trackers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking `song`, replacing any tracker it already has.
    ///
    /// Songs shorter than the minimum duration are not tracked.
    pub fn start_tracking(&self, song: Song, duration: Duration) {
        if duration < self.thresholds.min_duration {
            debug!(
                "not tracking {song}: {}s is too short to scrobble",
                duration.as_secs()
            );
            return;
        }

        if self.shutdown.is_cancelled() {
            debug!("not tracking {song}: registry destroyed");
            return;
        }

        let id = song.id;
        debug!("tracking {song} ({}s)", duration.as_secs());

        let tracker = Arc::new(Tracker::new(song, duration, self.shutdown.child_token()));
        if let Some(previous) = self.trackers().insert(id, Arc::clone(&tracker)) {
            debug!("replacing tracker of {}", previous.song);
            previous.cancel.cancel();
        }

        let task = tracker.run(Arc::clone(&self.submitter), self.thresholds);
        self.tasks.spawn_on(task, &self.runtime);
    }

    /// Stops tracking the song with `id`, if it is tracked.
    pub fn stop_tracking(&self, id: TrackId) {
        if let Some(tracker) = self.trackers().remove(&id) {
            debug!("stopped tracking {}", tracker.song);
            tracker.cancel.cancel();
        }
    }

    /// Stops tracking all songs.
    pub fn stop_all_tracking(&self) {
        let trackers: Vec<_> = self.trackers().drain().map(|(_, tracker)| tracker).collect();
        if !trackers.is_empty() {
            debug!("stopped tracking {} songs", trackers.len());
        }
        for tracker in trackers {
            tracker.cancel.cancel();
        }
    }

    /// Informs the tracker of `id` about the playback position.
    ///
    /// Once `position` is past the played threshold of `duration`, the song
    /// is reported as played right away instead of waiting for its timer.
    pub fn update_playback_position(&self, id: TrackId, position: Duration, duration: Duration) {
        let Some(tracker) = self.trackers().get(&id).cloned() else {
            return;
        };

        if tracker.played_attempted.load(Ordering::Acquire)
            || position < self.thresholds.played_at(duration)
        {
            return;
        }

        // One early emission in flight is enough.
        if tracker
            .early_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        debug!(
            "{} at {}s of {}s, reporting as played",
            tracker.song,
            position.as_secs(),
            duration.as_secs()
        );
        let submitter = Arc::clone(&self.submitter);
        self.tasks.spawn_on(
            async move {
                tracker.emit_played(&*submitter).await;
                tracker.early_pending.store(false, Ordering::Release);
            },
            &self.runtime,
        );
    }

    /// Stops all tracking and accepts no new trackers.
    pub fn destroy(&self) {
        self.stop_all_tracking();
        self.shutdown.cancel();
        self.tasks.close();
    }

    /// Waits for all background tasks to finish after [`destroy`](Self::destroy).
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trackers().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trackers().is_empty()
    }

    #[must_use]
    pub fn is_tracking(&self, id: TrackId) -> bool {
        self.trackers().contains_key(&id)
    }

    #[must_use]
    pub fn snapshot(&self, id: TrackId) -> Option<TrackerStatus> {
        self.trackers().get(&id).map(|tracker| tracker.status())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use reqwest::{StatusCode, Url};

    use super::*;
    use crate::{error::Error, scrobble::ScrobbleType};

    /// Records submitted events; fails those of the kinds it is told to.
    pub(crate) struct Recorder {
        started: Instant,
        events: Mutex<Vec<(Duration, ScrobbleEvent)>>,
        reject: Mutex<Vec<ScrobbleType>>,
    }

    impl Recorder {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                events: Mutex::new(Vec::new()),
                reject: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn reject(&self, kind: ScrobbleType) {
            self.reject.lock().unwrap().push(kind);
        }

        /// Events of `kind` with the time they were submitted at, relative
        /// to the creation of the recorder.
        pub(crate) fn of(&self, kind: ScrobbleType) -> Vec<(Duration, ScrobbleEvent)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, event)| event.kind() == kind)
                .copied()
                .collect()
        }

        pub(crate) fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Submit for Recorder {
        async fn scrobble(&self, event: ScrobbleEvent) -> ScrobbleResult {
            self.events
                .lock()
                .unwrap()
                .push((self.started.elapsed(), event));

            if self.reject.lock().unwrap().contains(&event.kind()) {
                if event.kind() == ScrobbleType::Played {
                    return ScrobbleResult::NetworkError(Error::unavailable("connection refused"));
                }
                return ScrobbleResult::ServerError {
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    title: "rejected".to_owned(),
                    kind: String::new(),
                    trace_id: String::new(),
                };
            }

            ScrobbleResult::Success(None)
        }
    }

    pub(crate) fn config() -> Config {
        Config::new("test", Url::parse("http://localhost/scrobble").unwrap())
    }

    pub(crate) fn song(seconds: u64) -> Song {
        Song::new(
            TrackId::fast_v4(),
            "Windowlicker",
            "Aphex Twin",
            Duration::from_secs(seconds),
        )
    }

    /// Takes `delay` to answer each submission.
    struct Slow {
        recorder: Arc<Recorder>,
        delay: Duration,
    }

    #[async_trait]
    impl Submit for Slow {
        async fn scrobble(&self, event: ScrobbleEvent) -> ScrobbleResult {
            let result = self.recorder.scrobble(event).await;
            tokio::time::sleep(self.delay).await;
            result
        }
    }

    fn registry(recorder: &Arc<Recorder>) -> Registry {
        Registry::new(&config(), Arc::clone(recorder) as Arc<dyn Submit>)
    }

    async fn advance_to(recorder: &Recorder, millis: u64) {
        let at = recorder.started + Duration::from_millis(millis);
        tokio::time::sleep_until(at).await;
    }

    fn secs(offset: Duration) -> f64 {
        offset.as_secs_f64()
    }

    #[tokio::test(start_paused = true)]
    async fn reports_now_playing_then_played() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(40);
        let id = song.id;

        registry.start_tracking(song, Duration::from_secs(40));

        advance_to(&recorder, 9_900).await;
        assert_eq!(recorder.count(), 0);

        advance_to(&recorder, 10_500).await;
        let now_playing = recorder.of(ScrobbleType::NowPlaying);
        assert_eq!(now_playing.len(), 1);
        assert!((10.0..10.1).contains(&secs(now_playing[0].0)));
        assert_eq!(now_playing[0].1.track_id(), id);
        assert!(recorder.of(ScrobbleType::Played).is_empty());

        advance_to(&recorder, 60_000).await;
        let played = recorder.of(ScrobbleType::Played);
        assert_eq!(played.len(), 1);
        assert!((20.0..20.1).contains(&secs(played[0].0)));
        let played_duration = played[0].1.played_duration().as_secs_f64();
        assert!((20.0..20.01).contains(&played_duration), "{played_duration}");

        assert_eq!(
            registry.snapshot(id),
            Some(TrackerStatus {
                now_playing_emitted: true,
                played_emitted: true,
            })
        );
        assert!(registry.is_tracking(id));
    }

    #[tokio::test(start_paused = true)]
    async fn short_songs_are_not_tracked() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);

        registry.start_tracking(song(20), Duration::from_secs(20));
        registry.start_tracking(song(29), Duration::from_millis(29_999));

        assert!(registry.is_empty());
        advance_to(&recorder, 60_000).await;
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn minimum_duration_is_tracked() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);

        registry.start_tracking(song(30), Duration::from_secs(30));
        assert_eq!(registry.len(), 1);

        advance_to(&recorder, 30_000).await;
        assert_eq!(recorder.of(ScrobbleType::NowPlaying).len(), 1);
        let played = recorder.of(ScrobbleType::Played);
        assert_eq!(played.len(), 1);
        assert!((15.0..15.1).contains(&secs(played[0].0)));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_trackers_emit_nothing() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(40);
        let id = song.id;

        registry.start_tracking(song, Duration::from_secs(40));
        advance_to(&recorder, 5_000).await;
        registry.stop_tracking(id);
        registry.stop_tracking(id);

        assert!(registry.is_empty());
        advance_to(&recorder, 120_000).await;
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_between_events_keeps_what_was_sent() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(100);
        let id = song.id;

        registry.start_tracking(song, Duration::from_secs(100));
        advance_to(&recorder, 15_000).await;
        registry.stop_tracking(id);

        advance_to(&recorder, 120_000).await;
        assert_eq!(recorder.of(ScrobbleType::NowPlaying).len(), 1);
        assert!(recorder.of(ScrobbleType::Played).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_tracker() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(100);
        let id = song.id;

        registry.start_tracking(song.clone(), Duration::from_secs(100));
        advance_to(&recorder, 5_000).await;
        registry.start_tracking(song, Duration::from_secs(100));
        assert_eq!(registry.len(), 1);

        advance_to(&recorder, 14_000).await;
        assert_eq!(recorder.count(), 0);

        advance_to(&recorder, 16_000).await;
        let now_playing = recorder.of(ScrobbleType::NowPlaying);
        assert_eq!(now_playing.len(), 1);
        assert!((15.0..15.1).contains(&secs(now_playing[0].0)));
        assert_eq!(now_playing[0].1.track_id(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn position_update_reports_played_early_and_once() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(100);
        let id = song.id;
        let duration = Duration::from_secs(100);

        registry.start_tracking(song, duration);
        advance_to(&recorder, 11_000).await;

        registry.update_playback_position(id, Duration::from_secs(60), duration);
        advance_to(&recorder, 11_100).await;

        let played = recorder.of(ScrobbleType::Played);
        assert_eq!(played.len(), 1);
        assert!((11.0..11.1).contains(&secs(played[0].0)));
        assert!(registry.snapshot(id).unwrap().played_emitted);

        // Neither more updates nor the scheduled timer report again.
        registry.update_playback_position(id, Duration::from_secs(61), duration);
        advance_to(&recorder, 120_000).await;
        assert_eq!(recorder.of(ScrobbleType::Played).len(), 1);
        assert_eq!(recorder.of(ScrobbleType::NowPlaying).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn position_update_before_now_playing() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(100);
        let id = song.id;
        let duration = Duration::from_secs(100);

        registry.start_tracking(song, duration);
        advance_to(&recorder, 2_000).await;
        registry.update_playback_position(id, Duration::from_secs(50), duration);

        advance_to(&recorder, 120_000).await;
        assert_eq!(recorder.of(ScrobbleType::Played).len(), 1);
        assert_eq!(recorder.of(ScrobbleType::NowPlaying).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn position_below_threshold_changes_nothing() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let song = song(100);
        let id = song.id;
        let duration = Duration::from_secs(100);

        registry.start_tracking(song, duration);
        advance_to(&recorder, 11_000).await;
        registry.update_playback_position(id, Duration::from_millis(49_999), duration);
        registry.update_playback_position(TrackId::fast_v4(), duration, duration);

        advance_to(&recorder, 49_000).await;
        assert!(recorder.of(ScrobbleType::Played).is_empty());
        assert!(!registry.snapshot(id).unwrap().played_emitted);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submissions_are_not_retried() {
        let recorder = Recorder::new();
        recorder.reject(ScrobbleType::NowPlaying);
        let registry = registry(&recorder);
        let song = song(40);
        let id = song.id;

        registry.start_tracking(song, Duration::from_secs(40));
        advance_to(&recorder, 60_000).await;

        assert_eq!(recorder.of(ScrobbleType::NowPlaying).len(), 1);
        assert_eq!(recorder.of(ScrobbleType::Played).len(), 1);
        assert_eq!(
            registry.snapshot(id),
            Some(TrackerStatus {
                now_playing_emitted: false,
                played_emitted: true,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_played_leaves_flag_unset() {
        let recorder = Recorder::new();
        recorder.reject(ScrobbleType::Played);
        let registry = registry(&recorder);
        let song = song(40);
        let id = song.id;

        registry.start_tracking(song, Duration::from_secs(40));
        advance_to(&recorder, 60_000).await;

        assert_eq!(recorder.of(ScrobbleType::Played).len(), 1);
        assert!(!registry.snapshot(id).unwrap().played_emitted);
    }

    #[tokio::test(start_paused = true)]
    async fn played_follows_immediately_when_threshold_already_passed() {
        let recorder = Recorder::new();
        let mut config = config();
        config.now_playing_delay = Duration::from_secs(20);
        let registry = Registry::new(&config, Arc::clone(&recorder) as Arc<dyn Submit>);

        registry.start_tracking(song(30), Duration::from_secs(30));
        advance_to(&recorder, 21_000).await;

        let now_playing = recorder.of(ScrobbleType::NowPlaying);
        let played = recorder.of(ScrobbleType::Played);
        assert_eq!((now_playing.len(), played.len()), (1, 1));
        assert_eq!(now_playing[0].0, played[0].0);
    }

    #[tokio::test(start_paused = true)]
    async fn trackers_are_independent() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);
        let first = song(40);
        let second = song(60);
        let first_id = first.id;

        registry.start_tracking(first, Duration::from_secs(40));
        advance_to(&recorder, 3_000).await;
        registry.start_tracking(second, Duration::from_secs(60));
        assert_eq!(registry.len(), 2);

        advance_to(&recorder, 11_000).await;
        registry.stop_tracking(first_id);

        advance_to(&recorder, 120_000).await;
        let played = recorder.of(ScrobbleType::Played);
        assert_eq!(recorder.of(ScrobbleType::NowPlaying).len(), 2);
        assert_eq!(played.len(), 1);
        assert!((33.0..33.1).contains(&secs(played[0].0)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_and_destroy() {
        let recorder = Recorder::new();
        let registry = registry(&recorder);

        registry.start_tracking(song(40), Duration::from_secs(40));
        registry.start_tracking(song(50), Duration::from_secs(50));
        assert_eq!(registry.len(), 2);

        registry.stop_all_tracking();
        assert!(registry.is_empty());

        registry.start_tracking(song(60), Duration::from_secs(60));
        registry.destroy();
        assert!(registry.is_empty());

        registry.start_tracking(song(70), Duration::from_secs(70));
        assert!(registry.is_empty());

        registry.wait().await;
        advance_to(&recorder, 120_000).await;
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn position_update_during_scheduled_played_does_not_resend() {
        let recorder = Recorder::new();
        let slow = Slow {
            recorder: Arc::clone(&recorder),
            delay: Duration::from_secs(5),
        };
        let registry = Registry::new(&config(), Arc::new(slow));
        let song = song(100);
        let id = song.id;
        let duration = Duration::from_secs(100);

        registry.start_tracking(song, duration);
        advance_to(&recorder, 52_000).await;

        // The scheduled submission went out at 50s and is still in flight.
        assert_eq!(recorder.of(ScrobbleType::Played).len(), 1);
        assert!(!registry.snapshot(id).unwrap().played_emitted);
        registry.update_playback_position(id, Duration::from_secs(60), duration);

        advance_to(&recorder, 120_000).await;
        assert_eq!(recorder.of(ScrobbleType::Played).len(), 1);
        assert!(registry.snapshot(id).unwrap().played_emitted);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_early_played_is_not_repeated() {
        let recorder = Recorder::new();
        recorder.reject(ScrobbleType::Played);
        let registry = registry(&recorder);
        let song = song(100);
        let id = song.id;
        let duration = Duration::from_secs(100);

        registry.start_tracking(song, duration);
        advance_to(&recorder, 11_000).await;
        registry.update_playback_position(id, Duration::from_secs(60), duration);
        advance_to(&recorder, 12_000).await;
        registry.update_playback_position(id, Duration::from_secs(61), duration);

        advance_to(&recorder, 120_000).await;
        let played = recorder.of(ScrobbleType::Played);
        assert_eq!(played.len(), 1);
        assert!((11.0..11.1).contains(&secs(played[0].0)));
        assert!(!registry.snapshot(id).unwrap().played_emitted);
    }
}
