//! Scrobble events and their submission.
//!
//! Two events are reported for every tracked play:
//! * [`ScrobbleEvent::NowPlaying`] shortly after playback starts
//! * [`ScrobbleEvent::Played`] once enough of the song has been heard
//!
//! The [`Client`] posts them as JSON and classifies the outcome into a
//! [`ScrobbleResult`]. It never retries; retries happen underneath, in the
//! [`Retrying`] transport it sends through.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "songId": "67e55044-10b1-426f-9247-bb680e5fe0c8",
//!   "playerName": "living room",
//!   "scrobbleType": "played",
//!   "timestamp": 1760448000.25,
//!   "playedDuration": 120.0,
//!   "scrobbleTypeValue": 2
//! }
//! ```
//!
//! Successful responses may carry `{"message": "..."}`. Errors carry
//! `{"title": "...", "type": "...", "traceId": "..."}`.

use std::{
    fmt,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    http,
    retry::{Retrying, Transport},
    track::TrackId,
    util,
};

/// Kind of scrobble, as encoded in `scrobbleTypeValue`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ScrobbleType {
    Unknown = 0,
    NowPlaying = 1,
    Played = 2,
}

impl ScrobbleType {
    /// Name as encoded in `scrobbleType`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NowPlaying => "nowPlaying",
            Self::Played => "played",
        }
    }
}

impl fmt::Display for ScrobbleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScrobbleEvent {
    NowPlaying {
        track_id: TrackId,
        at: SystemTime,
    },
    Played {
        track_id: TrackId,
        at: SystemTime,
        /// How long the song has been playing, at most its duration.
        played: Duration,
    },
}

impl ScrobbleEvent {
    #[must_use]
    pub fn now_playing(track_id: TrackId) -> Self {
        Self::NowPlaying {
            track_id,
            at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn played(track_id: TrackId, played: Duration) -> Self {
        Self::Played {
            track_id,
            at: SystemTime::now(),
            played,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScrobbleType {
        match self {
            Self::NowPlaying { .. } => ScrobbleType::NowPlaying,
            Self::Played { .. } => ScrobbleType::Played,
        }
    }

    #[must_use]
    pub fn track_id(&self) -> TrackId {
        match *self {
            Self::NowPlaying { track_id, .. } | Self::Played { track_id, .. } => track_id,
        }
    }

    /// Duration reported with the event; zero for "now playing".
    #[must_use]
    pub fn played_duration(&self) -> Duration {
        match *self {
            Self::NowPlaying { .. } => Duration::ZERO,
            Self::Played { played, .. } => played,
        }
    }

    #[must_use]
    pub fn at(&self) -> SystemTime {
        match *self {
            Self::NowPlaying { at, .. } | Self::Played { at, .. } => at,
        }
    }
}

/// Request body of a scrobble.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload<'a> {
    pub song_id: TrackId,
    pub player_name: &'a str,
    pub scrobble_type: &'static str,
    pub timestamp: f64,
    pub played_duration: f64,
    pub scrobble_type_value: ScrobbleType,
}

impl<'a> Payload<'a> {
    #[must_use]
    pub fn new(event: &ScrobbleEvent, player_name: &'a str) -> Self {
        let kind = event.kind();
        Self {
            song_id: event.track_id(),
            player_name,
            scrobble_type: kind.as_str(),
            timestamp: util::unix_seconds(event.at()),
            played_duration: event.played_duration().as_secs_f64(),
            scrobble_type_value: kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorBody {
    title: String,
    #[serde(rename = "type")]
    kind: String,
    trace_id: String,
}

/// Outcome of submitting one event.
#[derive(Debug)]
pub enum ScrobbleResult {
    /// The service accepted the event, optionally with a message.
    Success(Option<String>),

    /// The service answered, but not with success.
    ServerError {
        status: StatusCode,
        title: String,
        kind: String,
        trace_id: String,
    },

    /// No usable answer was received.
    NetworkError(Error),
}

impl fmt::Display for ScrobbleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(Some(message)) => write!(f, "accepted: {message}"),
            Self::Success(None) => write!(f, "accepted"),
            Self::ServerError {
                status,
                title,
                kind,
                trace_id,
            } => {
                write!(f, "{}: rejected with {status}", ErrorKind::from_status(*status))?;
                if !title.is_empty() {
                    write!(f, ": {title}")?;
                }
                if !kind.is_empty() {
                    write!(f, " ({kind})")?;
                }
                if !trace_id.is_empty() {
                    write!(f, " [trace {trace_id}]")?;
                }
                Ok(())
            }
            Self::NetworkError(e) => write!(f, "not delivered: {e}"),
        }
    }
}

/// Something that can submit scrobble events.
///
/// Submission never fails in the `Result` sense: every outcome, including
/// transport failures, is a [`ScrobbleResult`].
#[async_trait]
pub trait Submit: Send + Sync {
    async fn scrobble(&self, event: ScrobbleEvent) -> ScrobbleResult;
}

/// Posts scrobble events to the configured endpoint.
pub struct Client<T = Retrying<http::Client>> {
    transport: T,
    endpoint: Url,
    player_name: String,
}

impl Client {
    /// Creates a client that sends through a retrying HTTP client.
    ///
    /// Cancelling `shutdown` interrupts retry backoffs.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let http_client = http::Client::new(config)?;
        let transport = Retrying::new(http_client, config.retry, shutdown);
        Ok(Self::with_transport(transport, config))
    }
}

impl<T> Client<T>
where
    T: Transport,
{
    /// Longest error body excerpt reported when it is not structured.
    const MAX_EXCERPT: usize = 128;

    #[must_use]
    pub fn with_transport(transport: T, config: &Config) -> Self {
        Self {
            transport,
            endpoint: config.endpoint.clone(),
            player_name: config.player_name.clone(),
        }
    }

    fn request(&self, event: &ScrobbleEvent) -> Result<reqwest::Request> {
        let payload = Payload::new(event, &self.player_name);
        let body = serde_json::to_vec(&payload)?;
        trace!("payload: {payload:?}");

        Ok(http::Client::post(self.endpoint.clone(), body))
    }

    async fn classify(response: reqwest::Response) -> ScrobbleResult {
        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return ScrobbleResult::NetworkError(e.into()),
        };

        if status.is_success() {
            if body.iter().all(u8::is_ascii_whitespace) {
                return ScrobbleResult::Success(None);
            }

            return match serde_json::from_slice::<SuccessBody>(&body) {
                Ok(success) => ScrobbleResult::Success(success.message),
                Err(e) => ScrobbleResult::NetworkError(Error::invalid_argument(format!(
                    "unparseable response body: {e}"
                ))),
            };
        }

        let error = serde_json::from_slice::<ErrorBody>(&body).unwrap_or_else(|_| ErrorBody {
            title: String::from_utf8_lossy(&body)
                .trim()
                .chars()
                .take(Self::MAX_EXCERPT)
                .collect(),
            ..ErrorBody::default()
        });

        ScrobbleResult::ServerError {
            status,
            title: error.title,
            kind: error.kind,
            trace_id: error.trace_id,
        }
    }
}

#[async_trait]
impl<T> Submit for Client<T>
where
    T: Transport,
{
    async fn scrobble(&self, event: ScrobbleEvent) -> ScrobbleResult {
        let request = match self.request(&event) {
            Ok(request) => request,
            Err(e) => return ScrobbleResult::NetworkError(e),
        };

        match self.transport.execute(request).await {
            Ok(response) => Self::classify(response).await,
            Err(e) => ScrobbleResult::NetworkError(e),
        }
    }
}
