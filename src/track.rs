//! Track identity and metadata snapshots.
//!
//! A [`Song`] is captured when tracking starts and never updated
//! afterwards: whatever the player does to its own copy of the metadata,
//! both scrobble events for one play describe the same song.

use std::{fmt, ops::Deref, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Unique identifier of a song, as known to the scrobble service.
///
/// Wraps a `uuid::Uuid` and derefs to it, so all of its methods are
/// available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub uuid::Uuid);

impl Deref for TrackId {
    type Target = uuid::Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TrackId {
    /// Generates a random v4 identifier using `fastrand`.
    ///
    /// Not suitable where identifiers must be unpredictable.
    #[must_use]
    pub fn fast_v4() -> Self {
        let random_bytes = fastrand::u128(..).to_ne_bytes();
        let uuid = uuid::Builder::from_random_bytes(random_bytes).into_uuid();
        Self(uuid)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Parses simple, hyphenated, braced and URN formatted identifiers.
impl FromStr for TrackId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(Self).map_err(Into::into)
    }
}

impl From<uuid::Uuid> for TrackId {
    fn from(value: uuid::Uuid) -> Self {
        Self(value)
    }
}

/// Snapshot of the song being played.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Song {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Duration,
}

impl Song {
    #[must_use]
    pub fn new(id: TrackId, title: &str, artist: &str, duration: Duration) -> Self {
        Self {
            id,
            title: title.to_owned(),
            artist: artist.to_owned(),
            album: None,
            duration,
        }
    }

    #[must_use]
    pub fn with_album(mut self, album: &str) -> Self {
        self.album = Some(album.to_owned());
        self
    }
}

/// Formats as `artist - title`, the way it shows up in logs.
impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}
