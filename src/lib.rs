//! Scrobbling client: reports what a player plays to a scrobble service.
//!
//! A [`tracker::Registry`] owns one tracking task per song. Each task
//! reports the song as "now playing" shortly after it starts, and as
//! "played" once enough of it has played. Events go out through a
//! [`scrobble::Client`], which posts them over a [`retry::Retrying`]
//! HTTP transport.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod retry;
pub mod scrobble;
pub mod token;
pub mod track;
pub mod tracker;
pub mod util;
