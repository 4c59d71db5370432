use std::time::Duration;

use url::Url;

use crate::{retry::RetryPolicy, token::Token};

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// Sent as `playerName` with every scrobble.
    pub player_name: String,

    pub user_agent: String,

    /// Where scrobble events are posted to.
    pub endpoint: Url,
    pub token: Option<Token>,

    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub timeout: Duration,

    pub retry: RetryPolicy,

    /// Songs shorter than this are never tracked.
    pub min_duration: Duration,

    /// Time after tracking starts at which "now playing" is reported.
    pub now_playing_delay: Duration,

    /// Fraction of the song that must have played before it counts as played.
    pub played_threshold: f64,
}

impl Config {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(player_name: &str, endpoint: Url) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            panic!("application name and/or version invalid (\"{app_name}\"; \"{app_version}\")");
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        // Unlike the application name, the OS version is outside of our
        // control, so fall back instead of panicking.
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop)");
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,

            player_name: player_name.to_owned(),

            user_agent,

            endpoint,
            token: None,

            connect_timeout: Self::DEFAULT_TIMEOUT,
            read_timeout: Self::DEFAULT_TIMEOUT,
            timeout: Self::DEFAULT_TIMEOUT,

            retry: RetryPolicy::default(),

            min_duration: Duration::from_secs(30),
            now_playing_delay: Duration::from_secs(10),
            played_threshold: 0.5,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }
}
