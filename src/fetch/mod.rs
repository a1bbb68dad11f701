//! Page retrieval with several strategies for sites of varying hostility.
//!
//! A [`Fetcher`] turns a URL into a raw document body using one [`Strategy`]:
//!
//! | Strategy | How | When |
//! |----------|-----|------|
//! | [`Strategy::Plain`] | single HTTP GET, optional delay first | server-rendered pages |
//! | [`Strategy::Rendered`] | headless Chrome, wait for network to settle | client-rendered pages |
//! | [`Strategy::RenderedRandomAgent`] | as `Rendered`, random user agent | light bot filtering |
//! | [`Strategy::Stealth`] | as `Rendered`, plus [`evasion`] patches, no timeout | aggressive bot detection |
//!
//! # Session ownership
//!
//! Rendered strategies run inside a [`BrowserSession`]. A session passed in by
//! the caller is only borrowed and stays open. Otherwise the fetcher launches a
//! session for the single retrieval and closes it on every path.
//!
//! # Errors
//!
//! Transport failures, including non-2xx statuses, are returned unmodified in
//! a [`FetchError`]. Interpreting a status (e.g. retrying a 404 elsewhere) is
//! the caller's business.

pub mod browser;
pub mod evasion;
pub mod user_agent;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chromiumoxide::error::CdpError;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

pub use browser::{BrowserSession, SessionFlavor};
use evasion::Evasion;

/// Timeout for plain requests and bounded navigations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const PLAIN_USER_AGENT: &str = concat!("rssgen/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no fetch strategy named {0:?}")]
    UnsupportedStrategy(String),

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("browser error: {0}")]
    Browser(#[from] CdpError),

    #[error("could not launch browser: {0}")]
    BrowserLaunch(String),

    #[error("navigation to {url} did not settle within {after:?}")]
    NavigationTimeout { url: String, after: Duration },
}

impl FetchError {
    /// The "not found" transport signal that triggers alternate listing URLs.
    pub fn is_not_found(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 404,
            FetchError::Transport(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// How a page is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Plain,
    Rendered,
    RenderedRandomAgent,
    Stealth,
}

/// Per-strategy navigation deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTimeout {
    Bounded(Duration),
    Unbounded,
}

/// What a rendered strategy does to a page before and during navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProfile {
    pub random_user_agent: bool,
    pub evasions: &'static [Evasion],
    pub timeout: NavigationTimeout,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Plain,
        Strategy::Rendered,
        Strategy::RenderedRandomAgent,
        Strategy::Stealth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Plain => "plain",
            Strategy::Rendered => "rendered",
            Strategy::RenderedRandomAgent => "rendered-random-agent",
            Strategy::Stealth => "stealth",
        }
    }

    /// `None` for [`Strategy::Plain`], which never touches a browser.
    pub fn session_flavor(self) -> Option<SessionFlavor> {
        match self {
            Strategy::Plain => None,
            Strategy::Rendered | Strategy::RenderedRandomAgent => Some(SessionFlavor::Standard),
            Strategy::Stealth => Some(SessionFlavor::Stealth),
        }
    }

    pub fn render_profile(self) -> Option<RenderProfile> {
        let bounded = NavigationTimeout::Bounded(DEFAULT_TIMEOUT);
        match self {
            Strategy::Plain => None,
            Strategy::Rendered => Some(RenderProfile {
                random_user_agent: false,
                evasions: &[],
                timeout: bounded,
            }),
            Strategy::RenderedRandomAgent => Some(RenderProfile {
                random_user_agent: true,
                evasions: &[],
                timeout: bounded,
            }),
            Strategy::Stealth => Some(RenderProfile {
                random_user_agent: true,
                evasions: Evasion::STEALTH,
                timeout: NavigationTimeout::Unbounded,
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = FetchError;

    /// Accepts the canonical names plus the historical `axios` / `puppeteer_*` ones.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "axios" => Ok(Strategy::Plain),
            "rendered" | "puppeteer_default" => Ok(Strategy::Rendered),
            "rendered-random-agent" | "puppeteer_useragent" => Ok(Strategy::RenderedRandomAgent),
            "stealth" | "puppeteer_stealth" => Ok(Strategy::Stealth),
            _ => Err(FetchError::UnsupportedStrategy(s.to_string())),
        }
    }
}

/// Strategy plus its knobs for one retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub strategy: Strategy,
    /// Pause before a plain request, to stay under informal rate limits.
    pub delay: Option<Duration>,
}

impl FetchOptions {
    pub const fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            delay: None,
        }
    }

    pub const fn plain() -> Self {
        Self::new(Strategy::Plain)
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Settings for constructing a [`Fetcher`].
#[derive(Debug, Clone, Default)]
pub struct FetcherSettings {
    /// Chrome/Chromium binary; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    chrome_path: Option<PathBuf>,
}

impl Fetcher {
    pub fn new(settings: FetcherSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(PLAIN_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            chrome_path: settings.chrome_path,
        })
    }

    /// Retrieve `url` with the strategy in `options`.
    ///
    /// `session` is only used by rendered strategies and is never closed here.
    #[instrument(level = "info", skip_all, fields(%url, strategy = %options.strategy))]
    pub async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        session: Option<&BrowserSession>,
    ) -> Result<String, FetchError> {
        debug!("URL crawling");
        let Some(profile) = options.strategy.render_profile() else {
            if let Some(delay) = options.delay {
                debug!(?delay, "Delaying plain request");
                sleep(delay).await;
            }
            return self.fetch_plain(url).await;
        };

        match session {
            Some(session) => session.render(url, &profile).await,
            None => {
                let flavor = options
                    .strategy
                    .session_flavor()
                    .unwrap_or(SessionFlavor::Standard);
                let session = self.launch_session(flavor).await?;
                let result = session.render(url, &profile).await;
                session.close().await;
                result
            }
        }
    }

    /// Launch a browser session the caller owns and must [`BrowserSession::close`].
    pub async fn launch_session(&self, flavor: SessionFlavor) -> Result<BrowserSession, FetchError> {
        BrowserSession::launch(flavor, self.chrome_path.as_deref()).await
    }

    async fn fetch_plain(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        info!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
