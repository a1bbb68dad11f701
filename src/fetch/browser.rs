//! Headless Chrome sessions for rendered retrieval.
//!
//! A [`BrowserSession`] owns one Chrome process and the task driving its
//! DevTools connection. Sessions are cheap to reuse: every retrieval opens a
//! fresh page and closes it afterwards, so one session can serve a whole
//! channel crawl.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::LoaderId;
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, FrameId, NavigateParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::evasion::Evasion;
use super::user_agent::random_user_agent;
use super::{FetchError, NavigationTimeout, RenderProfile};

/// Lifecycle event Chrome emits once a frame has had at most two open
/// connections for 500 ms.
pub const NETWORK_SETTLED: &str = "networkAlmostIdle";

// Protocol-level deadline; per-strategy deadlines are enforced around navigation.
const SESSION_REQUEST_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const STANDARD_ARGS: &[&str] = &["--no-sandbox", "--disable-setuid-sandbox"];

const STEALTH_ARGS: &[&str] = &[
    "--disable-gpu",
    "--no-sandbox",
    "--no-zygote",
    "--disable-setuid-sandbox",
    "--disable-accelerated-2d-canvas",
    "--disable-dev-shm-usage",
    "--ignore-certificate-errors",
    "--proxy-server=direct://",
    "--proxy-bypass-list=*",
    "--disable-blink-features=AutomationControlled",
];

/// Launch configuration of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlavor {
    Standard,
    Stealth,
}

impl SessionFlavor {
    pub fn launch_args(self) -> &'static [&'static str] {
        match self {
            SessionFlavor::Standard => STANDARD_ARGS,
            SessionFlavor::Stealth => STEALTH_ARGS,
        }
    }
}

pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    flavor: SessionFlavor,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("flavor", &self.flavor)
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    #[instrument(level = "info", skip(chrome_path))]
    pub(crate) async fn launch(
        flavor: SessionFlavor,
        chrome_path: Option<&Path>,
    ) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder()
            .args(flavor.launch_args().iter().copied())
            .request_timeout(SESSION_REQUEST_TIMEOUT);
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(FetchError::BrowserLaunch)?;

        let (browser, mut events) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser connection event error");
                }
            }
        });

        info!("Browser session launched");
        Ok(Self {
            browser,
            handler,
            flavor,
        })
    }

    pub fn flavor(&self) -> SessionFlavor {
        self.flavor
    }

    /// Open a page, render `url` under `profile` and return the final HTML.
    ///
    /// The page is closed afterwards whether or not rendering succeeded.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub(crate) async fn render(
        &self,
        url: &str,
        profile: &RenderProfile,
    ) -> Result<String, FetchError> {
        let page = self.browser.new_page("about:blank").await?;
        let result = render_page(&page, url, profile).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close page");
        }
        result
    }

    /// Shut the browser down. Failures are logged, never returned.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Failed to reap browser process");
        }
        self.handler.abort();
        info!("Browser session closed");
    }
}

async fn render_page(page: &Page, url: &str, profile: &RenderProfile) -> Result<String, FetchError> {
    if profile.random_user_agent {
        let agent = random_user_agent();
        debug!(user_agent = agent, "Overriding user agent");
        page.set_user_agent(agent).await?;
    }
    let interceptors = apply_evasions(page, profile.evasions).await?;
    let result = navigate(page, url, profile.timeout).await;
    for task in interceptors {
        task.abort();
    }
    let html = result?;
    info!(bytes = html.len(), "Rendered page");
    Ok(html)
}

/// Navigate to `url`, wait until its network has settled and read the DOM.
async fn navigate(page: &Page, url: &str, limit: NavigationTimeout) -> Result<String, FetchError> {
    let load = async {
        let mut lifecycle = page.event_listener::<EventLifecycleEvent>().await?;
        let navigation = page.execute(NavigateParams::new(url)).await?.result;
        if let Some(reason) = navigation.error_text {
            return Err(FetchError::Browser(CdpError::ChromeMessage(reason)));
        }
        wait_for_network_settled(&mut lifecycle, &navigation.frame_id, navigation.loader_id.as_ref())
            .await;
        Ok::<_, FetchError>(page.content().await?)
    };

    match limit {
        NavigationTimeout::Unbounded => load.await,
        NavigationTimeout::Bounded(after) => timeout(after, load)
            .await
            .map_err(|_| FetchError::NavigationTimeout {
                url: url.to_string(),
                after,
            })?,
    }
}

async fn wait_for_network_settled(
    lifecycle: &mut EventStream<EventLifecycleEvent>,
    frame: &FrameId,
    loader: Option<&LoaderId>,
) {
    while let Some(event) = lifecycle.next().await {
        if settles(&event, frame, loader) {
            debug!("Network settled");
            return;
        }
    }
    debug!("Lifecycle stream ended before the network settled");
}

/// Whether `event` marks the end of network activity for this navigation.
fn settles(event: &EventLifecycleEvent, frame: &FrameId, loader: Option<&LoaderId>) -> bool {
    event.name == NETWORK_SETTLED
        && &event.frame_id == frame
        && loader.is_none_or(|loader| &event.loader_id == loader)
}

async fn apply_evasions(page: &Page, evasions: &[Evasion]) -> Result<Vec<JoinHandle<()>>, FetchError> {
    let mut interceptors = Vec::new();
    for evasion in evasions {
        match evasion.apply(page).await {
            Ok(Some(task)) => interceptors.push(task),
            Ok(None) => {}
            Err(e) => {
                interceptors.iter().for_each(JoinHandle::abort);
                return Err(e.into());
            }
        }
    }
    Ok(interceptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_flavors_disable_sandbox() {
        for flavor in [SessionFlavor::Standard, SessionFlavor::Stealth] {
            assert!(flavor.launch_args().contains(&"--no-sandbox"));
            assert!(flavor.launch_args().contains(&"--disable-setuid-sandbox"));
        }
    }

    fn lifecycle(name: &str, frame: &str, loader: &str) -> EventLifecycleEvent {
        serde_json::from_value(serde_json::json!({
            "frameId": frame,
            "loaderId": loader,
            "name": name,
            "timestamp": 1.0,
        }))
        .unwrap()
    }

    #[test]
    fn test_settles_on_network_almost_idle_of_the_navigation() {
        let frame = FrameId::from("main".to_string());
        let loader = LoaderId::from("nav-2".to_string());
        assert!(settles(&lifecycle("networkAlmostIdle", "main", "nav-2"), &frame, Some(&loader)));
        assert!(settles(&lifecycle("networkAlmostIdle", "main", "nav-9"), &frame, None));
    }

    #[test]
    fn test_load_alone_does_not_settle() {
        let frame = FrameId::from("main".to_string());
        let loader = LoaderId::from("nav-2".to_string());
        for name in ["load", "DOMContentLoaded", "firstMeaningfulPaint"] {
            assert!(!settles(&lifecycle(name, "main", "nav-2"), &frame, Some(&loader)), "{name}");
        }
    }

    #[test]
    fn test_ignores_other_frames_and_earlier_loads() {
        let frame = FrameId::from("main".to_string());
        let loader = LoaderId::from("nav-2".to_string());
        assert!(!settles(&lifecycle("networkAlmostIdle", "ad-frame", "nav-2"), &frame, Some(&loader)));
        assert!(!settles(&lifecycle("networkAlmostIdle", "main", "blank-1"), &frame, Some(&loader)));
    }

    #[test]
    fn test_stealth_hides_automation() {
        let args = SessionFlavor::Stealth.launch_args();
        assert!(args.contains(&"--disable-blink-features=AutomationControlled"));
        assert!(args.contains(&"--disable-dev-shm-usage"));
        assert!(!SessionFlavor::Standard.launch_args().contains(&"--disable-gpu"));
    }
}
