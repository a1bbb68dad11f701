//! Anti-detection patches applied by the stealth strategy.
//!
//! Each patch is a named [`Evasion`] that can be applied to a page on its own.
//! Script patches are installed with `Page.addScriptToEvaluateOnNewDocument`,
//! so they run before any site script can probe the runtime. The rest are
//! protocol-level page settings.
//!
//! Subresource blocking pauses every image, stylesheet and font request via
//! the `Fetch` domain and fails it. The task answering those pauses lives as
//! long as the page and is handed back to the caller to abort.

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use rand::{Rng, rng};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Resource types the stealth strategy never loads, whatever their URL.
pub const BLOCKED_RESOURCE_TYPES: &[ResourceType] =
    &[ResourceType::Image, ResourceType::Stylesheet, ResourceType::Font];

const BASE_VIEWPORT: (u32, u32) = (1920, 3000);
const VIEWPORT_JITTER: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evasion {
    /// `navigator.webdriver` reports `false`.
    WebdriverFlag,
    /// A `window.chrome.runtime` object exists, as in a desktop Chrome.
    ChromeRuntime,
    /// Notification permission queries answer like a real profile would.
    PermissionsQuery,
    /// `navigator.plugins` is non-empty.
    PluginList,
    /// `navigator.languages` is populated.
    Languages,
    /// Viewport size is jittered per call.
    RandomViewport,
    /// Images, stylesheets and fonts are not fetched.
    BlockSubresources,
}

impl Evasion {
    pub const STEALTH: &'static [Evasion] = &[
        Evasion::RandomViewport,
        Evasion::BlockSubresources,
        Evasion::WebdriverFlag,
        Evasion::ChromeRuntime,
        Evasion::PermissionsQuery,
        Evasion::PluginList,
        Evasion::Languages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Evasion::WebdriverFlag => "webdriver-flag",
            Evasion::ChromeRuntime => "chrome-runtime",
            Evasion::PermissionsQuery => "permissions-query",
            Evasion::PluginList => "plugin-list",
            Evasion::Languages => "languages",
            Evasion::RandomViewport => "random-viewport",
            Evasion::BlockSubresources => "block-subresources",
        }
    }

    /// Page-context script for script-based patches.
    pub fn script(self) -> Option<&'static str> {
        match self {
            Evasion::WebdriverFlag => Some(
                "Object.defineProperty(navigator, 'webdriver', { get: () => false });",
            ),
            Evasion::ChromeRuntime => Some("window.chrome = { runtime: {} };"),
            Evasion::PermissionsQuery => Some(
                "const originalQuery = window.navigator.permissions.query;\n\
                 window.navigator.permissions.query = (parameters) => (\n\
                 \x20   parameters.name === 'notifications'\n\
                 \x20       ? Promise.resolve({ state: Notification.permission })\n\
                 \x20       : originalQuery(parameters)\n\
                 );",
            ),
            Evasion::PluginList => Some(
                "Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });",
            ),
            Evasion::Languages => Some(
                "Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });",
            ),
            Evasion::RandomViewport | Evasion::BlockSubresources => None,
        }
    }

    /// Apply the patch to `page`.
    ///
    /// Returns the background task that keeps the patch in effect, if it needs one.
    pub(crate) async fn apply(self, page: &Page) -> Result<Option<JoinHandle<()>>, CdpError> {
        debug!(patch = self.name(), "Applying evasion");
        if let Some(script) = self.script() {
            page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await?;
            return Ok(None);
        }
        match self {
            Evasion::RandomViewport => {
                let (width, height) = random_viewport();
                page.execute(SetDeviceMetricsOverrideParams::new(
                    i64::from(width),
                    i64::from(height),
                    1.0,
                    false,
                ))
                .await?;
                Ok(None)
            }
            Evasion::BlockSubresources => block_subresources(page).await.map(Some),
            _ => Ok(None),
        }
    }
}

/// Interception patterns matching any URL of a blocked resource type.
pub fn blocking_patterns() -> Vec<RequestPattern> {
    BLOCKED_RESOURCE_TYPES
        .iter()
        .map(|kind| RequestPattern::builder().resource_type(kind.clone()).build())
        .collect()
}

async fn block_subresources(page: &Page) -> Result<JoinHandle<()>, CdpError> {
    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    page.execute(EnableParams::builder().patterns(blocking_patterns()).build())
        .await?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(request) = paused.next().await {
            trace!(url = %request.request.url, kind = ?request.resource_type, "Blocking subresource");
            let fail = FailRequestParams::new(request.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(e) = page.execute(fail).await {
                debug!(error = %e, "Failed to block subresource");
            }
        }
    }))
}

/// A desktop-sized viewport, jittered so repeated visits don't share one size.
pub fn random_viewport() -> (u32, u32) {
    let mut r = rng();
    (
        BASE_VIEWPORT.0 + r.random_range(0..VIEWPORT_JITTER),
        BASE_VIEWPORT.1 + r.random_range(0..VIEWPORT_JITTER),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stealth_covers_every_patch_once() {
        let all = [
            Evasion::WebdriverFlag,
            Evasion::ChromeRuntime,
            Evasion::PermissionsQuery,
            Evasion::PluginList,
            Evasion::Languages,
            Evasion::RandomViewport,
            Evasion::BlockSubresources,
        ];
        for patch in all {
            let count = Evasion::STEALTH.iter().filter(|p| **p == patch).count();
            assert_eq!(count, 1, "{} should appear once", patch.name());
        }
        assert_eq!(Evasion::STEALTH.len(), all.len());
    }

    #[test]
    fn test_script_patches_target_their_property() {
        let probes = [
            (Evasion::WebdriverFlag, "navigator, 'webdriver'"),
            (Evasion::ChromeRuntime, "window.chrome"),
            (Evasion::PermissionsQuery, "permissions.query"),
            (Evasion::PluginList, "navigator, 'plugins'"),
            (Evasion::Languages, "navigator, 'languages'"),
        ];
        for (patch, needle) in probes {
            let script = patch.script().unwrap();
            assert!(script.contains(needle), "{} script: {script}", patch.name());
        }
    }

    #[test]
    fn test_protocol_patches_have_no_script() {
        assert_eq!(Evasion::RandomViewport.script(), None);
        assert_eq!(Evasion::BlockSubresources.script(), None);
    }

    #[test]
    fn test_random_viewport_stays_in_range() {
        for _ in 0..200 {
            let (w, h) = random_viewport();
            assert!((1920..2020).contains(&w), "width {w}");
            assert!((3000..3100).contains(&h), "height {h}");
        }
    }

    #[test]
    fn test_blocking_matches_by_type_not_url() {
        let patterns = blocking_patterns();
        let kinds: Vec<_> = patterns
            .iter()
            .map(|p| p.resource_type.clone().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![ResourceType::Image, ResourceType::Stylesheet, ResourceType::Font]
        );
        assert!(patterns.iter().all(|p| p.url_pattern.is_none()));
    }

    #[test]
    fn test_scripts_and_documents_still_load() {
        for kind in [ResourceType::Document, ResourceType::Script, ResourceType::Xhr, ResourceType::Fetch] {
            assert!(!BLOCKED_RESOURCE_TYPES.contains(&kind), "{kind:?}");
        }
    }
}
