//! Browser automation surface used by the crawler.
//!
//! The crawler only talks to these traits. [`ChromeSession`] drives a real
//! Chromium over the DevTools protocol; tests plug in an in-memory session.
//!
//! Calls are blocking, so crawls run on a blocking worker thread.

mod chrome;

pub use chrome::ChromeSession;

use anyhow::Result;
use std::ops::Deref;
use std::time::Duration;
use tracing::warn;

/// Owns the browser process for the whole run. The process is created on
/// first use and reused by every later context.
pub trait BrowserSession: Send + Sync {
    /// Open an isolated browsing context (own cookies and storage).
    fn open_context(&self) -> Result<Box<dyn BrowsingContext + '_>>;
}

/// An isolated set of pages.
pub trait BrowsingContext {
    fn new_page(&self) -> Result<Box<dyn Page + '_>>;

    /// Close every page still open in this context.
    fn close(&self) -> Result<()>;
}

/// One tab.
pub trait Page {
    /// Navigate and wait for the page to settle, failing after `timeout`.
    fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// First element matching `selector`, or `None` when nothing matches.
    fn query_selector(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle + '_>>>;

    /// Every element matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle + '_>>>;

    fn close(&self) -> Result<()>;
}

pub trait ElementHandle {
    fn inner_text(&self) -> Result<String>;

    fn attribute(&self, name: &str) -> Result<Option<String>>;
}

/// Closes the wrapped context when dropped, whichever way the crawl exits.
pub struct OpenContext<'a> {
    inner: Box<dyn BrowsingContext + 'a>,
}

impl<'a> OpenContext<'a> {
    pub fn new(inner: Box<dyn BrowsingContext + 'a>) -> Self {
        Self { inner }
    }
}

impl<'a> Deref for OpenContext<'a> {
    type Target = dyn BrowsingContext + 'a;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl Drop for OpenContext<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            warn!("Failed to close browsing context: {:#}", e);
        }
    }
}

/// Closes the wrapped page when dropped.
pub struct OpenPage<'a> {
    inner: Box<dyn Page + 'a>,
}

impl<'a> OpenPage<'a> {
    pub fn new(inner: Box<dyn Page + 'a>) -> Self {
        Self { inner }
    }
}

impl<'a> Deref for OpenPage<'a> {
    type Target = dyn Page + 'a;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl Drop for OpenPage<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            warn!("Failed to close page: {:#}", e);
        }
    }
}
