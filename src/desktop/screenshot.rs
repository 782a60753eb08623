//! # Examples
//!
//! Taking a screenshot
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use portal_capture::desktop::screenshot;
//!
//! fn run() -> portal_capture::Result<()> {
//!     match screenshot::take(true, Duration::from_secs(30))? {
//!         Some(png) => println!("Got {} bytes", png.len()),
//!         None => println!("Cancelled"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Reusing a client with more options
//!
//! ```rust,no_run
//! use portal_capture::{
//!     desktop::screenshot::{CaptureOptions, PortalCapture},
//!     WindowIdentifier,
//! };
//!
//! fn run() -> portal_capture::Result<()> {
//!     let options = CaptureOptions::default()
//!         .interactive(false)
//!         .identifier(WindowIdentifier::from_xid(0x1c00003));
//!     let mut client = PortalCapture::new();
//!     let first = client.capture(&options)?;
//!     let second = client.capture(&options)?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use super::request::{parse_response, RequestHandle, ResponseWaiter};
use crate::{
    bus::{Bus, SessionBus, Transport},
    helpers::{read_and_remove, uri_to_path, FileStore, LocalFiles},
    message::Message,
    proxy::{Proxy, DEFAULT_REPLY_TIMEOUT},
    Result, WindowIdentifier,
};

pub(crate) const INTERFACE: &str = "org.freedesktop.portal.Screenshot";

#[derive(Clone, Debug)]
/// Specified options on a screenshot capture.
pub struct CaptureOptions {
    identifier: WindowIdentifier,
    interactive: bool,
    timeout: Duration,
    reply_timeout: Duration,
    poll_interval: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            identifier: WindowIdentifier::default(),
            interactive: false,
            timeout: Duration::from_secs(10),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl CaptureOptions {
    /// Sets the window the portal dialog should be attached to.
    #[must_use]
    pub fn identifier(mut self, identifier: WindowIdentifier) -> Self {
        self.identifier = identifier;
        self
    }

    /// Sets whether the dialog should offer customization before taking a
    /// screenshot.
    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Sets how long to wait for the portal to hand over the screenshot.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long to wait for the portal to acknowledge the request.
    #[must_use]
    pub fn reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Sets the longest single blocking read while waiting.
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// `Screenshot(s parent_window, a{sv} options)`.
fn screenshot_call<T: Transport>(
    proxy: &Proxy<'_, T>,
    options: &CaptureOptions,
) -> Result<Message> {
    let mut builder = proxy.method_call("Screenshot")?;
    let mut body = builder.body();
    body.append_str(&options.identifier.to_string());

    let mut vardict = body.open_dict("s", "v")?;
    for (key, value) in [("modal", false), ("interactive", options.interactive)] {
        let mut entry = vardict.open_dict_entry()?;
        entry.append_str(key);
        let mut variant = entry.open_variant();
        variant.append_bool(value);
        variant.close()?;
        entry.close()?;
    }
    vardict.close()?;
    body.close()?;

    builder.build()
}

/// A client of the screenshot portal.
///
/// Each capture goes through a connection of its own, opened from `B`; the
/// resulting file is read and then deleted through `F`.
#[derive(Debug, Default)]
pub struct PortalCapture<B = SessionBus, F = LocalFiles> {
    bus: B,
    files: F,
}

impl PortalCapture {
    /// A client of the portal on the session bus.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Bus> PortalCapture<B> {
    pub fn with_bus(bus: B) -> Self {
        Self {
            bus,
            files: LocalFiles,
        }
    }
}

impl<B, F> PortalCapture<B, F> {
    /// Replaces the way screenshot files are read and deleted.
    pub fn with_files<G: FileStore>(self, files: G) -> PortalCapture<B, G> {
        PortalCapture {
            bus: self.bus,
            files,
        }
    }
}

impl<B: Bus, F: FileStore> PortalCapture<B, F> {
    /// Asks the portal for a screenshot and returns the content of the
    /// image file.
    ///
    /// Returns `None` if the user cancelled or the portal declined. Blocks
    /// until the portal responds, for up to the configured timeouts.
    pub fn capture(&mut self, options: &CaptureOptions) -> Result<Option<Vec<u8>>> {
        let uri = {
            let mut connection = self.bus.open()?;
            let mut proxy =
                Proxy::new_desktop(&mut connection, INTERFACE).reply_timeout(options.reply_timeout);
            let message = screenshot_call(&proxy, options)?;
            let handle = RequestHandle::extract(&*proxy.call(&message)?)?;
            #[cfg(feature = "tracing")]
            tracing::info!("Screenshot requested as {handle}");

            let signal = ResponseWaiter::new(options.timeout)
                .poll_interval(options.poll_interval)
                .wait(&mut connection, &handle)?;
            parse_response(&signal)?
        };

        let Some(uri) = uri else {
            return Ok(None);
        };
        let path = uri_to_path(&uri)?;
        read_and_remove(&self.files, &path).map(Some)
    }
}

/// Takes a screenshot through the portal on the session bus.
///
/// Returns the image file content, or `None` if the user cancelled.
/// `timeout` bounds the wait for the user to complete the request.
pub fn take(interactive: bool, timeout: Duration) -> Result<Option<Vec<u8>>> {
    let options = CaptureOptions::default()
        .interactive(interactive)
        .timeout(timeout);
    PortalCapture::new().capture(&options)
}
