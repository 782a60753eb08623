#![deny(rustdoc::broken_intra_doc_links)]
//! A blocking client of the screenshot [XDG desktop portal](https://flatpak.github.io/xdg-desktop-portal/),
//! built on top of [zbus](https://github.com/dbus2/zbus).
//!
//! The portal takes screenshots on behalf of applications that can't read
//! the screen themselves, such as sandboxed ones or any client of a Wayland
//! compositor. A capture is a two step exchange: the `Screenshot` call is
//! answered right away with a request handle, and the result is delivered
//! later by a `Response` signal on that handle.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use portal_capture::desktop::screenshot;
//!
//! fn run() -> portal_capture::Result<()> {
//!     if let Some(png) = screenshot::take(false, Duration::from_secs(10))? {
//!         std::fs::write("screenshot.png", png)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Optional features
//!
//! | Feature | Description |
//! | ---     | ----------- |
//! | tracing | Record the exchanges with the portal through [`tracing`](https://docs.rs/tracing). Enabled by default |

/// Alias for a [`Result`] with the error type `portal_capture::Error`.
pub type Result<T> = std::result::Result<T, Error>;

pub mod bus;
/// Interact with the user's desktop.
pub mod desktop;
mod error;
pub mod helpers;
pub mod message;
mod proxy;
mod window_identifier;

pub use self::{error::Error, window_identifier::WindowIdentifier};
pub use zbus;
