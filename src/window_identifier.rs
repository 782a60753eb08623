use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
/// Most portals interact with the user by showing dialogs.
/// These dialogs should generally be placed on top of the application window
/// that triggered them. To arrange this, the compositor needs to know about
/// the application window, which is what the `parent_window` argument of a
/// portal call is for.
///
/// Under X11 it has the form `x11:XID`, with the XID of the window in
/// hexadecimal. Under Wayland it has the form `wayland:HANDLE`, where HANDLE
/// is a surface handle exported through the xdg_foreign protocol.
///
/// For other windowing systems, or if you don't have a suitable handle, just
/// use the `Default` implementation.
pub struct WindowIdentifier(String);

impl WindowIdentifier {
    /// The identifier of an X11 window.
    pub fn from_xid(xid: u64) -> Self {
        Self(format!("x11:{xid:x}"))
    }

    /// The identifier of a Wayland surface exported with xdg_foreign.
    pub fn from_wayland_handle(handle: &str) -> Self {
        Self(format!("wayland:{handle}"))
    }
}

impl fmt::Display for WindowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::WindowIdentifier;

    #[test]
    fn parent_window() {
        assert_eq!(WindowIdentifier::default().to_string(), "");
        assert_eq!(WindowIdentifier::from_xid(0x1c00003).to_string(), "x11:1c00003");
        assert_eq!(
            WindowIdentifier::from_wayland_handle("3c7a1b").to_string(),
            "wayland:3c7a1b"
        );
    }
}
