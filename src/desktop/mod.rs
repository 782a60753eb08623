/// Track a portal request through its `org.freedesktop.portal.Request` object.
pub mod request;
/// Interact with `org.freedesktop.portal.Screenshot` interface.
pub mod screenshot;
