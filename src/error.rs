use std::time::Duration;

#[derive(Debug)]
/// The error type for portal-capture.
pub enum Error {
    /// The session bus could not be reached or the connection broke.
    Connection(zbus::Error),
    /// A message did not have the expected shape.
    Protocol(String),
    /// The portal answered the call with an error reply: name and message.
    RemoteCall(String, String),
    /// Nothing arrived before the deadline; carries the time spent waiting.
    Timeout(Duration),
    /// The temporary screenshot file could not be read.
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "Session bus connection error: {e}"),
            Self::Protocol(e) => write!(f, "Malformed portal message: {e}"),
            Self::RemoteCall(name, message) if message.is_empty() => {
                write!(f, "Portal call failed: {name}")
            }
            Self::RemoteCall(name, message) => write!(f, "Portal call failed: {name}: {message}"),
            Self::Timeout(elapsed) => write!(
                f,
                "Portal did not answer in time ({:.1}s elapsed)",
                elapsed.as_secs_f64()
            ),
            Self::Io(e) => write!(f, "Screenshot file error: {e}"),
        }
    }
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<zbus::Error> for Error {
    fn from(e: zbus::Error) -> Self {
        Self::Connection(e)
    }
}

impl From<zbus::zvariant::Error> for Error {
    fn from(e: zbus::zvariant::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Error;

    #[test]
    fn display() {
        let err = Error::RemoteCall(
            "org.freedesktop.DBus.Error.AccessDenied".to_owned(),
            "Not allowed".to_owned(),
        );
        assert_eq!(
            err.to_string(),
            "Portal call failed: org.freedesktop.DBus.Error.AccessDenied: Not allowed"
        );

        let err = Error::RemoteCall("org.example.Error".to_owned(), String::new());
        assert_eq!(err.to_string(), "Portal call failed: org.example.Error");

        let err = Error::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Portal did not answer in time (1.5s elapsed)");
    }
}
