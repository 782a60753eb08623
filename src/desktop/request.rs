//! The `org.freedesktop.portal.Request` side of a portal call.
//!
//! Portal methods answer right away with the object path of a request, then
//! report the outcome later through the `Response` signal emitted by that
//! object.
use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::{
    bus::{MatchRule, Transport},
    message::Message,
    Error, Result,
};

pub(crate) const INTERFACE: &str = "org.freedesktop.portal.Request";
pub(crate) const RESPONSE: &str = "Response";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// The object path of an in-flight portal request.
pub struct RequestHandle(String);

impl RequestHandle {
    /// Reads the handle out of the reply to a portal method call.
    pub fn extract(reply: &Message) -> Result<Self> {
        let path = reply.checked_reader()?.read_object_path().map_err(|e| {
            Error::protocol(format!("the reply carries no request handle: {e}"))
        })?;
        Ok(Self(path.to_owned()))
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// The rule selecting the `Response` signal of this request.
    pub fn response_rule(&self) -> MatchRule {
        MatchRule::signal(INTERFACE, RESPONSE, &self.0)
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The status code carried by a `Response` signal.
pub enum ResponseType {
    /// Success, the request is carried out.
    Success,
    /// The user cancelled the interaction.
    Cancelled,
    /// The user interaction was ended in some other way.
    Other,
}

impl From<u32> for ResponseType {
    fn from(status: u32) -> Self {
        match status {
            0 => Self::Success,
            1 => Self::Cancelled,
            _ => Self::Other,
        }
    }
}

/// Blocks until the `Response` signal of a request shows up.
///
/// Everything else reaching the connection in the meantime is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseWaiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for ResponseWaiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ResponseWaiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(100),
        }
    }

    /// The longest single blocking read on the connection.
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Waits for the response to `handle`.
    ///
    /// Fails with [`Error::Timeout`] once the timeout is over.
    pub fn wait<T: Transport>(
        &self,
        transport: &mut T,
        handle: &RequestHandle,
    ) -> Result<T::Incoming> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let rule = handle.response_rule();
        // The portal sends the response straight to us, so it usually gets
        // through without the rule.
        if let Err(_e) = transport.add_match(&rule) {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to add match rule {rule}, reading unfiltered traffic: {_e}");
        }
        #[cfg(feature = "tracing")]
        tracing::info!("Listening to signal '{RESPONSE}' on '{handle}'");

        loop {
            while let Some(message) = transport.pop() {
                if rule.matches(&message) {
                    #[cfg(feature = "tracing")]
                    tracing::info!("Received signal '{RESPONSE}' on '{handle}'");
                    return Ok(message);
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("Ignoring {}", *message);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout(started.elapsed()));
            }
            transport.pump(self.poll_interval.min(deadline - now))?;
        }
    }
}

/// Reads the outcome of a request out of its `Response` signal.
///
/// Returns the `uri` result on success and `None` when the request was
/// cancelled or carries no uri.
pub fn parse_response(signal: &Message) -> Result<Option<String>> {
    let mut reader = signal.checked_reader()?;
    let response_type = ResponseType::from(reader.read_u32()?);
    if response_type != ResponseType::Success {
        #[cfg(feature = "tracing")]
        tracing::info!("The request ended without a result: {response_type:?}");
        return Ok(None);
    }

    match reader.peek() {
        Some(results) if results.signature() == "a{sv}" => (),
        Some(other) => {
            return Err(Error::protocol(format!(
                "expected the results as a{{sv}}, found {}",
                other.signature()
            )))
        }
        None => return Err(Error::protocol("the response carries no results")),
    }
    let mut results = reader.recurse()?;
    while !results.is_empty() {
        let mut entry = results.recurse()?;
        if entry.read_str()? == "uri" {
            let uri = entry.recurse()?.read_str()?;
            #[cfg(feature = "tracing")]
            tracing::debug!("Received uri {uri}");
            return Ok(Some(uri.to_owned()));
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!("The response carries no uri");
    Ok(None)
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::{parse_response, RequestHandle, ResponseType, ResponseWaiter};
    use crate::{
        bus::{
            fake::{FakeBus, Scenario},
            Bus, Transport,
        },
        message::{Arg, Message, MessageType},
        Error,
    };

    const HANDLE: &str = "/org/freedesktop/portal/desktop/request/1_42/capture";

    fn vardict(results: Vec<(&str, Arg)>) -> Arg {
        Arg::Array {
            element: "{sv}".to_owned(),
            items: results
                .into_iter()
                .map(|(key, value)| {
                    Arg::DictEntry(Box::new([
                        Arg::Str(key.to_owned()),
                        Arg::Variant(Box::new(value)),
                    ]))
                })
                .collect(),
        }
    }

    fn response(path: &str, status: u32, results: Vec<(&str, Arg)>) -> Message {
        Message::signal(
            path,
            "org.freedesktop.portal.Request",
            "Response",
            vec![Arg::U32(status), vardict(results)],
        )
    }

    fn uri(uri: &str) -> Vec<(&'static str, Arg)> {
        vec![("uri", Arg::Str(uri.to_owned()))]
    }

    fn handle() -> RequestHandle {
        RequestHandle::extract(&Message::method_return(
            Some(1),
            vec![Arg::ObjectPath(HANDLE.to_owned())],
        ))
        .unwrap()
    }

    #[test]
    fn extract_handle() {
        assert_eq!(handle().path(), HANDLE);
        assert_eq!(handle().to_string(), HANDLE);

        let empty = Message::method_return(Some(1), vec![]);
        assert!(matches!(RequestHandle::extract(&empty), Err(Error::Protocol(_))));

        let string = Message::method_return(Some(1), vec![Arg::Str(HANDLE.to_owned())]);
        assert!(matches!(RequestHandle::extract(&string), Err(Error::Protocol(_))));
    }

    #[test]
    fn response_type() {
        assert_eq!(ResponseType::from(0), ResponseType::Success);
        assert_eq!(ResponseType::from(1), ResponseType::Cancelled);
        assert_eq!(ResponseType::from(2), ResponseType::Other);
        assert_eq!(ResponseType::from(u32::MAX), ResponseType::Other);
    }

    #[test]
    fn parse() {
        let signal = response(
            HANDLE,
            0,
            vec![
                ("color", Arg::U32(7)),
                ("uri", Arg::Str("file:///tmp/first.png".to_owned())),
                ("uri", Arg::Str("file:///tmp/second.png".to_owned())),
            ],
        );
        assert_eq!(
            parse_response(&signal).unwrap().as_deref(),
            Some("file:///tmp/first.png")
        );

        let cancelled = response(HANDLE, 1, uri("file:///tmp/a.png"));
        assert_eq!(parse_response(&cancelled).unwrap(), None);
        let other = response(HANDLE, 2, vec![]);
        assert_eq!(parse_response(&other).unwrap(), None);

        let empty = response(HANDLE, 0, vec![]);
        assert_eq!(parse_response(&empty).unwrap(), None);
        let uri_less = response(HANDLE, 0, vec![("modal", Arg::Bool(false))]);
        assert_eq!(parse_response(&uri_less).unwrap(), None);
    }

    #[test]
    fn parse_malformed() {
        let no_results = Message::signal(
            HANDLE,
            "org.freedesktop.portal.Request",
            "Response",
            vec![Arg::U32(0)],
        );
        assert!(matches!(parse_response(&no_results), Err(Error::Protocol(_))));

        let no_status = Message::signal(HANDLE, "org.freedesktop.portal.Request", "Response", vec![]);
        assert!(matches!(parse_response(&no_status), Err(Error::Protocol(_))));

        let numeric_uri = response(HANDLE, 0, vec![("uri", Arg::U32(3))]);
        assert!(matches!(parse_response(&numeric_uri), Err(Error::Protocol(_))));
    }

    #[test]
    fn undecodable_body() {
        let mut signal = response(HANDLE, 0, vec![]);
        signal.body.clear();
        signal.body_error = Some("invalid value: expected a variant".to_owned());
        match parse_response(&signal) {
            Err(Error::Protocol(e)) => assert!(e.contains("expected a variant"), "{e}"),
            other => panic!("unexpected result {other:?}"),
        }

        let mut reply = Message::method_return(Some(1), vec![]);
        reply.body_error = Some("unexpected end of body".to_owned());
        match RequestHandle::extract(&reply) {
            Err(Error::Protocol(e)) => assert!(e.contains("unexpected end of body"), "{e}"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn wait_drains_unrelated_traffic() {
        let bus = FakeBus::new(Scenario {
            early: vec![response(
                "/org/freedesktop/portal/desktop/request/1_42/other",
                0,
                vec![],
            )],
            signals: vec![
                Message::signal(HANDLE, "org.freedesktop.portal.Request", "Closed", vec![]),
                Message::signal(HANDLE, "org.freedesktop.portal.Session", "Response", vec![]),
                response(HANDLE, 0, uri("file:///tmp/a.png")),
                response(HANDLE, 0, uri("file:///tmp/b.png")),
            ],
            ..Default::default()
        });

        {
            let mut connection = bus.open().unwrap();
            let call = Message::new(MessageType::MethodCall);
            // Puts the early signal in the queue.
            assert!(connection.call(&call, Duration::ZERO).unwrap().is_none());

            let signal = ResponseWaiter::default()
                .poll_interval(Duration::from_millis(10))
                .wait(&mut connection, &handle())
                .unwrap();
            assert_eq!(
                parse_response(&signal).unwrap().as_deref(),
                Some("file:///tmp/a.png")
            );
            assert_eq!(bus.stats.delivered.get(), 4);
            assert_eq!(bus.stats.released.get(), 3);
        }

        assert_eq!(bus.stats.matches.borrow()[0], handle().response_rule());
        assert!(bus.stats.balanced());
    }

    #[test]
    fn wait_times_out() {
        let bus = FakeBus::new(Scenario {
            signals: vec![response("/org/freedesktop/portal/desktop/request/1_42/other", 0, vec![])],
            ..Default::default()
        });
        let mut connection = bus.open().unwrap();

        let started = Instant::now();
        let result = ResponseWaiter::new(Duration::from_millis(200))
            .poll_interval(Duration::from_millis(30))
            .wait(&mut connection, &handle());
        let elapsed = started.elapsed();

        match result {
            Err(Error::Timeout(waited)) => assert!(waited >= Duration::from_millis(200)),
            other => panic!("unexpected result {:?}", other.map(|m| (*m).clone())),
        }
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1000));
        assert_eq!(bus.stats.delivered.get(), bus.stats.released.get());
    }

    #[test]
    fn wait_without_match_rule() {
        let bus = FakeBus::new(Scenario {
            add_match_fails: true,
            signals: vec![response(HANDLE, 1, vec![])],
            ..Default::default()
        });
        let mut connection = bus.open().unwrap();

        let signal = ResponseWaiter::default()
            .wait(&mut connection, &handle())
            .unwrap();
        assert_eq!(parse_response(&signal).unwrap(), None);
        assert!(bus.stats.matches.borrow().is_empty());
    }
}
