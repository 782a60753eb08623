use std::time::{Duration, Instant};

use crate::{
    bus::Transport,
    message::{Arg, Message, MessageBuilder, MessageType},
    Error, Result,
};

pub(crate) const DESKTOP_DESTINATION: &str = "org.freedesktop.portal.Desktop";
pub(crate) const DESKTOP_PATH: &str = "/org/freedesktop/portal/desktop";

/// D-Bus' own default method call timeout.
pub(crate) const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(25);

/// One portal interface on the desktop object, reached over a borrowed
/// transport.
#[derive(Debug)]
pub(crate) struct Proxy<'a, T: Transport> {
    transport: &'a mut T,
    interface: &'static str,
    reply_timeout: Duration,
}

impl<'a, T: Transport> Proxy<'a, T> {
    pub fn new_desktop(transport: &'a mut T, interface: &'static str) -> Self {
        Self {
            transport,
            interface,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// How long [`Proxy::call`] waits for the reply.
    pub fn reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Starts a call to `method_name` on this interface.
    pub fn method_call(&self, method_name: &str) -> Result<MessageBuilder> {
        MessageBuilder::method_call(DESKTOP_DESTINATION, DESKTOP_PATH, self.interface, method_name)
    }

    /// Sends `message` and blocks until the portal replies.
    ///
    /// An error reply becomes [`Error::RemoteCall`] and a missing one
    /// [`Error::Timeout`].
    pub fn call(&mut self, message: &Message) -> Result<T::Incoming> {
        #[cfg(feature = "tracing")]
        {
            tracing::info!(
                "Calling method {}:{}",
                self.interface,
                message.member().unwrap_or_default()
            );
            tracing::debug!("With body {:?}", message.body());
        }
        let started = Instant::now();
        let reply = self
            .transport
            .call(message, self.reply_timeout)?
            .ok_or_else(|| Error::Timeout(started.elapsed()))?;

        match reply.message_type() {
            MessageType::MethodReturn => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Received reply {:?}", reply.body());
                Ok(reply)
            }
            MessageType::Error => {
                let name = reply
                    .error_name()
                    .unwrap_or("org.freedesktop.DBus.Error.Failed")
                    .to_owned();
                let description = match reply.body().first() {
                    Some(Arg::Str(description)) => description.clone(),
                    _ => String::new(),
                };
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "Method {}:{} failed with {name}",
                    self.interface,
                    message.member().unwrap_or_default()
                );
                Err(Error::RemoteCall(name, description))
            }
            other => Err(Error::protocol(format!(
                "expected a method return, received a {other:?}"
            ))),
        }
    }
}
