//! The connection to the message bus.
//!
//! [`Bus`] opens one [`Transport`] per capture; dropping the transport closes
//! the connection. [`SessionBus`] is the real session bus, reached through
//! zbus.
use std::{fmt, ops::Deref, time::Duration};

use crate::{
    message::{Message, MessageType},
    Result,
};

#[cfg(test)]
pub(crate) mod fake;
mod session;

pub use self::session::{SessionBus, ZbusConnection};

/// Something that can open a connection to a message bus.
pub trait Bus {
    type Connection: Transport;

    /// Connects to the bus.
    ///
    /// Fails with [`Error::Connection`](crate::Error::Connection) if the bus
    /// can't be reached.
    fn open(&self) -> Result<Self::Connection>;
}

/// One open bus connection.
///
/// The connection is closed when the value is dropped.
pub trait Transport {
    /// A received message. Dropping it releases it.
    type Incoming: Deref<Target = Message>;

    /// Sends a method call and blocks until its reply arrives.
    ///
    /// Returns `Ok(None)` if no reply arrived within `timeout`. Error
    /// replies are returned like any other reply. Other messages received
    /// in the meantime are queued for [`Transport::pop`].
    fn call(&mut self, message: &Message, timeout: Duration) -> Result<Option<Self::Incoming>>;

    /// Asks the bus to route the messages matching `rule` to this
    /// connection.
    fn add_match(&mut self, rule: &MatchRule) -> Result<()>;

    /// Blocks for at most `slice`, queueing whatever arrives meanwhile.
    fn pump(&mut self, slice: Duration) -> Result<()>;

    /// Takes the oldest queued message, if any.
    fn pop(&mut self) -> Option<Self::Incoming>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A rule selecting the signals emitted on `interface.member` by the object
/// at `path`.
pub struct MatchRule {
    interface: String,
    member: String,
    path: String,
}

impl MatchRule {
    pub fn signal(interface: &str, member: &str, path: &str) -> Self {
        Self {
            interface: interface.to_owned(),
            member: member.to_owned(),
            path: path.to_owned(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether `message` is a signal selected by this rule.
    pub fn matches(&self, message: &Message) -> bool {
        message.message_type() == MessageType::Signal
            && message.interface() == Some(self.interface.as_str())
            && message.member() == Some(self.member.as_str())
            && message.path() == Some(self.path.as_str())
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type='signal',interface='{}',member='{}',path='{}'",
            self.interface, self.member, self.path
        )
    }
}
