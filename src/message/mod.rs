//! An owned, transport independent view of a bus message.
//!
//! Outbound messages are composed with a [`MessageBuilder`] and its
//! [`Container`] guards, inbound ones are inspected with an [`ArgReader`].
//! The [`bus`](crate::bus) transports translate between this model and the
//! wire.
use std::fmt;

use crate::{Error, Result};

mod builder;
mod reader;

pub use self::{
    builder::{Container, MessageBuilder},
    reader::ArgReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The kind of a bus message.
pub enum MessageType {
    /// A method call.
    MethodCall,
    /// A successful reply to a method call.
    MethodReturn,
    /// An error reply to a method call.
    Error,
    /// A broadcast or unicast notification.
    Signal,
}

#[derive(Debug, Clone, PartialEq)]
/// A single typed argument of a message body.
///
/// A `a{sv}` vardict is an [`Arg::Array`] with the element signature `{sv}`
/// whose items are [`Arg::DictEntry`] values.
pub enum Arg {
    /// `b`
    Bool(bool),
    /// `u`
    U32(u32),
    /// `s`
    Str(String),
    /// `o`
    ObjectPath(String),
    /// `v`
    Variant(Box<Arg>),
    /// `a` followed by the element signature.
    Array {
        /// Signature shared by every item.
        element: String,
        /// The items, in wire order.
        items: Vec<Arg>,
    },
    /// `{` key value `}`, only valid as an array item.
    DictEntry(Box<[Arg; 2]>),
    /// A value of a type this crate does not model, kept with its signature.
    Unsupported(String),
}

impl Arg {
    /// The D-Bus signature of this value.
    pub fn signature(&self) -> String {
        match self {
            Self::Bool(_) => "b".to_owned(),
            Self::U32(_) => "u".to_owned(),
            Self::Str(_) => "s".to_owned(),
            Self::ObjectPath(_) => "o".to_owned(),
            Self::Variant(_) => "v".to_owned(),
            Self::Array { element, .. } => format!("a{element}"),
            Self::DictEntry(entry) => {
                format!("{{{}{}}}", entry[0].signature(), entry[1].signature())
            }
            Self::Unsupported(signature) => signature.clone(),
        }
    }

    /// Whether the value is of a basic type, i.e. usable as a dict key.
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::U32(_) | Self::Str(_) | Self::ObjectPath(_)
        )
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::U32(_) => "uint32",
            Self::Str(_) => "string",
            Self::ObjectPath(_) => "object path",
            Self::Variant(_) => "variant",
            Self::Array { .. } => "array",
            Self::DictEntry(_) => "dict entry",
            Self::Unsupported(_) => "unsupported value",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A method call, method return, error or signal.
pub struct Message {
    pub(crate) message_type: MessageType,
    pub(crate) destination: Option<String>,
    pub(crate) path: Option<String>,
    pub(crate) interface: Option<String>,
    pub(crate) member: Option<String>,
    pub(crate) error_name: Option<String>,
    pub(crate) reply_serial: Option<u32>,
    pub(crate) body: Vec<Arg>,
    /// Why the inbound body could not be decoded, leaving `body` empty.
    pub(crate) body_error: Option<String>,
}

impl Message {
    /// Creates an empty message of the given type.
    ///
    /// Outbound method calls should go through [`MessageBuilder`] instead.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            destination: None,
            path: None,
            interface: None,
            member: None,
            error_name: None,
            reply_serial: None,
            body: Vec::new(),
            body_error: None,
        }
    }

    /// A signal emitted by `path` on `interface`.
    pub fn signal(path: &str, interface: &str, member: &str, body: Vec<Arg>) -> Self {
        Self {
            path: Some(path.to_owned()),
            interface: Some(interface.to_owned()),
            member: Some(member.to_owned()),
            body,
            ..Self::new(MessageType::Signal)
        }
    }

    /// A successful reply to the call with the serial `reply_serial`.
    pub fn method_return(reply_serial: Option<u32>, body: Vec<Arg>) -> Self {
        Self {
            reply_serial,
            body,
            ..Self::new(MessageType::MethodReturn)
        }
    }

    /// An error reply named `error_name` carrying a human readable `message`.
    pub fn error(reply_serial: Option<u32>, error_name: &str, message: &str) -> Self {
        Self {
            reply_serial,
            error_name: Some(error_name.to_owned()),
            body: vec![Arg::Str(message.to_owned())],
            ..Self::new(MessageType::Error)
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn error_name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }

    pub fn reply_serial(&self) -> Option<u32> {
        self.reply_serial
    }

    /// The positional arguments.
    pub fn body(&self) -> &[Arg] {
        &self.body
    }

    /// The signature of the whole body, without the enclosing parentheses.
    pub fn signature(&self) -> String {
        self.body.iter().map(Arg::signature).collect()
    }

    /// A cursor over the positional arguments.
    pub fn reader(&self) -> ArgReader<'_> {
        ArgReader::new(&self.body)
    }

    /// Like [`Message::reader`], but fails if the body arrived undecodable.
    pub fn checked_reader(&self) -> Result<ArgReader<'_>> {
        match &self.body_error {
            Some(e) => Err(Error::protocol(format!(
                "undecodable {:?} body: {e}",
                self.message_type
            ))),
            None => Ok(self.reader()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}.{} on {} ({})",
            self.message_type,
            self.interface().unwrap_or("-"),
            self.member().unwrap_or("-"),
            self.path().unwrap_or("-"),
            self.signature()
        )
    }
}
