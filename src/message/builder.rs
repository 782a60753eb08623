use std::cell::Cell;

use zbus::{
    names::{BusName, InterfaceName, MemberName},
    zvariant::{ObjectPath, Signature},
};

use super::{Arg, Message, MessageType};
use crate::{Error, Result};

/// Composes an outbound method call.
///
/// Arguments are appended through the [`Container`] returned by
/// [`MessageBuilder::body`]. Nested containers borrow their parent, so they
/// are necessarily closed in LIFO order; a container dropped without being
/// closed makes [`MessageBuilder::build`] fail.
///
/// ```
/// use portal_capture::message::MessageBuilder;
///
/// # fn main() -> portal_capture::Result<()> {
/// let mut builder = MessageBuilder::method_call(
///     "org.freedesktop.portal.Desktop",
///     "/org/freedesktop/portal/desktop",
///     "org.freedesktop.portal.Screenshot",
///     "Screenshot",
/// )?;
/// let mut body = builder.body();
/// body.append_str("");
/// let mut options = body.open_dict("s", "v")?;
/// let mut entry = options.open_dict_entry()?;
/// entry.append_str("interactive");
/// let mut value = entry.open_variant();
/// value.append_bool(true);
/// value.close()?;
/// entry.close()?;
/// options.close()?;
/// body.close()?;
///
/// let message = builder.build()?;
/// assert_eq!(message.signature(), "sa{sv}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MessageBuilder {
    message: Message,
    unclosed: Cell<usize>,
}

impl MessageBuilder {
    /// Starts a method call addressed to `member` of `interface` on the
    /// object `path` owned by `destination`.
    pub fn method_call(destination: &str, path: &str, interface: &str, member: &str) -> Result<Self> {
        BusName::try_from(destination)
            .map_err(|e| Error::protocol(format!("invalid destination {destination:?}: {e}")))?;
        ObjectPath::try_from(path)
            .map_err(|e| Error::protocol(format!("invalid object path {path:?}: {e}")))?;
        InterfaceName::try_from(interface)
            .map_err(|e| Error::protocol(format!("invalid interface {interface:?}: {e}")))?;
        MemberName::try_from(member)
            .map_err(|e| Error::protocol(format!("invalid member {member:?}: {e}")))?;

        Ok(Self {
            message: Message {
                destination: Some(destination.to_owned()),
                path: Some(path.to_owned()),
                interface: Some(interface.to_owned()),
                member: Some(member.to_owned()),
                ..Message::new(MessageType::MethodCall)
            },
            unclosed: Cell::new(0),
        })
    }

    /// Opens the top level argument list.
    pub fn body(&mut self) -> Container<'_> {
        Container::new(&mut self.message.body, &self.unclosed, Kind::Body)
    }

    /// Finishes the message.
    ///
    /// Fails if any container was dropped without a successful
    /// [`Container::close`].
    pub fn build(self) -> Result<Message> {
        match self.unclosed.get() {
            0 => Ok(self.message),
            n => Err(Error::protocol(format!(
                "{n} container(s) of {} were left unclosed",
                self.message.member().unwrap_or_default()
            ))),
        }
    }
}

#[derive(Debug)]
enum Kind {
    Body,
    Array(String),
    DictEntry,
    Variant,
}

/// One level of argument nesting: the message body, an array, a dict entry
/// or a variant.
///
/// Values appended to a container only reach its parent once
/// [`Container::close`] succeeds.
#[derive(Debug)]
#[must_use = "a container only commits its values when closed"]
pub struct Container<'p> {
    parent: &'p mut Vec<Arg>,
    unclosed: &'p Cell<usize>,
    kind: Kind,
    items: Vec<Arg>,
    closed: bool,
}

impl<'p> Container<'p> {
    fn new(parent: &'p mut Vec<Arg>, unclosed: &'p Cell<usize>, kind: Kind) -> Self {
        Self {
            parent,
            unclosed,
            kind,
            items: Vec::new(),
            closed: false,
        }
    }

    fn open(&mut self, kind: Kind) -> Container<'_> {
        Container::new(&mut self.items, self.unclosed, kind)
    }

    /// Appends an already composed value.
    pub fn append(&mut self, arg: Arg) {
        self.items.push(arg);
    }

    pub fn append_str(&mut self, value: &str) {
        self.append(Arg::Str(value.to_owned()));
    }

    pub fn append_bool(&mut self, value: bool) {
        self.append(Arg::Bool(value));
    }

    pub fn append_u32(&mut self, value: u32) {
        self.append(Arg::U32(value));
    }

    pub fn append_object_path(&mut self, path: &str) -> Result<()> {
        ObjectPath::try_from(path)
            .map_err(|e| Error::protocol(format!("invalid object path {path:?}: {e}")))?;
        self.append(Arg::ObjectPath(path.to_owned()));
        Ok(())
    }

    /// Opens an array whose items all have the signature `element`.
    pub fn open_array(&mut self, element: &str) -> Result<Container<'_>> {
        let signature = format!("a{element}");
        Signature::try_from(signature.as_str())
            .map_err(|e| Error::protocol(format!("invalid array signature {signature:?}: {e}")))?;
        Ok(self.open(Kind::Array(element.to_owned())))
    }

    /// Opens a `a{key value}` dictionary, to be filled with
    /// [`Container::open_dict_entry`].
    pub fn open_dict(&mut self, key: &str, value: &str) -> Result<Container<'_>> {
        self.open_array(&format!("{{{key}{value}}}"))
    }

    /// Opens one entry of the dictionary this container represents.
    pub fn open_dict_entry(&mut self) -> Result<Container<'_>> {
        if !matches!(&self.kind, Kind::Array(element) if element.starts_with('{')) {
            return Err(Error::protocol(format!(
                "a dict entry can only be opened inside a dictionary, not in {:?}",
                self.kind
            )));
        }
        Ok(self.open(Kind::DictEntry))
    }

    /// Opens a variant, which must hold exactly one value when closed.
    pub fn open_variant(&mut self) -> Container<'_> {
        self.open(Kind::Variant)
    }

    /// Validates the container and hands its value over to the parent.
    pub fn close(mut self) -> Result<()> {
        let mut items = std::mem::take(&mut self.items);
        match &mut self.kind {
            Kind::Body => self.parent.append(&mut items),
            Kind::Array(element) => {
                if let Some(item) = items.iter().find(|item| item.signature() != *element) {
                    return Err(Error::protocol(format!(
                        "array of {element} can't hold a value of type {}",
                        item.signature()
                    )));
                }
                self.parent.push(Arg::Array {
                    element: std::mem::take(element),
                    items,
                });
            }
            Kind::DictEntry => {
                let (Some(value), Some(key), None) = (items.pop(), items.pop(), items.pop()) else {
                    return Err(Error::protocol("a dict entry holds exactly a key and a value"));
                };
                if !key.is_basic() {
                    return Err(Error::protocol(format!(
                        "a dict entry key must be a basic type, found {}",
                        key.type_name()
                    )));
                }
                self.parent.push(Arg::DictEntry(Box::new([key, value])));
            }
            Kind::Variant => {
                let (Some(value), None) = (items.pop(), items.pop()) else {
                    return Err(Error::protocol("a variant holds exactly one value"));
                };
                if let Arg::DictEntry(_) = value {
                    return Err(Error::protocol("a dict entry can only live in a dictionary"));
                }
                self.parent.push(Arg::Variant(Box::new(value)));
            }
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for Container<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.unclosed.set(self.unclosed.get() + 1);
        }
    }
}
