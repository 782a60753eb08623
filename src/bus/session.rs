use std::{
    collections::{HashMap, VecDeque},
    fmt,
    num::NonZeroU32,
    ops::Deref,
    time::Duration,
};

use futures_util::StreamExt;
use serde::{
    de::{self, Error as _, Visitor},
    Deserialize, Deserializer,
};
use zbus::{
    fdo::DBusProxy,
    message::Type,
    zvariant::{
        self, Array, Dict, ObjectPath, OwnedValue, Signature, Structure, StructureBuilder, Value,
    },
    MessageStream,
};

use super::{Bus, MatchRule, Transport};
use crate::{
    message::{Arg, Message, MessageType},
    Error, Result,
};

#[derive(Debug, Default, Clone, Copy)]
/// The user's session bus.
pub struct SessionBus;

impl Bus for SessionBus {
    type Connection = ZbusConnection;

    fn open(&self) -> Result<ZbusConnection> {
        ZbusConnection::session()
    }
}

/// A blocking connection to the session bus.
///
/// zbus is asynchronous; every operation is driven to completion on a
/// current-thread tokio runtime owned by the connection, so nothing runs
/// outside of a call. This must not be used from within another tokio
/// runtime.
pub struct ZbusConnection {
    // Dropped in declaration order, the runtime last.
    stream: MessageStream,
    connection: zbus::Connection,
    queue: VecDeque<Received>,
    runtime: tokio::runtime::Runtime,
}

impl ZbusConnection {
    /// Connects to the session bus.
    pub fn session() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Connection(e.into()))?;
        let (connection, stream) = runtime.block_on(async {
            let connection = zbus::Connection::session().await?;
            // Created before anything is sent so no reply or signal is missed.
            let stream = MessageStream::from(&connection);
            Ok::<_, zbus::Error>((connection, stream))
        })?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Connected to the session bus as {:?}",
            connection.unique_name().map(|name| name.as_str())
        );

        Ok(Self {
            stream,
            connection,
            queue: VecDeque::new(),
            runtime,
        })
    }

    /// The underlying zbus connection.
    pub fn inner(&self) -> &zbus::Connection {
        &self.connection
    }
}

impl fmt::Debug for ZbusConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZbusConnection")
            .field("unique_name", &self.connection.unique_name())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Transport for ZbusConnection {
    type Incoming = Received;

    fn call(&mut self, message: &Message, timeout: Duration) -> Result<Option<Received>> {
        let outbound = encode_message(message)?;
        let serial = outbound.primary_header().serial_num();
        let Self {
            stream,
            connection,
            queue,
            runtime,
        } = self;

        runtime.block_on(async {
            connection.send(&outbound).await?;
            let reply = tokio::time::timeout(timeout, async {
                loop {
                    let inbound = stream.next().await.ok_or_else(closed)??;
                    if inbound.header().reply_serial() == Some(serial) {
                        return Ok::<_, Error>(Received::new(inbound));
                    }
                    queue.push_back(Received::new(inbound));
                }
            })
            .await;
            match reply {
                Ok(reply) => reply.map(Some),
                Err(_elapsed) => Ok(None),
            }
        })
    }

    fn add_match(&mut self, rule: &MatchRule) -> Result<()> {
        let Self {
            connection,
            runtime,
            ..
        } = self;

        runtime.block_on(async {
            let rule = zbus::MatchRule::builder()
                .msg_type(Type::Signal)
                .interface(rule.interface())?
                .member(rule.member())?
                .path(rule.path())?
                .build();
            DBusProxy::new(connection)
                .await?
                .add_match_rule(rule)
                .await
                .map_err(zbus::Error::from)?;
            Ok(())
        })
    }

    fn pump(&mut self, slice: Duration) -> Result<()> {
        let Self {
            stream,
            queue,
            runtime,
            ..
        } = self;

        runtime.block_on(async {
            match tokio::time::timeout(slice, stream.next()).await {
                Err(_elapsed) => Ok(()),
                Ok(Some(inbound)) => {
                    queue.push_back(Received::new(inbound?));
                    Ok(())
                }
                Ok(None) => Err(closed()),
            }
        })
    }

    fn pop(&mut self) -> Option<Received> {
        self.queue.pop_front()
    }
}

fn closed() -> Error {
    Error::Connection(zbus::Error::Failure(
        "the bus closed the connection".to_owned(),
    ))
}

/// A message read from the bus, along with its decoded view.
pub struct Received {
    raw: zbus::Message,
    message: Message,
}

impl Received {
    fn new(raw: zbus::Message) -> Self {
        let message = decode_message(&raw);
        Self { raw, message }
    }

    /// The message as received from zbus.
    pub fn raw(&self) -> &zbus::Message {
        &self.raw
    }
}

impl Deref for Received {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl fmt::Debug for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Received").field(&self.message).finish()
    }
}

fn malformed(e: impl fmt::Display) -> Error {
    Error::protocol(e.to_string())
}

pub(crate) fn encode_message(message: &Message) -> Result<zbus::Message> {
    let (Some(path), Some(member)) = (message.path(), message.member()) else {
        return Err(Error::protocol("a method call needs a path and a member"));
    };
    let mut builder = zbus::Message::method(path, member).map_err(malformed)?;
    if let Some(destination) = message.destination() {
        builder = builder.destination(destination).map_err(malformed)?;
    }
    if let Some(interface) = message.interface() {
        builder = builder.interface(interface).map_err(malformed)?;
    }

    if message.body().is_empty() {
        return builder.build(&()).map_err(malformed);
    }
    let fields = message
        .body()
        .iter()
        .map(encode_value)
        .collect::<Result<Vec<_>>>()?;
    let body: Structure<'_> = fields
        .into_iter()
        .fold(StructureBuilder::new(), |structure, field| {
            structure.append_field(field)
        })
        .build();
    builder.build(&body).map_err(malformed)
}

fn encode_value(arg: &Arg) -> Result<Value<'_>> {
    let value = match arg {
        Arg::Bool(value) => Value::Bool(*value),
        Arg::U32(value) => Value::U32(*value),
        Arg::Str(value) => Value::from(value.as_str()),
        Arg::ObjectPath(path) => Value::ObjectPath(ObjectPath::try_from(path.as_str())?),
        Arg::Variant(value) => Value::Value(Box::new(encode_value(value)?)),
        Arg::Array { element, items } if element.starts_with('{') => {
            // Keys are basic types, hence a single character.
            let (key, value) = element
                .strip_prefix('{')
                .and_then(|entry| entry.strip_suffix('}'))
                .filter(|entry| entry.len() > 1)
                .map(|entry| entry.split_at(1))
                .ok_or_else(|| Error::protocol(format!("invalid dict entry signature {element}")))?;
            let mut dict = Dict::new(Signature::try_from(key)?, Signature::try_from(value)?);
            for item in items {
                let Arg::DictEntry(entry) = item else {
                    return Err(Error::protocol(format!(
                        "a dictionary can't hold a {}",
                        item.type_name()
                    )));
                };
                dict.append(encode_value(&entry[0])?, encode_value(&entry[1])?)?;
            }
            Value::Dict(dict)
        }
        Arg::Array { element, items } => {
            let mut array = Array::new(Signature::try_from(element.as_str())?);
            for item in items {
                array.append(encode_value(item)?)?;
            }
            Value::Array(array)
        }
        Arg::DictEntry(_) => {
            return Err(Error::protocol("a dict entry can only live in a dictionary"))
        }
        Arg::Unsupported(signature) => {
            return Err(Error::protocol(format!("can't send a value of type {signature}")))
        }
    };
    Ok(value)
}

pub(crate) fn decode_message(inbound: &zbus::Message) -> Message {
    let header = inbound.header();
    let message_type = match inbound.message_type() {
        Type::MethodCall => MessageType::MethodCall,
        Type::MethodReturn => MessageType::MethodReturn,
        Type::Error => MessageType::Error,
        Type::Signal => MessageType::Signal,
    };

    let (body, body_error) = match decode_body(inbound) {
        Ok(body) => (body, None),
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Failed to decode the body of {message_type:?}: {e}");
            (Vec::new(), Some(e.to_string()))
        }
    };
    Message {
        message_type,
        destination: header.destination().map(|name| name.to_string()),
        path: header.path().map(|path| path.to_string()),
        interface: header.interface().map(|name| name.to_string()),
        member: header.member().map(|name| name.to_string()),
        error_name: header.error_name().map(|name| name.to_string()),
        reply_serial: header.reply_serial().map(NonZeroU32::get),
        body,
        body_error,
    }
}

fn decode_body(inbound: &zbus::Message) -> zbus::Result<Vec<Arg>> {
    let body = inbound.body();
    let signature = body.signature().map(|signature| signature.to_string());
    match signature.as_deref().unwrap_or_default() {
        "" => Ok(Vec::new()),
        // Portal responses get their results in wire order.
        "ua{sv}" => Ok(body.deserialize::<ResponseBody>()?.into_args()),
        _ => {
            let structure = body.deserialize::<Structure<'_>>()?;
            Ok(structure.fields().iter().map(decode_value).collect())
        }
    }
}

/// The `ua{sv}` body of a `Response` signal.
struct ResponseBody {
    status: u32,
    results: Vec<(String, OwnedValue)>,
}

impl ResponseBody {
    fn into_args(self) -> Vec<Arg> {
        let items = self
            .results
            .into_iter()
            .map(|(key, value)| {
                let value = Arg::Variant(Box::new(decode_value(&value)));
                Arg::DictEntry(Box::new([Arg::Str(key), value]))
            })
            .collect();
        vec![
            Arg::U32(self.status),
            Arg::Array {
                element: "{sv}".to_owned(),
                items,
            },
        ]
    }
}

impl zvariant::Type for ResponseBody {
    fn signature() -> Signature<'static> {
        <(u32, HashMap<String, OwnedValue>) as zvariant::Type>::signature()
    }
}

impl<'de> Deserialize<'de> for ResponseBody {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ResponseVisitor;

        impl<'de> Visitor<'de> for ResponseVisitor {
            type Value = ResponseBody;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a response status followed by a vardict of results")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<ResponseBody, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let status = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::custom("expected the response status (u)"))?;
                let OrderedVardict(results) = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::custom("expected the results (a{sv})"))?;
                Ok(ResponseBody { status, results })
            }
        }

        deserializer.deserialize_tuple(2, ResponseVisitor)
    }
}

/// A `a{sv}` read entry by entry, keeping order and duplicate keys.
struct OrderedVardict(Vec<(String, OwnedValue)>);

impl<'de> Deserialize<'de> for OrderedVardict {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct VardictVisitor;

        impl<'de> Visitor<'de> for VardictVisitor {
            type Value = OrderedVardict;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a vardict (a{{sv}})")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<OrderedVardict, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some(entry) = map.next_entry::<String, OwnedValue>()? {
                    entries.push(entry);
                }
                Ok(OrderedVardict(entries))
            }
        }

        deserializer.deserialize_map(VardictVisitor)
    }
}

fn decode_value(value: &Value<'_>) -> Arg {
    match value {
        Value::Bool(value) => Arg::Bool(*value),
        Value::U32(value) => Arg::U32(*value),
        Value::Str(value) => Arg::Str(value.to_string()),
        Value::ObjectPath(path) => Arg::ObjectPath(path.to_string()),
        Value::Value(value) => Arg::Variant(Box::new(decode_value(value))),
        Value::Array(array) => Arg::Array {
            element: array.element_signature().to_string(),
            items: array.iter().map(decode_value).collect(),
        },
        Value::Dict(_) => decode_vardict(value),
        other => Arg::Unsupported(other.value_signature().to_string()),
    }
}

// Dictionaries nested in other bodies only come out of zvariant as maps, so
// their entries are sorted by key rather than kept in wire order. Depending on
// the conversion the values may already be unwrapped from their variant.
fn decode_vardict(value: &Value<'_>) -> Arg {
    let signature = value.value_signature().to_string();
    let entries = (signature == "a{sv}")
        .then(|| value.try_clone().ok())
        .flatten()
        .and_then(|value| HashMap::<String, OwnedValue>::try_from(value).ok());
    let Some(entries) = entries else {
        return Arg::Unsupported(signature);
    };

    let mut entries = entries.into_iter().collect::<Vec<_>>();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    Arg::Array {
        element: "{sv}".to_owned(),
        items: entries
            .into_iter()
            .map(|(key, value)| {
                let value = match decode_value(&value) {
                    variant @ Arg::Variant(_) => variant,
                    value => Arg::Variant(Box::new(value)),
                };
                Arg::DictEntry(Box::new([Arg::Str(key), value]))
            })
            .collect(),
    }
}
