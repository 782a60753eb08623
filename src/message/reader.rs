use super::Arg;
use crate::{Error, Result};

/// A cursor over a sequence of arguments.
///
/// [`ArgReader::recurse`] descends into an array, a dict entry or a variant.
/// The child reader borrows its parent, which can only move on once the
/// child is gone.
#[derive(Debug, Clone)]
pub struct ArgReader<'m> {
    args: &'m [Arg],
    position: usize,
}

impl<'m> ArgReader<'m> {
    pub fn new(args: &'m [Arg]) -> Self {
        Self { args, position: 0 }
    }

    /// The argument under the cursor, without advancing.
    pub fn peek(&self) -> Option<&'m Arg> {
        self.args.get(self.position)
    }

    /// Whether every argument has been consumed.
    pub fn is_empty(&self) -> bool {
        self.position >= self.args.len()
    }

    /// Returns the argument under the cursor and advances past it.
    pub fn next_arg(&mut self) -> Result<&'m Arg> {
        let arg = self.args.get(self.position).ok_or_else(|| {
            Error::protocol(format!("missing argument at position {}", self.position))
        })?;
        self.position += 1;
        Ok(arg)
    }

    fn mismatch(&self, expected: &str, found: &Arg) -> Error {
        Error::protocol(format!(
            "expected {expected} at position {}, found {}",
            self.position.saturating_sub(1),
            found.type_name()
        ))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        match self.next_arg()? {
            Arg::U32(value) => Ok(*value),
            other => Err(self.mismatch("uint32", other)),
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.next_arg()? {
            Arg::Bool(value) => Ok(*value),
            other => Err(self.mismatch("boolean", other)),
        }
    }

    pub fn read_str(&mut self) -> Result<&'m str> {
        match self.next_arg()? {
            Arg::Str(value) => Ok(value),
            other => Err(self.mismatch("string", other)),
        }
    }

    pub fn read_object_path(&mut self) -> Result<&'m str> {
        match self.next_arg()? {
            Arg::ObjectPath(value) => Ok(value),
            other => Err(self.mismatch("object path", other)),
        }
    }

    /// Descends into the container under the cursor and advances past it.
    ///
    /// An array yields its items, a dict entry its key then its value and a
    /// variant its single value.
    pub fn recurse(&mut self) -> Result<ArgReader<'_>> {
        let args: &'m [Arg] = match self.next_arg()? {
            Arg::Array { items, .. } => items,
            Arg::DictEntry(entry) => &entry[..],
            Arg::Variant(value) => std::slice::from_ref(&**value),
            other => return Err(self.mismatch("container", other)),
        };
        Ok(ArgReader::new(args))
    }
}
