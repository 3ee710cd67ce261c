use std::fmt;

use crate::channel::Destination;
use crate::codec::{Delimiter, SEPARATOR};
use crate::error::{Result, WireError};

/// Characters that may never appear in a record name or value.
///
/// Both delimiters are reserved regardless of which one a codec uses, so a
/// valid record encodes identically under either protocol revision.
pub const RESERVED: [char; 3] = [
    SEPARATOR,
    Delimiter::Semicolon.as_char(),
    Delimiter::Pipe.as_char(),
];

/// One `name:value` command or telemetry unit.
///
/// Immutable once built; construction rejects reserved characters instead of
/// truncating them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandRecord {
    name: String,
    value: String,
    destination: Destination,
}

impl CommandRecord {
    /// Build a record, validating name and value.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        destination: Destination,
    ) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(WireError::EmptyName);
        }
        check_reserved("name", &name)?;
        check_reserved("value", &value)?;
        Ok(Self {
            name,
            value,
            destination,
        })
    }

    /// A liveness ping bound for `destination`.
    pub fn ping(destination: Destination) -> Self {
        Self {
            name: crate::names::PING.to_string(),
            value: crate::names::PING.to_string(),
            destination,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// Encoded size without the trailing delimiter.
    pub fn wire_len(&self) -> usize {
        self.name.len() + 1 + self.value.len()
    }
}

impl fmt::Display for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.value)
    }
}

fn check_reserved(field: &'static str, text: &str) -> Result<()> {
    match text.chars().find(|ch| RESERVED.contains(ch)) {
        Some(ch) => Err(WireError::ReservedCharacter { field, ch }),
        None => Ok(()),
    }
}
