//! Named, dirty-tracked replicated properties and the per-entity state that
//! holds them.

use std::collections::HashMap;

use crate::error::WireError;
use crate::wire::{WireBuffer, WireCodec};

/// Writes the property count that prefixes every state block. A varint, so
/// no count is ever too large to decode.
pub fn write_property_count(buffer: &mut WireBuffer, count: usize) {
    buffer.write_varint(count as u64);
}

/// A single replicated field.
///
/// The value is kept in its encoded form so the flush path never has to
/// re-serialize; typed access goes through [`State::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    value: Vec<u8>,
    dirty: bool,
    version: u32,
}

impl Property {
    fn new(name: String, value: Vec<u8>) -> Self {
        Self {
            name,
            value,
            dirty: true,
            version: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Incremented on every change of value.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Replaces the value. Returns `false` and leaves the flag untouched when
    /// the new value equals the current one.
    fn replace(&mut self, value: &[u8]) -> bool {
        if self.value == value {
            return false;
        }
        self.value.clear();
        self.value.extend_from_slice(value);
        self.version = self.version.wrapping_add(1);
        self.dirty = true;
        true
    }

    fn write(&self, buffer: &mut WireBuffer) {
        buffer.write_string(&self.name);
        buffer.write_binary(&self.value);
    }
}

/// Ordered collection of properties belonging to one entity.
///
/// Properties serialize in the order they were first set, which keeps the
/// wire output stable across flushes.
#[derive(Debug, Clone, Default)]
pub struct State {
    properties: Vec<Property>,
    index: HashMap<String, usize>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property from already-encoded bytes. A new property starts dirty.
    /// Returns whether anything changed.
    pub fn set_bytes(&mut self, name: &str, value: &[u8]) -> bool {
        match self.index.get(name) {
            Some(&slot) => self.properties[slot].replace(value),
            None => {
                self.index.insert(name.to_string(), self.properties.len());
                self.properties
                    .push(Property::new(name.to_string(), value.to_vec()));
                true
            }
        }
    }

    /// Encodes `value` and stores it under `name`.
    pub fn set<V: WireCodec>(&mut self, name: &str, value: &V) -> bool {
        self.set_bytes(name, &value.to_bytes())
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.property(name).map(Property::value)
    }

    /// Decodes the property stored under `name`, if any.
    pub fn get<V: WireCodec>(&self, name: &str) -> Option<Result<V, WireError>> {
        self.get_bytes(name).map(V::from_bytes)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.index.get(name).map(|&slot| &self.properties[slot])
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.properties.iter().any(Property::is_dirty)
    }

    /// Serializes every property and clears all dirty flags.
    pub fn write(&mut self, buffer: &mut WireBuffer) {
        self.snapshot(buffer);
        for property in &mut self.properties {
            property.dirty = false;
        }
    }

    /// Serializes only dirty properties and clears their flags.
    pub fn write_diff(&mut self, buffer: &mut WireBuffer) {
        let dirty = self.properties.iter().filter(|p| p.dirty).count();
        write_property_count(buffer, dirty);
        for property in self.properties.iter_mut().filter(|p| p.dirty) {
            property.write(buffer);
            property.dirty = false;
        }
    }

    /// Serializes every property without touching dirty flags.
    pub fn snapshot(&self, buffer: &mut WireBuffer) {
        write_property_count(buffer, self.properties.len());
        for property in &self.properties {
            property.write(buffer);
        }
    }
}

/// Reads a state block produced by any of the [`State`] writers.
pub fn read_properties(buffer: &mut WireBuffer) -> Result<Vec<(String, Vec<u8>)>, WireError> {
    let count = buffer.read_varint()? as usize;
    let mut properties = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let name = buffer.read_string()?;
        let value = buffer.read_binary()?;
        properties.push((name, value));
    }
    Ok(properties)
}
