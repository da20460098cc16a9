//! # Type Graph Walker
//!
//! Collects every message and enum type reachable from a set of root messages through field
//! references. Schemas are allowed to be cyclic (a message may reference itself, or two
//! messages may reference each other); every type is expanded exactly once.
//!
//! The walk is depth-first and pre-order: when a field references a new message, that message
//! is appended and its whole subtree is explored before the next field of the parent. The
//! resulting order is part of the output contract, which is why [`TypeGraph`] keeps insertion
//! order instead of using a plain set.
//!
//! Synthetic map entry messages (`Item.TagsEntry` for `map<string, Tag> tags`) are deliberately
//! left out of the graph, unlike other referenced messages. The renderer already prints them
//! inline as `map<K, V>`, so only their key and value types are walked and listed.
use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};
use std::collections::HashSet;

/// A message or enum found while walking a type graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl TypeDescriptor {
    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            TypeDescriptor::Message(m) => m.full_name(),
            TypeDescriptor::Enum(e) => e.full_name(),
        }
    }

    /// Returns the name of the file that declares the inner descriptor.
    pub fn file_name(&self) -> &str {
        match self {
            TypeDescriptor::Message(m) => m.parent_file_descriptor_proto().name(),
            TypeDescriptor::Enum(e) => e.parent_file_descriptor_proto().name(),
        }
    }
}

/// Ordered set of the types referenced from one or more root messages.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    entries: Vec<TypeDescriptor>,
    visited: HashSet<String>,
}

impl TypeGraph {
    /// Walks the fields of every root, in order.
    ///
    /// Roots themselves are not recorded up front: a root shows up in the graph only if some
    /// field reachable from the roots references it.
    pub fn walk<I>(roots: I) -> Self
    where
        I: IntoIterator<Item = MessageDescriptor>,
    {
        let mut graph = Self::default();

        for root in roots {
            graph.walk_message(&root);
        }

        graph
    }

    /// The collected types, in first-discovery order.
    pub fn entries(&self) -> &[TypeDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a type with this fully qualified name has been collected.
    pub fn contains(&self, full_name: &str) -> bool {
        self.visited.contains(full_name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeDescriptor> {
        self.entries.iter()
    }

    fn walk_message(&mut self, message: &MessageDescriptor) {
        for field in message.fields() {
            self.walk_field(&field);
        }
    }

    fn walk_field(&mut self, field: &FieldDescriptor) {
        match field.kind() {
            // Map entries are synthetic: walk the key and value as if they were declared on the
            // parent, but never list the entry type itself.
            Kind::Message(entry) if entry.is_map_entry() => {
                self.walk_field(&entry.map_entry_key_field());
                self.walk_field(&entry.map_entry_value_field());
            }
            Kind::Message(message) => {
                if self.insert(TypeDescriptor::Message(message.clone())) {
                    self.walk_message(&message);
                }
            }
            // Enums are lists of constants, so there is nothing to descend into.
            Kind::Enum(enum_desc) => {
                self.insert(TypeDescriptor::Enum(enum_desc));
            }
            _ => {}
        }
    }

    fn insert(&mut self, descriptor: TypeDescriptor) -> bool {
        if !self.visited.insert(descriptor.full_name().to_string()) {
            return false;
        }

        self.entries.push(descriptor);
        true
    }
}

impl IntoIterator for TypeGraph {
    type Item = TypeDescriptor;
    type IntoIter = std::vec::IntoIter<TypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a TypeGraph {
    type Item = &'a TypeDescriptor;
    type IntoIter = std::slice::Iter<'a, TypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
