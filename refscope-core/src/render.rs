//! # Canonical Rendering
//!
//! Renders descriptors as proto-like source text that only depends on the schema, never on how
//! the original `.proto` file was written:
//!
//! * elements are sorted (methods by name, fields and enum values by number, nested
//!   declarations by name);
//! * every type reference is fully qualified with a leading dot (`.my.package.Message`), so the
//!   text does not rely on the imports or package of the file it came from.
//!
//! [`Canonical`] wraps any supported descriptor and implements `Display`.
use crate::walker::TypeDescriptor;
use prost_reflect::{
    Cardinality, EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor,
    ServiceDescriptor,
};
use std::fmt::{self, Write};

const INDENT: &str = "  ";

/// Canonical text form of a descriptor.
pub struct Canonical<'a, T>(pub &'a T);

impl fmt::Display for Canonical<'_, ServiceDescriptor> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_service(f, self.0)
    }
}

impl fmt::Display for Canonical<'_, MethodDescriptor> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_method(f, self.0)
    }
}

impl fmt::Display for Canonical<'_, MessageDescriptor> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_message(f, self.0, 0)
    }
}

impl fmt::Display for Canonical<'_, EnumDescriptor> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_enum(f, self.0, 0)
    }
}

impl fmt::Display for Canonical<'_, TypeDescriptor> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TypeDescriptor::Message(m) => write_message(f, m, 0),
            TypeDescriptor::Enum(e) => write_enum(f, e, 0),
        }
    }
}

/// Renders `value` into a fresh string, surfacing formatting failures instead of panicking.
pub fn render<T>(value: &T) -> Result<String, fmt::Error>
where
    for<'a> Canonical<'a, T>: fmt::Display,
{
    let mut out = String::new();
    write!(out, "{}", Canonical(value))?;
    Ok(out)
}

fn write_service<W: Write>(out: &mut W, service: &ServiceDescriptor) -> fmt::Result {
    let mut methods: Vec<_> = service.methods().collect();
    methods.sort_by(|a, b| a.name().cmp(b.name()));

    writeln!(out, "service {} {{", service.name())?;
    for method in &methods {
        out.write_str(INDENT)?;
        write_method(out, method)?;
        out.write_char('\n')?;
    }
    out.write_char('}')
}

fn write_method<W: Write>(out: &mut W, method: &MethodDescriptor) -> fmt::Result {
    let stream = |streaming: bool| if streaming { "stream " } else { "" };

    write!(
        out,
        "rpc {} ( {}.{} ) returns ( {}.{} );",
        method.name(),
        stream(method.is_client_streaming()),
        method.input().full_name(),
        stream(method.is_server_streaming()),
        method.output().full_name(),
    )
}

fn write_message<W: Write>(out: &mut W, message: &MessageDescriptor, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    let inner = INDENT.repeat(depth + 1);
    let proto3 = message.parent_file_descriptor_proto().syntax() == "proto3";

    writeln!(out, "{pad}message {} {{", message.name())?;

    let mut fields: Vec<_> = message
        .fields()
        .filter(|f| real_oneof_name(f).is_none())
        .collect();
    fields.sort_by_key(FieldDescriptor::number);

    for field in &fields {
        writeln!(out, "{inner}{}", field_line(field, proto3))?;
    }

    let mut oneofs: Vec<_> = message.oneofs().filter(|o| !o.is_synthetic()).collect();
    oneofs.sort_by(|a, b| a.name().cmp(b.name()));

    for oneof in &oneofs {
        let mut members: Vec<_> = oneof.fields().collect();
        members.sort_by_key(FieldDescriptor::number);

        writeln!(out, "{inner}oneof {} {{", oneof.name())?;
        for field in &members {
            writeln!(
                out,
                "{inner}{INDENT}{} {} = {};",
                type_name(&field.kind()),
                field.name(),
                field.number()
            )?;
        }
        writeln!(out, "{inner}}}")?;
    }

    let mut enums: Vec<_> = message.child_enums().collect();
    enums.sort_by(|a, b| a.name().cmp(b.name()));

    for child in &enums {
        write_enum(out, child, depth + 1)?;
        out.write_char('\n')?;
    }

    let mut messages: Vec<_> = message
        .child_messages()
        .filter(|m| !m.is_map_entry())
        .collect();
    messages.sort_by(|a, b| a.name().cmp(b.name()));

    for child in &messages {
        write_message(out, child, depth + 1)?;
        out.write_char('\n')?;
    }

    write!(out, "{pad}}}")
}

fn write_enum<W: Write>(out: &mut W, enum_desc: &EnumDescriptor, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);

    let mut values: Vec<_> = enum_desc.values().collect();
    values.sort_by(|a, b| a.number().cmp(&b.number()).then_with(|| a.name().cmp(b.name())));

    writeln!(out, "{pad}enum {} {{", enum_desc.name())?;
    for value in &values {
        writeln!(out, "{pad}{INDENT}{} = {};", value.name(), value.number())?;
    }
    write!(out, "{pad}}}")
}

fn field_line(field: &FieldDescriptor, proto3: bool) -> String {
    if field.is_map()
        && let Kind::Message(entry) = field.kind()
    {
        return format!(
            "map<{}, {}> {} = {};",
            type_name(&entry.map_entry_key_field().kind()),
            type_name(&entry.map_entry_value_field().kind()),
            field.name(),
            field.number()
        );
    }

    let label = match field.cardinality() {
        Cardinality::Repeated => "repeated ",
        Cardinality::Required => "required ",
        Cardinality::Optional if field.field_descriptor_proto().proto3_optional() => "optional ",
        Cardinality::Optional if !proto3 => "optional ",
        Cardinality::Optional => "",
    };

    format!(
        "{label}{} {} = {};",
        type_name(&field.kind()),
        field.name(),
        field.number()
    )
}

/// The oneof a field belongs to, unless it is the synthetic oneof of a proto3 `optional` field.
fn real_oneof_name(field: &FieldDescriptor) -> Option<String> {
    field
        .containing_oneof()
        .filter(|oneof| !oneof.is_synthetic())
        .map(|oneof| oneof.name().to_string())
}

/// The proto source spelling of a field type; message and enum references are fully qualified.
pub fn type_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(m) => format!(".{}", m.full_name()),
        Kind::Enum(e) => format!(".{}", e.full_name()),
    }
}
