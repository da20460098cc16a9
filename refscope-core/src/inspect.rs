//! # Inspection Operations
//!
//! The four user facing operations, written against a [`ServiceResolver`] and any
//! [`std::io::Write`] sink. The CLI passes stdout; tests pass a `Vec<u8>`.
use crate::{
    BoxError,
    render,
    resolver::{
        ListServicesError, QualifiedMethod, ResolveMethodError, ResolveServiceError,
        ServiceResolver, find_method,
    },
    walker::TypeGraph,
};
use http_body::Body as HttpBody;
use prost_reflect::{Kind, MessageDescriptor};
use prost_types::field_descriptor_proto::Type;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    ListServices(#[from] ListServicesError),
    #[error(transparent)]
    ResolveService(#[from] ResolveServiceError),
    #[error(transparent)]
    ResolveMethod(#[from] ResolveMethodError),
    #[error("failed to render {name}")]
    Render {
        name: String,
        #[source]
        source: fmt::Error,
    },
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Shallow view of a method's request and response fields, keyed by JSON field name.
///
/// Message typed fields map to the referenced message's full name, every other field maps to
/// its protobuf type tag (`TYPE_STRING`, `TYPE_ENUM`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MethodShapes {
    pub input: BTreeMap<String, String>,
    pub output: BTreeMap<String, String>,
}

/// Writes one service name per line, in the server's order.
pub async fn list_services<S, W>(
    resolver: &mut ServiceResolver<'_, S>,
    out: &mut W,
) -> Result<(), InspectError>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    W: Write + ?Sized,
{
    for service in resolver.list_services().await? {
        writeln!(out, "{service}")?;
    }

    Ok(())
}

/// Writes the methods of `service` one per line, in declaration order.
pub async fn list_methods<S, W>(
    resolver: &mut ServiceResolver<'_, S>,
    service: &str,
    out: &mut W,
) -> Result<(), InspectError>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    W: Write + ?Sized,
{
    let descriptor = resolver.resolve_service(service).await?;

    for method in descriptor.methods() {
        writeln!(out, "{}", method.name())?;
    }

    Ok(())
}

/// Summarises the top level fields of a method's input and output messages.
pub async fn show_messages<S>(
    resolver: &mut ServiceResolver<'_, S>,
    method: &QualifiedMethod,
) -> Result<MethodShapes, InspectError>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    let descriptor = resolver.resolve_method(method).await?;

    Ok(MethodShapes {
        input: field_shapes(&descriptor.input()),
        output: field_shapes(&descriptor.output()),
    })
}

/// Renders what the server exposes, at the depth the caller asks for.
///
/// * no `service`: the full name of every service that resolves;
/// * `service` only: the canonical service definition;
/// * `service` and `method`: the method signature, its input and output messages and every
///   type they reference, each block preceded by a `//` comment naming its file.
pub async fn inspect<S, W>(
    resolver: &mut ServiceResolver<'_, S>,
    service: Option<&str>,
    method: Option<&str>,
    out: &mut W,
) -> Result<(), InspectError>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    W: Write + ?Sized,
{
    let Some(service) = service.filter(|s| !s.is_empty()) else {
        tracing::debug!("Listing all services");

        for name in resolver.list_services().await? {
            match resolver.resolve_service(&name).await {
                Ok(descriptor) => writeln!(out, "{}", descriptor.full_name())?,
                Err(err) => {
                    tracing::info!(service_name = %name, error = %err, "Error resolving service");
                }
            }
        }

        return Ok(());
    };

    tracing::debug!(service_name = service, "Resolving requested service");
    let descriptor = resolver.resolve_service(service).await?;

    let Some(method) = method.filter(|m| !m.is_empty()) else {
        let text = render::render(&descriptor).map_err(|source| InspectError::Render {
            name: descriptor.full_name().to_string(),
            source,
        })?;
        writeln!(out, "{text}")?;
        return Ok(());
    };

    let method = find_method(&descriptor, method).map_err(ResolveMethodError::from)?;

    let signature = render::render(&method).map_err(|source| InspectError::Render {
        name: method.full_name().to_string(),
        source,
    })?;
    writeln!(out, "{signature}")?;

    let input = method.input();
    let output = method.output();

    for root in [&input, &output] {
        match render::render(root) {
            Ok(text) => {
                writeln!(out, "// {}", root.parent_file_descriptor_proto().name())?;
                writeln!(out, "{text}")?;
            }
            Err(err) => {
                tracing::info!(
                    method_name = method.full_name(),
                    message_name = root.full_name(),
                    error = %err,
                    "Error converting method type to string"
                );
            }
        }
    }

    write_type_graph(&TypeGraph::walk([input, output]), out)
}

fn write_type_graph<W: Write + ?Sized>(graph: &TypeGraph, out: &mut W) -> Result<(), InspectError> {
    for entry in graph {
        let text = match render::render(entry) {
            Ok(text) => text,
            Err(err) => {
                tracing::info!(
                    fully_qualified_name = entry.full_name(),
                    error = %err,
                    "Error converting descriptor to string"
                );
                continue;
            }
        };

        writeln!(out, "// {} ({})", entry.full_name(), entry.file_name())?;
        writeln!(out, "{text}")?;
    }

    Ok(())
}

fn field_shapes(message: &MessageDescriptor) -> BTreeMap<String, String> {
    message
        .fields()
        .map(|field| (field.json_name().to_string(), shape_of(&field.kind())))
        .collect()
}

fn shape_of(kind: &Kind) -> String {
    let tag = match kind {
        Kind::Message(message) => return message.full_name().to_string(),
        Kind::Enum(_) => Type::Enum,
        Kind::Double => Type::Double,
        Kind::Float => Type::Float,
        Kind::Int32 => Type::Int32,
        Kind::Int64 => Type::Int64,
        Kind::Uint32 => Type::Uint32,
        Kind::Uint64 => Type::Uint64,
        Kind::Sint32 => Type::Sint32,
        Kind::Sint64 => Type::Sint64,
        Kind::Fixed32 => Type::Fixed32,
        Kind::Fixed64 => Type::Fixed64,
        Kind::Sfixed32 => Type::Sfixed32,
        Kind::Sfixed64 => Type::Sfixed64,
        Kind::Bool => Type::Bool,
        Kind::String => Type::String,
        Kind::Bytes => Type::Bytes,
    };

    tag.as_str_name().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;

    #[test]
    fn test_field_shapes_are_shallow() {
        let pool = DescriptorPool::from_file_descriptor_set(schema_fixtures::file_descriptor_set())
            .unwrap();
        let item = pool.get_message_by_name("pkg.Item").unwrap();

        let shapes = field_shapes(&item);

        assert_eq!(shapes["id"], "TYPE_STRING");
        assert_eq!(shapes["meta"], "pkg.Meta");
        assert_eq!(shapes["status"], "TYPE_ENUM");
        assert_eq!(shapes["parent"], "pkg.Item");
        assert_eq!(shapes["tags"], "pkg.Item.TagsEntry");
        assert_eq!(shapes["labels"], "TYPE_STRING");
    }

    #[test]
    fn test_method_shapes_serialize_with_pascal_case_keys() {
        let shapes = MethodShapes {
            input: BTreeMap::from([("key".to_string(), "TYPE_STRING".to_string())]),
            output: BTreeMap::new(),
        };

        let json = serde_json::to_value(&shapes).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "Input": { "key": "TYPE_STRING" }, "Output": {} })
        );
    }
}
