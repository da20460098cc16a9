//! # Schema Fixtures
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide descriptor sets and
//! in-process reflection servers for testing `refscope`.
//! It is not intended for production use.
//!
//! The schema is assembled directly as `FileDescriptorProto`s, so no `protoc` is
//! needed at build time. Its shape, written as proto:
//!
//! ```proto
//! // pkg/common.proto
//! enum Status { STATUS_UNSPECIFIED = 0; STATUS_ARCHIVED = 2; STATUS_ACTIVE = 1; }
//! message Tag { string value = 1; }
//!
//! // pkg/alpha.proto (imports pkg/common.proto)
//! message GetRequest { string key = 1; }
//! message GetResponse { Item item = 1; }
//! message Item {
//!   string id = 1; Meta meta = 2; Status status = 3; Item parent = 4;
//!   map<string, Tag> tags = 5; repeated string labels = 6;
//! }
//! message Meta { int64 created_at = 1; Item owner = 2; }
//! message PutRequest { Item item = 1; }
//! message PutResponse {}
//! message DeleteRequest { bool force = 3; oneof target { string key = 2; int64 index = 1; } }
//! message DeleteResponse { bool deleted = 1; }
//!
//! service Alpha { rpc Get(..); rpc Put(..); rpc Delete(..); }
//! service Reflect { rpc Echo(GetRequest) returns (DeleteResponse);
//!                   rpc Watch(GetRequest) returns (stream GetResponse); }
//! ```
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, MethodDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{Request, Response, Status, Streaming};
use tonic_reflection::pb::v1::server_reflection_server::{
    ServerReflection, ServerReflectionServer,
};
use tonic_reflection::pb::v1::{
    ListServiceResponse, ServerReflectionRequest, ServerReflectionResponse, ServiceResponse,
    server_reflection_request::MessageRequest, server_reflection_response::MessageResponse,
};

pub const COMMON_FILE: &str = "pkg/common.proto";
pub const ALPHA_FILE: &str = "pkg/alpha.proto";

/// Services advertised by [`reflection_service`], in registration order.
pub const SERVICES: [&str; 2] = ["pkg.Alpha", "pkg.Reflect"];

/// The complete fixture schema: `pkg/common.proto` followed by `pkg/alpha.proto`.
pub fn file_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![common_file(), alpha_file()],
    }
}

/// A reflection service serving [`file_descriptor_set`].
///
/// The reflection service itself is not advertised, so `list_services` returns exactly [`SERVICES`].
pub fn reflection_service() -> ServerReflectionServer<impl ServerReflection> {
    tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(file_descriptor_set())
        .include_reflection_service(false)
        .build_v1()
        .expect("Failed to setup Reflection Service")
}

/// A reflection service that knows `pkg/alpha.proto` but not the `pkg/common.proto` it imports.
pub fn reflection_service_missing_import() -> ServerReflectionServer<impl ServerReflection> {
    tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(FileDescriptorSet {
            file: vec![alpha_file()],
        })
        .include_reflection_service(false)
        .build_v1()
        .expect("Failed to setup Reflection Service")
}

/// A server that only speaks `grpc.reflection.v1alpha`.
///
/// Useful to check how a `v1` client behaves against a server lacking the service it expects.
pub fn legacy_reflection_service() -> tonic_reflection::server::v1alpha::ServerReflectionServer<
    impl tonic_reflection::server::v1alpha::ServerReflection,
> {
    tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(file_descriptor_set())
        .build_v1alpha()
        .expect("Failed to setup Reflection Service")
}

/// Serves [`reflection_service`] over plaintext TCP on an ephemeral localhost port.
///
/// The server runs on the current tokio runtime until the runtime shuts down.
pub async fn spawn_reflection_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no local address");

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(reflection_service())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("Reflection server failed");
    });

    addr
}

/// A reflection server with scripted answers.
///
/// * `ListServices` pops the next scripted listing (or fails with `UNAVAILABLE` once the script is exhausted).
///   With [`ScriptedReflection::stalled_listings`] it is never answered.
/// * Every symbol or file lookup fails with `NOT_FOUND`.
#[derive(Clone, Default)]
pub struct ScriptedReflection {
    listings: Arc<Mutex<VecDeque<Result<Vec<String>, Status>>>>,
    stall_listings: bool,
}

impl ScriptedReflection {
    pub fn new(listings: Vec<Result<Vec<String>, Status>>) -> Self {
        Self {
            listings: Arc::new(Mutex::new(listings.into())),
            stall_listings: false,
        }
    }

    /// A server that keeps every `ListServices` stream open without ever answering.
    pub fn stalled_listings() -> Self {
        Self {
            stall_listings: true,
            ..Self::default()
        }
    }

    pub fn into_service(self) -> ServerReflectionServer<Self> {
        ServerReflectionServer::new(self)
    }

    fn answer(&self, request: ServerReflectionRequest) -> Result<ServerReflectionResponse, Status> {
        match request.message_request.clone() {
            Some(MessageRequest::ListServices(_)) => {
                let next = self
                    .listings
                    .lock()
                    .expect("Listing script poisoned")
                    .pop_front()
                    .unwrap_or_else(|| Err(Status::unavailable("no listing scripted")));

                let names = next?;

                Ok(ServerReflectionResponse {
                    valid_host: request.host.clone(),
                    original_request: Some(request),
                    message_response: Some(MessageResponse::ListServicesResponse(
                        ListServiceResponse {
                            service: names
                                .into_iter()
                                .map(|name| ServiceResponse { name })
                                .collect(),
                        },
                    )),
                })
            }
            Some(MessageRequest::FileContainingSymbol(symbol)) => Err(Status::not_found(
                format!("symbol '{symbol}' not found"),
            )),
            Some(MessageRequest::FileByFilename(file)) => {
                Err(Status::not_found(format!("file '{file}' not found")))
            }
            _ => Err(Status::unimplemented("not scripted")),
        }
    }
}

#[tonic::async_trait]
impl ServerReflection for ScriptedReflection {
    type ServerReflectionInfoStream = ReceiverStream<Result<ServerReflectionResponse, Status>>;

    async fn server_reflection_info(
        &self,
        request: Request<Streaming<ServerReflectionRequest>>,
    ) -> Result<Response<Self::ServerReflectionInfoStream>, Status> {
        let mut requests = request.into_inner();
        let (tx, rx) = mpsc::channel(4);
        let this = self.clone();

        tokio::spawn(async move {
            while let Ok(Some(req)) = requests.message().await {
                let stalled = this.stall_listings
                    && matches!(req.message_request, Some(MessageRequest::ListServices(_)));

                // Holding `tx` keeps the response stream open until the client goes away.
                if stalled {
                    continue;
                }

                let answer = this.answer(req);
                let failed = answer.is_err();

                if tx.send(answer).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

fn common_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(COMMON_FILE.to_string()),
        package: Some("pkg".to_string()),
        syntax: Some("proto3".to_string()),
        enum_type: vec![EnumDescriptorProto {
            name: Some("Status".to_string()),
            value: vec![
                enum_value("STATUS_UNSPECIFIED", 0),
                enum_value("STATUS_ARCHIVED", 2),
                enum_value("STATUS_ACTIVE", 1),
            ],
            ..Default::default()
        }],
        message_type: vec![message("Tag", vec![scalar("value", 1, Type::String)])],
        ..Default::default()
    }
}

fn alpha_file() -> FileDescriptorProto {
    let item = DescriptorProto {
        name: Some("Item".to_string()),
        field: vec![
            scalar("id", 1, Type::String),
            message_ref("meta", 2, ".pkg.Meta"),
            enum_ref("status", 3, ".pkg.Status"),
            message_ref("parent", 4, ".pkg.Item"),
            repeated(message_ref("tags", 5, ".pkg.Item.TagsEntry")),
            repeated(scalar("labels", 6, Type::String)),
        ],
        nested_type: vec![DescriptorProto {
            name: Some("TagsEntry".to_string()),
            field: vec![
                scalar("key", 1, Type::String),
                message_ref("value", 2, ".pkg.Tag"),
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    };

    let delete_request = DescriptorProto {
        name: Some("DeleteRequest".to_string()),
        field: vec![
            scalar("force", 3, Type::Bool),
            in_oneof(scalar("key", 2, Type::String), 0),
            in_oneof(scalar("index", 1, Type::Int64), 0),
        ],
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("target".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };

    FileDescriptorProto {
        name: Some(ALPHA_FILE.to_string()),
        package: Some("pkg".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec![COMMON_FILE.to_string()],
        message_type: vec![
            message("GetRequest", vec![scalar("key", 1, Type::String)]),
            message("GetResponse", vec![message_ref("item", 1, ".pkg.Item")]),
            item,
            message(
                "Meta",
                vec![
                    scalar("created_at", 1, Type::Int64),
                    message_ref("owner", 2, ".pkg.Item"),
                ],
            ),
            message("PutRequest", vec![message_ref("item", 1, ".pkg.Item")]),
            message("PutResponse", vec![]),
            delete_request,
            message("DeleteResponse", vec![scalar("deleted", 1, Type::Bool)]),
        ],
        service: vec![
            ServiceDescriptorProto {
                name: Some("Alpha".to_string()),
                method: vec![
                    method("Get", ".pkg.GetRequest", ".pkg.GetResponse", false),
                    method("Put", ".pkg.PutRequest", ".pkg.PutResponse", false),
                    method("Delete", ".pkg.DeleteRequest", ".pkg.DeleteResponse", false),
                ],
                ..Default::default()
            },
            ServiceDescriptorProto {
                name: Some("Reflect".to_string()),
                method: vec![
                    method("Echo", ".pkg.GetRequest", ".pkg.DeleteResponse", false),
                    method("Watch", ".pkg.GetRequest", ".pkg.GetResponse", true),
                ],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

fn message(name: &str, field: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field,
        ..Default::default()
    }
}

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(json_name(name)),
        ..Default::default()
    }
}

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    field(name, number, ty)
}

fn message_ref(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, Type::Message)
    }
}

fn enum_ref(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, Type::Enum)
    }
}

fn repeated(field: FieldDescriptorProto) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..field
    }
}

fn in_oneof(field: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        oneof_index: Some(index),
        ..field
    }
}

fn enum_value(name: &str, number: i32) -> EnumValueDescriptorProto {
    EnumValueDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        ..Default::default()
    }
}

fn method(
    name: &str,
    input: &str,
    output: &str,
    server_streaming: bool,
) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

// protoc's lowerCamelCase rule: drop underscores, upper-case the letter after each one.
fn json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;

    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }

    out
}
