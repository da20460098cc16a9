//! # Reflection Client
//!
//! A client for `grpc.reflection.v1`. Every lookup opens its own bidirectional
//! `ServerReflectionInfo` stream and drops it when done.
//!
//! Resolving a symbol returns the file that declares it plus every file it imports,
//! transitively, so the result can be loaded into a `DescriptorPool` on its own. Imports the
//! server did not volunteer are requested on the same stream, one `FileByFilename` each.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Code, Streaming, client::GrpcService};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionResolveError {
    #[error("could not open a reflection stream, the server may not support reflection: {0}")]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("reflection stream failed: {0}")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("reflection stream closed before answering")]
    StreamClosed,

    #[error("reflection stream no longer accepts requests")]
    SendFailed,

    #[error("server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("unexpected reflection response: {0}")]
    UnexpectedResponseType(String),

    #[error("failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("failed to fetch imported file {file:?}: {source}")]
    DependencyFailed {
        file: String,
        #[source]
        source: Box<ReflectionResolveError>,
    },

    #[error("no reflection response within {0:?}")]
    TimedOut(Duration),
}

impl ReflectionResolveError {
    /// Whether the server reported that the requested symbol or file does not exist.
    ///
    /// Servers signal this either by failing the stream with `NOT_FOUND` or by answering
    /// with an `ErrorResponse` carrying the same code. A missing import is a
    /// [`DependencyFailed`](Self::DependencyFailed) instead and never counts as not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ServerStreamFailure(status) => status.code() == Code::NotFound,
            Self::ServerError { code, .. } => *code == Code::NotFound as i32,
            _ => false,
        }
    }
}

// Servers ignore the host field in practice.
const HOST: &str = "";

// Requests queued on a stream before the server reads them.
const REQUEST_BUFFER: usize = 16;

/// A generic client for the gRPC Server Reflection Protocol.
#[derive(Debug, Clone)]
pub struct ReflectionClient<S = Channel> {
    inner: ServerReflectionClient<S>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        Self {
            inner: ServerReflectionClient::new(service),
        }
    }

    /// Lists all services exposed by the server, in the order the server reports them.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        tracing::debug!("Listing remote services");

        let mut stream = self
            .open(MessageRequest::ListServices(String::new()))
            .await?;

        match stream.next().await? {
            MessageResponse::ListServicesResponse(listing) => {
                Ok(listing.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches the file declaring `symbol` (e.g. `my.package.MyService`) and all of its imports.
    ///
    /// # Returns
    ///
    /// * `Ok(fd_set)` - Every file needed to describe `symbol`, in no particular order.
    /// * `Err(ReflectionResolveError)` - The stream failed or the server does not know `symbol`;
    ///   see [`ReflectionResolveError::is_not_found`].
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ReflectionResolveError> {
        tracing::debug!(symbol, "Requesting file containing symbol");

        let mut stream = self
            .open(MessageRequest::FileContainingSymbol(symbol.to_string()))
            .await?;

        let mut files = FileCollector::default();
        // Answers arrive in request order; `None` is the symbol lookup itself.
        let mut pending: VecDeque<Option<String>> = VecDeque::from([None]);

        while let Some(requested) = pending.pop_front() {
            let response = stream.next().await.map_err(|source| match requested {
                Some(file) => ReflectionResolveError::DependencyFailed {
                    file,
                    source: Box::new(source),
                },
                None => source,
            })?;

            let batch = match response {
                MessageResponse::FileDescriptorResponse(batch) => batch,
                other => return Err(unexpected(&other)),
            };

            let decoded = batch
                .file_descriptor_proto
                .iter()
                .map(|raw| FileDescriptorProto::decode(raw.as_slice()))
                .collect::<Result<Vec<_>, _>>()?;

            for import in files.absorb(decoded) {
                tracing::debug!(file = %import, "Requesting dependency");
                stream
                    .send(MessageRequest::FileByFilename(import.clone()))
                    .await?;
                pending.push_back(Some(import));
            }
        }

        tracing::debug!(symbol, files = files.len(), "Collected file descriptors");

        Ok(files.into_set())
    }

    /// Opens a stream with `first` already queued, so servers that wait for a request before
    /// answering with headers do not stall the handshake.
    async fn open(
        &mut self,
        first: MessageRequest,
    ) -> Result<ReflectionStream, ReflectionResolveError> {
        let (requests, rx) = mpsc::channel(REQUEST_BUFFER);

        requests
            .send(request(first))
            .await
            .map_err(|_| ReflectionResolveError::SendFailed)?;

        let responses = self
            .inner
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionResolveError::ServerStreamInitFailed)?
            .into_inner();

        Ok(ReflectionStream {
            requests,
            responses,
        })
    }
}

/// One open `ServerReflectionInfo` exchange.
struct ReflectionStream {
    requests: mpsc::Sender<ServerReflectionRequest>,
    responses: Streaming<ServerReflectionResponse>,
}

impl ReflectionStream {
    async fn send(&self, message: MessageRequest) -> Result<(), ReflectionResolveError> {
        self.requests
            .send(request(message))
            .await
            .map_err(|_| ReflectionResolveError::SendFailed)
    }

    /// The next answer; an `ErrorResponse` becomes [`ReflectionResolveError::ServerError`].
    async fn next(&mut self) -> Result<MessageResponse, ReflectionResolveError> {
        let response = self
            .responses
            .message()
            .await
            .map_err(ReflectionResolveError::ServerStreamFailure)?
            .ok_or(ReflectionResolveError::StreamClosed)?;

        match response.message_response {
            Some(MessageResponse::ErrorResponse(err)) => Err(ReflectionResolveError::ServerError {
                code: err.error_code,
                message: err.error_message,
            }),
            Some(message) => Ok(message),
            None => Err(ReflectionResolveError::UnexpectedResponseType(
                "empty response".to_string(),
            )),
        }
    }
}

fn request(message: MessageRequest) -> ServerReflectionRequest {
    ServerReflectionRequest {
        host: HOST.to_string(),
        message_request: Some(message),
    }
}

fn unexpected(response: &MessageResponse) -> ReflectionResolveError {
    ReflectionResolveError::UnexpectedResponseType(format!("{response:?}"))
}

/// Files received so far, keyed by name, plus the imports already asked for.
#[derive(Default)]
struct FileCollector {
    files: HashMap<String, FileDescriptorProto>,
    requested: HashSet<String>,
}

impl FileCollector {
    /// Stores a batch and returns the imports that are neither stored nor already requested.
    ///
    /// The whole batch is stored before imports are checked, since servers often send a file
    /// together with its dependencies.
    fn absorb(&mut self, batch: Vec<FileDescriptorProto>) -> Vec<String> {
        let mut imports = Vec::new();

        for file in batch {
            if self.files.contains_key(file.name()) {
                continue;
            }

            imports.extend(file.dependency.iter().cloned());
            self.files.insert(file.name().to_string(), file);
        }

        imports
            .into_iter()
            .filter(|import| {
                !self.files.contains_key(import) && self.requested.insert(import.clone())
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.files.len()
    }

    fn into_set(self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: self.files.into_values().collect(),
        }
    }
}
