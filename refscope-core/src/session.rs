//! # Reflection Session
//!
//! A [`ReflectionSession`] owns the connection to one server and the reflection client talking
//! over it, for the duration of a single inspection. Both are released when the session is
//! dropped: on normal return, on an early `?` return, and when the future driving the
//! inspection is dropped because the caller cancelled it (dropping the channel aborts any
//! in-flight reflection stream).
//!
//! ```rust,no_run
//! use refscope_core::session::{ReflectionSession, SessionOptions};
//! use refscope_core::target::{Target, TransportSecurity};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let target = Target {
//!     address: "localhost:9090".to_string(),
//!     security: TransportSecurity::Insecure,
//! };
//!
//! let mut session = ReflectionSession::open(&target, &SessionOptions::default()).await?;
//! let services = session.list_services().await?;
//! session.close();
//! # Ok(())
//! # }
//! ```
use crate::{
    BoxError,
    reflection::client::{ReflectionClient, ReflectionResolveError},
    target::{Target, TransportSecurity},
};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorError, DescriptorPool, ServiceDescriptor};
use std::error::Error as StdError;
use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

/// Timeouts applied to a session.
///
/// `request_timeout` bounds each reflection exchange as a whole: the stream headers and every
/// answer streamed after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on establishing the connection.
    pub connect_timeout: Option<Duration>,
    /// Bound on every reflection round trip.
    pub request_timeout: Option<Duration>,
    /// Bound on the extra listing made to enrich a "service not found" error.
    pub enrichment_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            request_timeout: Some(Duration::from_secs(30)),
            enrichment_timeout: Duration::from_secs(5),
        }
    }
}

/// Errors that can occur when connecting to a gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("failed to dial gRPC address {address:?}: invalid address: {}", error_chain(.source))]
    InvalidAddress {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to dial gRPC address {address:?}: invalid TLS configuration: {}", error_chain(.source))]
    Tls {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to dial gRPC address {address:?}: {}", error_chain(.source))]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
        tls_fault: bool,
    },
}

impl DialError {
    /// Whether the dial looks like it failed because the server does not speak TLS.
    ///
    /// Known fragility: the transport has no typed "no transport security" error. The check
    /// looks for an `InvalidData` I/O error in the source chain (how the TLS stream reports a
    /// handshake it cannot parse) and otherwise falls back to matching TLS wording in the
    /// error messages.
    pub fn suggests_insecure(&self) -> bool {
        matches!(self, Self::Connect { tls_fault: true, .. })
    }
}

/// Errors that can occur when resolving a service through reflection.
#[derive(Debug, thiserror::Error)]
pub enum ResolveFault {
    #[error(transparent)]
    Reflection(#[from] ReflectionResolveError),
    #[error("failed to build descriptor pool: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("symbol {0:?} exists but is not a service")]
    NotAService(String),
}

impl ResolveFault {
    /// Whether the server has no service under the requested name.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Reflection(err) => err.is_not_found(),
            Self::NotAService(_) => true,
            Self::Descriptor(_) => false,
        }
    }
}

/// Exclusive owner of one server connection and its reflection client.
pub struct ReflectionSession<S = Channel> {
    reflection_client: ReflectionClient<S>,
    address: String,
    request_timeout: Option<Duration>,
}

impl ReflectionSession<Channel> {
    /// Connects to `target`.
    ///
    /// Addresses without a scheme get `http://` or `https://` depending on the target's
    /// transport security. Secure targets use the platform's native root certificates.
    ///
    /// # Returns
    ///
    /// * `Ok(ReflectionSession)` - The connected session.
    /// * `Err(DialError)` - If the address is invalid or the connection cannot be established.
    pub async fn open(target: &Target, options: &SessionOptions) -> Result<Self, DialError> {
        let address = target.address.clone();
        let uri = endpoint_uri(target);

        tracing::debug!(%address, security = ?target.security, "Opening remote gRPC connection");

        let mut endpoint =
            Endpoint::from_shared(uri).map_err(|source| DialError::InvalidAddress {
                address: address.clone(),
                source,
            })?;

        if let Some(timeout) = options.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        if let Some(timeout) = options.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }

        if target.security == TransportSecurity::Secure {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|source| DialError::Tls {
                    address: address.clone(),
                    source,
                })?;
        }

        let channel = endpoint.connect().await.map_err(|source| {
            let tls_fault =
                target.security == TransportSecurity::Secure && looks_like_tls_fault(&source);

            if tls_fault {
                tracing::warn!(%address, "Consider using --insecure flag");
            }

            DialError::Connect {
                address: address.clone(),
                source,
                tls_fault,
            }
        })?;

        Ok(Self {
            reflection_client: ReflectionClient::new(channel),
            address,
            request_timeout: options.request_timeout,
        })
    }
}

impl<S> ReflectionSession<S>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Creates a session over an existing Tonic service (e.g. an in-process server or an
    /// `InterceptedService`), with the default request timeout.
    pub fn from_service(service: S) -> Self {
        Self {
            reflection_client: ReflectionClient::new(service),
            address: "in-process".to_string(),
            request_timeout: SessionOptions::default().request_timeout,
        }
    }

    /// Replaces the bound on each reflection exchange. `None` waits indefinitely.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The address this session is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Lists the services the server advertises, in the server's order.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        with_deadline(self.request_timeout, self.reflection_client.list_services()).await
    }

    /// Fetches the full descriptor of `name`, including every file it transitively imports.
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceDescriptor)` - The resolved service.
    /// * `Err(ResolveFault)` - Use [`ResolveFault::is_not_found`] to tell an unknown service
    ///   apart from transport or protocol failures.
    pub async fn resolve_service(&mut self, name: &str) -> Result<ServiceDescriptor, ResolveFault> {
        tracing::debug!(service_name = name, "Resolving remote service");

        let fd_set = with_deadline(
            self.request_timeout,
            self.reflection_client.file_descriptor_set_by_symbol(name),
        )
        .await?;

        let pool = DescriptorPool::from_file_descriptor_set(fd_set)?;

        pool.get_service_by_name(name)
            .ok_or_else(|| ResolveFault::NotAService(name.to_string()))
    }

    /// Releases the connection now instead of at the end of the enclosing scope.
    pub fn close(self) {
        drop(self);
    }
}

impl<S> Drop for ReflectionSession<S> {
    fn drop(&mut self) {
        tracing::debug!(address = %self.address, "Releasing reflection session");
    }
}

/// Bounds a whole reflection exchange, every streamed answer included.
async fn with_deadline<T, F>(
    limit: Option<Duration>,
    exchange: F,
) -> Result<T, ReflectionResolveError>
where
    F: Future<Output = Result<T, ReflectionResolveError>>,
{
    let Some(limit) = limit else {
        return exchange.await;
    };

    tokio::time::timeout(limit, exchange).await.unwrap_or_else(|_| {
        tracing::debug!(timeout = ?limit, "Reflection exchange timed out");
        Err(ReflectionResolveError::TimedOut(limit))
    })
}

fn endpoint_uri(target: &Target) -> String {
    if target.address.contains("://") {
        target.address.clone()
    } else {
        format!("{}://{}", target.security.scheme(), target.address)
    }
}

fn looks_like_tls_fault(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);

    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::InvalidData
        {
            return true;
        }

        let message = err.to_string().to_lowercase();
        if ["tls", "handshake", "certificate", "transport security"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            return true;
        }

        current = err.source();
    }

    false
}

/// Renders an error and its sources as `outer: inner: root`.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();

    while let Some(source) = current {
        let message = source.to_string();
        if !out.ends_with(&message) {
            out.push_str(": ");
            out.push_str(&message);
        }
        current = source.source();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapper(&'static str, Box<dyn StdError + Send + Sync>);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(self.1.as_ref())
        }
    }

    #[test]
    fn test_endpoint_uri_adds_scheme_from_security() {
        let insecure = Target {
            address: "localhost:9090".to_string(),
            security: TransportSecurity::Insecure,
        };
        let secure = Target {
            address: "grpc.example.com:443".to_string(),
            security: TransportSecurity::Secure,
        };

        assert_eq!(endpoint_uri(&insecure), "http://localhost:9090");
        assert_eq!(endpoint_uri(&secure), "https://grpc.example.com:443");
    }

    #[test]
    fn test_endpoint_uri_keeps_explicit_scheme() {
        let target = Target {
            address: "http://localhost:9090".to_string(),
            security: TransportSecurity::Secure,
        };

        assert_eq!(endpoint_uri(&target), "http://localhost:9090");
    }

    #[test]
    fn test_tls_fault_detected_from_invalid_data_source() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt message");
        let err = Wrapper("transport error", Box::new(io));

        assert!(looks_like_tls_fault(&err));
    }

    #[test]
    fn test_connection_refused_is_not_a_tls_fault() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = Wrapper("transport error", Box::new(io));

        assert!(!looks_like_tls_fault(&err));
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = Wrapper("transport error", Box::new(io));

        assert_eq!(error_chain(&err), "transport error: connection refused");
    }

    #[tokio::test]
    async fn test_open_refused_connection_reports_address() {
        // Port 1 on localhost is reserved and never listening in test environments.
        let target = Target {
            address: "127.0.0.1:1".to_string(),
            security: TransportSecurity::Insecure,
        };

        let result = ReflectionSession::open(&target, &SessionOptions::default()).await;

        match result {
            Err(err @ DialError::Connect { .. }) => {
                assert!(
                    err.to_string()
                        .starts_with(r#"failed to dial gRPC address "127.0.0.1:1": "#),
                    "unexpected message: {err}"
                );
                assert!(!err.suggests_insecure());
            }
            Err(err) => panic!("Expected DialError::Connect, got: {err:?}"),
            Ok(_) => panic!("Expected the dial to fail"),
        }
    }
}
