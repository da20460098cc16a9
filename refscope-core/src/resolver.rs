//! # Service Resolver
//!
//! Thin orchestration over a [`ReflectionSession`] that turns user supplied names into
//! descriptors and "not found" faults into errors listing what does exist.
//!
//! Enriching an unknown service costs a second round trip (a fresh `ListServices`). That round
//! trip is best effort: it is bounded by [`SessionOptions::enrichment_timeout`] and if it fails
//! the original resolution error is returned as is, so a transport failure is never hidden
//! behind a cosmetic "not found".
use crate::{
    BoxError,
    error::{InvalidMethodError, MethodNotFoundError, ServiceNotFoundError},
    reflection::client::ReflectionResolveError,
    session::{ReflectionSession, ResolveFault, SessionOptions},
};
use http_body::Body as HttpBody;
use prost_reflect::{MethodDescriptor, ServiceDescriptor};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
#[error("failed to list remote services: {0}")]
pub struct ListServicesError(#[source] pub ReflectionResolveError);

#[derive(Debug, thiserror::Error)]
pub enum ResolveServiceError {
    #[error(transparent)]
    NotFound(#[from] ServiceNotFoundError),
    #[error("failed to resolve service: {0}")]
    Failed(#[source] ResolveFault),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveMethodError {
    #[error(transparent)]
    Service(#[from] ResolveServiceError),
    #[error(transparent)]
    NotFound(#[from] MethodNotFoundError),
}

/// A method named by its fully qualified path, e.g. `cosmos.bank.v1beta1.Query.Balance`.
///
/// The last `.` separates the service from the method. The `grpcurl` style
/// `cosmos.bank.v1beta1.Query/Balance` is accepted too, as long as the service is namespaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedMethod {
    pub service: String,
    pub method: String,
}

impl FromStr for QualifiedMethod {
    type Err = InvalidMethodError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMethodError(value.to_string());

        let (service, method) = match value.rsplit_once('/') {
            // `Alpha/Get` has no namespace.
            Some((service, _)) if !service.contains('.') => return Err(invalid()),
            Some(split) => split,
            None => value.rsplit_once('.').ok_or_else(invalid)?,
        };

        if service.is_empty() || method.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            service: service.to_string(),
            method: method.to_string(),
        })
    }
}

impl fmt::Display for QualifiedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// Resolves names against the server behind a session.
pub struct ServiceResolver<'a, S = Channel> {
    session: &'a mut ReflectionSession<S>,
    enrichment_timeout: Duration,
}

impl<'a, S> ServiceResolver<'a, S>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(session: &'a mut ReflectionSession<S>, options: &SessionOptions) -> Self {
        Self {
            session,
            enrichment_timeout: options.enrichment_timeout,
        }
    }

    /// Lists the services the server advertises, in the server's order.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ListServicesError> {
        self.session.list_services().await.map_err(ListServicesError)
    }

    /// Resolves a fully qualified service name.
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceDescriptor)` - The resolved service.
    /// * `Err(ResolveServiceError::NotFound)` - The server does not know the service; carries a
    ///   fresh listing of the services it does know.
    /// * `Err(ResolveServiceError::Failed)` - Any other failure, or a "not found" that could not
    ///   be enriched because the listing failed too.
    pub async fn resolve_service(
        &mut self,
        name: &str,
    ) -> Result<ServiceDescriptor, ResolveServiceError> {
        match self.session.resolve_service(name).await {
            Ok(descriptor) => Ok(descriptor),
            Err(fault) if fault.is_not_found() => Err(self.enrich_not_found(name, fault).await),
            Err(fault) => Err(ResolveServiceError::Failed(fault)),
        }
    }

    /// Resolves the service of `method`, then the method itself.
    pub async fn resolve_method(
        &mut self,
        method: &QualifiedMethod,
    ) -> Result<MethodDescriptor, ResolveMethodError> {
        let service = self.resolve_service(&method.service).await?;

        tracing::debug!(
            service_name = %method.service,
            method_name = %method.method,
            "Resolving requested method"
        );

        find_method(&service, &method.method).map_err(ResolveMethodError::from)
    }

    async fn enrich_not_found(&mut self, name: &str, fault: ResolveFault) -> ResolveServiceError {
        let listing =
            tokio::time::timeout(self.enrichment_timeout, self.session.list_services()).await;

        match listing {
            Ok(Ok(available_services)) => ServiceNotFoundError {
                requested: name.to_string(),
                available_services,
            }
            .into(),
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "Could not list services to enrich the error");
                ResolveServiceError::Failed(fault)
            }
            Err(_) => {
                tracing::debug!(
                    timeout = ?self.enrichment_timeout,
                    "Timed out listing services to enrich the error"
                );
                ResolveServiceError::Failed(fault)
            }
        }
    }
}

/// Finds `name` among the methods of `service`.
pub fn find_method(
    service: &ServiceDescriptor,
    name: &str,
) -> Result<MethodDescriptor, MethodNotFoundError> {
    service
        .methods()
        .find(|m| m.name() == name)
        .ok_or_else(|| MethodNotFoundError {
            service: service.full_name().to_string(),
            requested: name.to_string(),
            available_methods: service.methods().map(|m| m.name().to_string()).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;

    #[test]
    fn test_parse_dotted_method() {
        let method: QualifiedMethod = "cosmos.bank.v1beta1.Query.Balance".parse().unwrap();

        assert_eq!(method.service, "cosmos.bank.v1beta1.Query");
        assert_eq!(method.method, "Balance");
        assert_eq!(method.to_string(), "cosmos.bank.v1beta1.Query.Balance");
    }

    #[test]
    fn test_parse_slash_method() {
        let method: QualifiedMethod = "pkg.Alpha/Get".parse().unwrap();

        assert_eq!(method.service, "pkg.Alpha");
        assert_eq!(method.method, "Get");
    }

    #[test]
    fn test_parse_rejects_name_without_namespace() {
        let err = "NoDot".parse::<QualifiedMethod>().unwrap_err();

        assert_eq!(err, InvalidMethodError("NoDot".to_string()));
    }

    #[test]
    fn test_parse_slash_method_requires_namespace() {
        let err = "Alpha/Get".parse::<QualifiedMethod>().unwrap_err();

        assert_eq!(err, InvalidMethodError("Alpha/Get".to_string()));
        assert!("Alpha/Get.x".parse::<QualifiedMethod>().is_err());
        assert!("pkg.Alpha/Get".parse::<QualifiedMethod>().is_ok());
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!("pkg.".parse::<QualifiedMethod>().is_err());
        assert!(".Get".parse::<QualifiedMethod>().is_err());
        assert!("pkg.Alpha/".parse::<QualifiedMethod>().is_err());
    }

    #[test]
    fn test_find_method_lists_methods_in_declaration_order() {
        let pool = DescriptorPool::from_file_descriptor_set(schema_fixtures::file_descriptor_set())
            .unwrap();
        let service = pool.get_service_by_name("pkg.Alpha").unwrap();

        assert_eq!(find_method(&service, "Put").unwrap().name(), "Put");

        let err = find_method(&service, "List").unwrap_err();
        assert_eq!(err.service, "pkg.Alpha");
        assert_eq!(err.available_methods, vec!["Get", "Put", "Delete"]);
    }
}
