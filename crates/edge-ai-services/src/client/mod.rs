//! Clients for the model service and the registry, plus the profiling and
//! publishing workflows built on them.
pub mod profile_session;
pub mod publish;
pub mod registry_client;
pub mod service_client;

pub use profile_session::{ProfileSession, SessionReport};
pub use publish::{load_service_document, publish_service_data, PublishOutcome};
pub use registry_client::RegistryClient;
pub use service_client::ServiceClient;
