use std::sync::Arc;

/// Errors surfaced by the cache layer.
///
/// Observable getters never return these; they only come out of async
/// operations and failure callbacks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The Kubernetes API rejected or failed a request.
    #[error("kubernetes api request failed: {0}")]
    Api(#[from] kube_client::Error),

    /// The watch stream failed.
    #[error("watch stream failed: {0}")]
    Watch(#[from] kube_runtime::watcher::Error),

    /// A (possibly shared) list request for one namespace failed.
    #[error("loading {} failed: {source}", display_namespace(.namespace))]
    Load {
        namespace: Option<String>,
        #[source]
        source: Arc<Error>,
    },

    /// The request was refused before it reached the API server.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// A self-link or API path could not be parsed.
    #[error("invalid api link: {0:?}")]
    InvalidApiLink(String),

    /// Auto-registration was attached to a registry twice.
    #[error("auto-registration is already initialized")]
    AlreadyInitialized,

    /// Persisted state could not be encoded or decoded.
    #[error("storage encoding failed: {0}")]
    Storage(#[from] serde_json::Error),

    /// Persisted state could not be read or written.
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the namespace whose list request failed, if this is a load failure.
    pub fn failed_namespace(&self) -> Option<&str> {
        match self {
            Error::Load { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }
}

fn display_namespace(namespace: &Option<String>) -> String {
    match namespace {
        Some(namespace) => format!("namespace {namespace}"),
        None => "all namespaces".to_owned(),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
