pub use http::StatusCode;
use snafu::Snafu;

/// The `Result` type returned by a `ClusterGateway`.
pub type Result<T> = std::result::Result<T, Error>;

/// How the caller should treat a failed cluster operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Network trouble, throttling or an overloaded API server. Safe to retry.
    Transient,
    /// The object does not exist. Deletes treat this as success.
    NotFound,
    /// The object already exists, or is in the middle of being deleted.
    Conflict,
    /// Admission or validation refused the request.
    Rejected,
    Other,
}

/// The error type returned by a `ClusterGateway`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to initialize the Kubernetes client: {}", source))]
    Initialization { source: kube::Error },

    #[snafu(display("Unable to read kubeconfig: {}", source))]
    Kubeconfig {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to {} {} '{}': {}", method, what, name, source))]
    KubeApiCall {
        /// The verb we were attempting, e.g. 'delete'.
        method: String,
        /// The kind of object, e.g. 'namespace'.
        what: String,
        /// The name of the object, or the namespace for list calls.
        name: String,
        source: kube::Error,
    },
}

impl Error {
    /// Classify this error so callers can decide between retrying, ignoring and failing.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Initialization { .. } | Error::Kubeconfig { .. } => ErrorKind::Other,
            Error::KubeApiCall { source, .. } => classify(source),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Maps a kube-rs error onto an `ErrorKind` using the response status code where the API server
/// gave one, and the transport failure otherwise.
pub fn classify(error: &kube::Error) -> ErrorKind {
    match error.status_code() {
        Some(StatusCode::NOT_FOUND) => ErrorKind::NotFound,
        Some(StatusCode::CONFLICT) => ErrorKind::Conflict,
        Some(StatusCode::BAD_REQUEST)
        | Some(StatusCode::FORBIDDEN)
        | Some(StatusCode::UNPROCESSABLE_ENTITY) => ErrorKind::Rejected,
        Some(StatusCode::TOO_MANY_REQUESTS)
        | Some(StatusCode::INTERNAL_SERVER_ERROR)
        | Some(StatusCode::BAD_GATEWAY)
        | Some(StatusCode::SERVICE_UNAVAILABLE)
        | Some(StatusCode::GATEWAY_TIMEOUT) => ErrorKind::Transient,
        Some(_) => ErrorKind::Other,
        None => match error {
            kube::Error::HyperError(_) | kube::Error::Service(_) => ErrorKind::Transient,
            _ => ErrorKind::Other,
        },
    }
}

/// The HTTP status the API server answered with, if the failure got that far.
pub trait HttpStatusCode {
    fn status_code(&self) -> Option<StatusCode>;
}

impl HttpStatusCode for kube::Error {
    fn status_code(&self) -> Option<StatusCode> {
        match self {
            kube::Error::Api(response) => StatusCode::from_u16(response.code).ok(),
            _ => None,
        }
    }
}

/// Treat a `NotFound` failure as an absent value instead of an error.
pub trait AllowNotFound<T> {
    fn allow_not_found<F>(self, on_not_found: F) -> Result<Option<T>>
    where
        F: FnOnce(&Error);
}

impl<T> AllowNotFound<T> for Result<T> {
    fn allow_not_found<F>(self, on_not_found: F) -> Result<Option<T>>
    where
        F: FnOnce(&Error),
    {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                on_not_found(&e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
