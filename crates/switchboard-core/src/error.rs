use http::StatusCode;

/// Domain errors that know how to present themselves over HTTP
///
/// Feature crates implement this for their error enums so the HTTP layer
/// can render a response without the domain crate depending on axum.
pub trait HttpError: std::error::Error {
    /// Status code returned to the client
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `rate_limit_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Whether the failure originated on our side or further downstream
    fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}
