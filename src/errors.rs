use salvo::http::StatusCode;

/// Failures on the forwarding path. Each variant maps to one status code and
/// one fixed caller-facing message; the underlying detail is only logged.
#[derive(Debug)]
pub enum ForwardError {
    ReadBody,
    InvalidJson,
    CreateRequest,
    Connect,
    ReadResponse,
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ReadBody | Self::InvalidJson => StatusCode::BAD_REQUEST,
            Self::CreateRequest | Self::Connect | Self::ReadResponse => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ReadBody => "Failed to read request body",
            Self::InvalidJson => "Invalid JSON format",
            Self::CreateRequest => "Failed to create request",
            Self::Connect => "Failed to connect to upstream API",
            Self::ReadResponse => "Failed to read response",
        }
    }
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ForwardError {}
