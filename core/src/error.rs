use thiserror::Error;

/// JSON-RPC error codes used on both transports.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Server-defined: the request did not carry a valid token.
    pub const UNAUTHORIZED: i64 = -32000;
}

/// Failures of the protocol call itself, as opposed to failures of the tool
/// a well-formed call asked for. These always become a JSON-RPC `error`
/// object; tool failures never do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Parse error")]
    Parse,
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl ProtocolError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Parse => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::Internal(_) => codes::INTERNAL_ERROR,
            Self::Unauthorized => codes::UNAUTHORIZED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_jsonrpc_reserved_range() {
        assert_eq!(ProtocolError::Parse.code(), -32700);
        assert_eq!(ProtocolError::invalid_request("x").code(), -32600);
        assert_eq!(
            ProtocolError::MethodNotFound("foo/bar".to_string()).code(),
            -32601
        );
        assert_eq!(ProtocolError::invalid_params("x").code(), -32602);
        assert_eq!(ProtocolError::internal("x").code(), -32603);
        assert_eq!(ProtocolError::Unauthorized.code(), -32000);
    }

    #[test]
    fn method_not_found_names_the_method() {
        let err = ProtocolError::MethodNotFound("foo/bar".to_string());
        assert_eq!(err.to_string(), "Method not found: foo/bar");
    }
}
