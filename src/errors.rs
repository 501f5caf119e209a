use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("not found: {message}")]
    NotFound { message: String, code: Option<String> },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("server returned {status}: {message}")]
    Server {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn from_status(status: StatusCode, message: Option<String>, code: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized { message },
            StatusCode::NOT_FOUND => ApiError::NotFound { message, code },
            StatusCode::CONFLICT => ApiError::Conflict { message },
            _ => ApiError::Server {
                status: status.as_u16(),
                message,
                code,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Conflict { .. } => Some(409),
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable code from the error body, if the API sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::NotFound { code, .. } | ApiError::Server { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message }
            | ApiError::NotFound { message, .. }
            | ApiError::Conflict { message }
            | ApiError::Server { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized { .. } => "Your session has expired. Please log in again.".into(),
            ApiError::Transport(_) => "Could not connect to the server.".into(),
            ApiError::Decode(_) => "The server sent an unexpected response.".into(),
            ApiError::Cancelled => "Request cancelled.".into(),
            other => other
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| "Something went wrong.".into()),
        }
    }
}

/// Client-side validation failures. None of these reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("All fields are required.")]
    MissingFields,

    #[error("{0} is required.")]
    Required(&'static str),

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Password must be at least {min} characters.")]
    PasswordTooShort { min: usize },

    #[error("Passwords do not match.")]
    PasswordMismatch,

    #[error("The token must be exactly 6 digits.")]
    MalformedToken,
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("another change to {id} is still in progress")]
    Busy { id: String },

    #[error("unknown task {id}")]
    UnknownTask { id: String },

    #[error("unknown project {id}")]
    UnknownProject { id: String },

    #[error("only the project manager can do that")]
    NotManager,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl BoardError {
    pub fn user_message(&self) -> String {
        match self {
            BoardError::Busy { .. } => "Please wait for the previous change to finish.".into(),
            BoardError::UnknownTask { .. } => "That task no longer exists.".into(),
            BoardError::UnknownProject { .. } => "That project no longer exists.".into(),
            BoardError::NotManager => "Only the project manager can do that.".into(),
            BoardError::Validation(e) => e.to_string(),
            BoardError::Api(e) => e.user_message(),
        }
    }
}

/// Errors from the login, registration and password reset flows.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The API refused; `message` is already worded for the user.
    #[error("{message}")]
    Rejected {
        message: String,
        #[source]
        source: ApiError,
    },

    #[error("{message}")]
    Unconfirmed { message: String },

    #[error("another request is still running")]
    Busy,

    #[error(transparent)]
    Session(#[from] ConfigError),
}

impl AuthError {
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Session(_) => "Could not save your session.".into(),
            AuthError::Busy => "Please wait for the current request to finish.".into(),
            other => other.to_string(),
        }
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            AuthError::Rejected { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid API url '{url}'")]
    InvalidUrl { url: String },

    #[error("no config directory available on this platform")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_known_codes() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, None, None);
        assert!(err.is_unauthorized());

        let err = ApiError::from_status(
            StatusCode::NOT_FOUND,
            Some("User not confirmed".into()),
            Some("USER_NOT_CONFIRMED".into()),
        );
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.code(), Some("USER_NOT_CONFIRMED"));
        assert_eq!(err.server_message(), Some("User not confirmed"));

        let err = ApiError::from_status(StatusCode::CONFLICT, Some("taken".into()), None);
        assert!(matches!(err, ApiError::Conflict { .. }));
    }

    #[test]
    fn from_status_falls_back_to_reason_phrase() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, None, None);
        assert_eq!(err.server_message(), Some("Internal Server Error"));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, Some("Title is required".into()), None);
        assert_eq!(err.user_message(), "Title is required");
        assert_eq!(
            ApiError::Unauthorized {
                message: "jwt expired".into()
            }
            .user_message(),
            "Your session has expired. Please log in again."
        );
    }

    #[test]
    fn board_error_wraps_validation() {
        let err: BoardError = ValidationError::Required("Title").into();
        assert_eq!(err.user_message(), "Title is required.");
    }
}
