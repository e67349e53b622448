use opcmsg_codec::{ParamId, ParamValue, Status};

/// Failure reported by a [`DataProvider`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The parameter or method does not exist.
    #[error("no such parameter: {0}")]
    NotFound(String),

    /// The parameter exists but the value or arguments are not acceptable.
    #[error("invalid parameter: {0}")]
    Invalid(String),

    /// The application rejected a call with its own error code.
    #[error("application error {code}: {message}")]
    Application { code: i32, message: String },

    /// Any other provider failure.
    #[error("provider failure: {0}")]
    Internal(String),
}

impl ProviderError {
    pub fn not_found(id: &ParamId) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn application(code: i32, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
        }
    }

    /// Status carried by a failure response.
    ///
    /// `Application` maps to `InvalidParamValue` here; Call responses carry it
    /// as `ApplicationError` with the code and message instead.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::InvalidParameter,
            Self::Invalid(_) | Self::Application { .. } => Status::InvalidParamValue,
            Self::Internal(_) => Status::InvalidMessage,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Application data served by a [`MessageHandler`](crate::MessageHandler).
///
/// Read, write, subscribe and unsubscribe are called on the connection's
/// framing thread; calls run on a separate single worker. Implementations
/// therefore need interior mutability.
pub trait DataProvider: Send + Sync {
    fn read(&self, id: &ParamId) -> ProviderResult<ParamValue>;

    fn write(&self, id: &ParamId, value: ParamValue) -> ProviderResult<()>;

    fn subscribe(&self, id: &ParamId) -> ProviderResult<()>;

    fn unsubscribe(&self, id: &ParamId) -> ProviderResult<()>;

    fn call(
        &self,
        method_id: &ParamId,
        param_id: &ParamId,
        args: Vec<ParamValue>,
    ) -> ProviderResult<Vec<ParamValue>>;

    /// Called when the client disconnects. Drop subscriptions and stop any
    /// activity started on its behalf.
    fn reset(&self) {}
}
