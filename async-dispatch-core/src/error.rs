//! Friendly errors and saga error processing
//!
//! Every error raised inside a saga is converted into a [`FriendlyError`]
//! before it reaches state: a symbolic [`ErrorCode`] plus a message that can be
//! shown to a user as-is.
//!
//! # Example
//!
//! ```ignore
//! let classifier = ErrorClassifier::new()
//!     .add_extractor(connectivity_extractor)
//!     .add_extractor(rpc_extractor);
//!
//! // inside a saga
//! let failure = classifier
//!     .handle(error)
//!     .on_any_error(|friendly| LOAD_ISPS.failure(friendly, None, None))
//!     .process()?;
//! ctx.put(Action::IspLoadAll(failure))?;
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Boxed error accepted at saga boundaries
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Known error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConnectivityProblems,
    InternalError,
    MethodNotAllowed,
    NotImplemented,
    ResourceNotFound,
    Timeout,
    ValidationError,
    TooManyResults,
    InvalidAddress,
    NotSupported,
    Unknown,
}

/// Message used when nothing more specific is registered for a code
pub const SOMETHING_UNEXPECTED: &str = "Something unexpected has happened";

impl ErrorCode {
    /// Default English message for this code
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ConnectivityProblems => "There are some connectivity problems",
            ErrorCode::Timeout => {
                "The operation has timed out. \nPlease check your internet connection"
            }
            ErrorCode::TooManyResults => "Too many results",
            ErrorCode::InvalidAddress => "Address is invalid",
            ErrorCode::InternalError
            | ErrorCode::MethodNotAllowed
            | ErrorCode::NotImplemented
            | ErrorCode::ResourceNotFound
            | ErrorCode::ValidationError
            | ErrorCode::NotSupported
            | ErrorCode::Unknown => SOMETHING_UNEXPECTED,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ConnectivityProblems => "CONNECTIVITY_PROBLEMS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::TooManyResults => "TOO_MANY_RESULTS",
            ErrorCode::InvalidAddress => "INVALID_ADDRESS",
            ErrorCode::NotSupported => "NOT_SUPPORTED",
            ErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// An error with a known code and a UI-friendly message.
///
/// `detail` keeps the text of the underlying error, if any, for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct FriendlyError {
    pub code: ErrorCode,
    pub message: String,
    pub detail: Option<String>,
}

impl FriendlyError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Friendly error carrying the default message of `code`
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Extracts an error code from an arbitrary error, `None` if not recognized.
pub type ErrorCodeExtractor =
    Arc<dyn Fn(&(dyn StdError + 'static)) -> Option<ErrorCode> + Send + Sync>;

/// Produces the friendly message for an error of a known code.
pub type MessageRetriever = Arc<dyn Fn(&(dyn StdError + 'static)) -> String + Send + Sync>;

/// Ordered set of code extractors and message overrides, shared by all sagas.
#[derive(Clone, Default)]
pub struct ErrorClassifier {
    extractors: Vec<ErrorCodeExtractor>,
    messages: HashMap<ErrorCode, MessageRetriever>,
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("extractors", &self.extractors.len())
            .field("messages", &self.messages.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extractor. Extractors run in registration order.
    pub fn add_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> Option<ErrorCode> + Send + Sync + 'static,
    {
        self.extractors.push(Arc::new(extractor));
        self
    }

    /// Register an extractor that runs before all existing ones.
    pub fn add_extractor_first<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> Option<ErrorCode> + Send + Sync + 'static,
    {
        self.extractors.insert(0, Arc::new(extractor));
        self
    }

    /// Override the message for a code.
    pub fn add_message<F>(mut self, code: ErrorCode, retriever: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> String + Send + Sync + 'static,
    {
        self.messages.insert(code, Arc::new(retriever));
        self
    }

    /// First extractor that recognizes the error (or any of its sources) wins.
    pub fn classify(&self, error: &(dyn StdError + 'static)) -> ErrorCode {
        for extractor in &self.extractors {
            let mut current: Option<&(dyn StdError + 'static)> = Some(error);
            while let Some(err) = current {
                if let Some(code) = extractor(err) {
                    return code;
                }
                current = err.source();
            }
        }
        ErrorCode::Unknown
    }

    /// Convert any error into a friendly one.
    ///
    /// A [`FriendlyError`] anywhere in the source chain is returned untouched.
    pub fn friendly(&self, error: &(dyn StdError + 'static)) -> FriendlyError {
        if let Some(friendly) = find_friendly(error) {
            return friendly.clone();
        }

        let code = self.classify(error);
        let message = match self.messages.get(&code) {
            Some(retriever) => retriever(error),
            None => code.default_message().to_string(),
        };

        FriendlyError::new(code, message).with_detail(error.to_string())
    }

    /// Start processing a single error.
    pub fn handle<'a, A>(&'a self, error: impl Into<BoxError>) -> ErrorHandler<'a, A> {
        ErrorHandler {
            classifier: self,
            error: error.into(),
            messages: HashMap::new(),
            flows: HashMap::new(),
            on_any: None,
        }
    }
}

/// First [`FriendlyError`] in the source chain of `error`
pub fn find_friendly<'e>(error: &'e (dyn StdError + 'static)) -> Option<&'e FriendlyError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(friendly) = err.downcast_ref::<FriendlyError>() {
            return Some(friendly);
        }
        current = err.source();
    }
    None
}

/// Raised when an [`ErrorHandler`] is processed without an any-error callback.
#[derive(Debug, thiserror::Error)]
#[error("error handler configuration is invalid: no any-error handler registered (while handling: {original})")]
pub struct HandlerConfigError {
    pub original: String,
}

type FlowHandler<'a, A> = Box<dyn FnOnce(FriendlyError) -> A + Send + 'a>;

/// Per-error processing pipeline built from an [`ErrorClassifier`].
///
/// Turns the error into the action that should be dispatched for it,
/// typically the `failure` phase of the async action that was running.
pub struct ErrorHandler<'a, A> {
    classifier: &'a ErrorClassifier,
    error: BoxError,
    messages: HashMap<ErrorCode, MessageRetriever>,
    flows: HashMap<ErrorCode, FlowHandler<'a, A>>,
    on_any: Option<FlowHandler<'a, A>>,
}

impl<'a, A> ErrorHandler<'a, A> {
    /// Override the message for `code`, for this error only.
    pub fn add_message<F>(mut self, code: ErrorCode, retriever: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> String + Send + Sync + 'static,
    {
        self.messages.insert(code, Arc::new(retriever));
        self
    }

    /// Handle errors of `code` with a dedicated callback instead of the any-error one.
    pub fn on_error<F>(mut self, code: ErrorCode, flow: F) -> Self
    where
        F: FnOnce(FriendlyError) -> A + Send + 'a,
    {
        self.flows.insert(code, Box::new(flow));
        self
    }

    /// Callback used for every code without a dedicated handler. Required.
    pub fn on_any_error<F>(mut self, flow: F) -> Self
    where
        F: FnOnce(FriendlyError) -> A + Send + 'a,
    {
        self.on_any = Some(Box::new(flow));
        self
    }

    /// Classify the error and produce the resulting action.
    pub fn process(mut self) -> Result<A, HandlerConfigError> {
        let Some(on_any) = self.on_any.take() else {
            let err = HandlerConfigError {
                original: self.error.to_string(),
            };
            tracing::warn!(error = %err, "Saga error handler misconfigured");
            return Err(err);
        };

        tracing::info!(error = %self.error, "Saga error");

        let error: &(dyn StdError + 'static) = &*self.error;
        let mut friendly = self.classifier.friendly(error);

        let already_friendly = find_friendly(error).is_some();
        if !already_friendly {
            if let Some(retriever) = self.messages.get(&friendly.code) {
                friendly.message = retriever(error);
            }
        }

        match self.flows.remove(&friendly.code) {
            Some(flow) => Ok(flow(friendly)),
            None => Ok(on_any(friendly)),
        }
    }
}
