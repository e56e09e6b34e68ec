use std::fmt;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category of a failure surfaced by the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The archive is unreadable or has no `word/document.xml`
    CorruptContainer,
    /// Reading an input (file, archive entry, image) failed
    ReadError,
    /// A placeholder could not be parsed as a template action
    SyntaxError,
    /// A `{{` was not closed inside its paragraph
    UnclosedTag,
    /// A `}}` appeared without a preceding `{{`
    UnmatchedEnd,
    /// A field lookup failed while the strict missing-key policy is active
    UndefinedField,
    /// A template called a function that is not registered, or registration used a bad name
    InvalidFunction,
    /// Template evaluation failed
    ExecutionError,
    /// The caller's data could not be converted into a template tree
    DataConversion,
    /// An image could not be read, probed or re-encoded
    ImageError,
    /// Writing the output archive failed
    WriteError,
}

impl ErrorKind {
    /// Stable identifier, handy for logs and JSON error payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::CorruptContainer => "CORRUPT_CONTAINER",
            Self::ReadError => "READ_ERROR",
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::UnclosedTag => "UNCLOSED_TAG",
            Self::UnmatchedEnd => "UNMATCHED_END",
            Self::UndefinedField => "UNDEFINED_FIELD",
            Self::InvalidFunction => "INVALID_FUNCTION",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::DataConversion => "DATA_CONVERSION",
            Self::ImageError => "IMAGE_ERROR",
            Self::WriteError => "WRITE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CorruptContainer => "corrupt container",
            Self::ReadError => "read error",
            Self::SyntaxError => "syntax error",
            Self::UnclosedTag => "unclosed tag",
            Self::UnmatchedEnd => "unmatched end",
            Self::UndefinedField => "undefined field",
            Self::InvalidFunction => "invalid function",
            Self::ExecutionError => "execution error",
            Self::DataConversion => "data conversion error",
            Self::ImageError => "image error",
            Self::WriteError => "write error",
        };
        f.write_str(name)
    }
}

/// Error returned by every fallible operation of the crate
///
/// Besides the kind and message it records where the failure happened
/// (`body` or a part name such as `word/header1.xml`), the placeholder that
/// caused it when one can be attributed, and hints for template authors.
#[derive(Debug, Error)]
#[error("{kind}: {message}{}{}", fmt_location(.location), fmt_placeholder(.placeholder))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    location: Option<String>,
    placeholder: Option<String>,
    #[source]
    cause: Option<BoxError>,
    suggestions: Vec<String>,
}

fn fmt_location(location: &Option<String>) -> String {
    match location {
        Some(loc) => format!(" (in {})", loc),
        None => String::new(),
    }
}

fn fmt_placeholder(placeholder: &Option<String>) -> String {
    match placeholder {
        Some(tag) => format!(" at `{}`", tag),
        None => String::new(),
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            placeholder: None,
            cause: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the location unless a more specific one was already recorded
    pub fn or_location(mut self, location: impl Into<String>) -> Self {
        if self.location.is_none() {
            self.location = Some(location.into());
        }
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptContainer, message)
    }

    pub(crate) fn write(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WriteError, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::ReadError, err.to_string()).with_cause(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io_err) => io_err.into(),
            other => Self::corrupt(other.to_string()).with_cause(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location_and_placeholder() {
        let err = Error::new(ErrorKind::SyntaxError, "unexpected \"}}\"")
            .with_location("word/header1.xml")
            .with_placeholder("{{if}}");
        assert_eq!(
            err.to_string(),
            "syntax error: unexpected \"}}\" (in word/header1.xml) at `{{if}}`"
        );
    }

    #[test]
    fn test_or_location_keeps_first() {
        let err = Error::new(ErrorKind::ExecutionError, "boom")
            .with_location("body")
            .or_location("word/footer1.xml");
        assert_eq!(err.location(), Some("body"));
    }

    #[test]
    fn test_zip_io_error_maps_to_read_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = zip::result::ZipError::Io(io).into();
        assert_eq!(err.kind(), ErrorKind::ReadError);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let kinds = [
            ErrorKind::CorruptContainer,
            ErrorKind::ReadError,
            ErrorKind::SyntaxError,
            ErrorKind::UnclosedTag,
            ErrorKind::UnmatchedEnd,
            ErrorKind::UndefinedField,
            ErrorKind::InvalidFunction,
            ErrorKind::ExecutionError,
            ErrorKind::DataConversion,
            ErrorKind::ImageError,
            ErrorKind::WriteError,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
