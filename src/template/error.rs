use thiserror::Error;

use crate::error::{Error as DocError, ErrorKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("line {line}: {message}")]
    Syntax {
        message: String,
        line: usize,
        tag: Option<String>,
    },

    #[error("line {line}: function {name:?} not defined")]
    UndefinedFunction {
        name: String,
        line: usize,
        tag: Option<String>,
    },

    #[error("invalid helper name {0:?}")]
    InvalidHelperName(String),

    #[error("line {line}: map has no entry for key {key:?}")]
    MissingKey {
        key: String,
        line: usize,
        tag: Option<String>,
    },

    #[error("line {line}: {message}")]
    Execution {
        message: String,
        line: usize,
        tag: Option<String>,
    },

    #[error("line {line}: {message}")]
    Image {
        message: String,
        line: usize,
        tag: Option<String>,
    },
}

impl TemplateError {
    /// Source text of the action that failed, when known
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Syntax { tag, .. }
            | Self::UndefinedFunction { tag, .. }
            | Self::MissingKey { tag, .. }
            | Self::Execution { tag, .. }
            | Self::Image { tag, .. } => tag.as_deref(),
            Self::InvalidHelperName(_) => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::SyntaxError,
            Self::UndefinedFunction { .. } | Self::InvalidHelperName(_) => {
                ErrorKind::InvalidFunction
            }
            Self::MissingKey { .. } => ErrorKind::UndefinedField,
            Self::Execution { .. } => ErrorKind::ExecutionError,
            Self::Image { .. } => ErrorKind::ImageError,
        }
    }

    /// Hints shown to template authors
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Syntax { message, .. } if message.contains("unexpected EOF") => {
                vec!["every {{if}}, {{range}} and {{with}} needs a matching {{end}}".to_string()]
            }
            Self::Syntax { message, .. } if message.contains("unexpected {{end}}") => {
                vec!["remove the extra {{end}} or add the block it closes".to_string()]
            }
            Self::Syntax { .. } => vec![
                "check the placeholder for typos; string literals need straight double quotes"
                    .to_string(),
            ],
            Self::UndefinedFunction { name, .. } => vec![format!(
                "register {:?} with Document::register_helper before rendering",
                name
            )],
            Self::InvalidHelperName(_) => vec![
                "helper names must start with a letter or '_' and contain only letters, digits and '_'"
                    .to_string(),
            ],
            Self::MissingKey { key, .. } => vec![
                format!("add {:?} to the data", key),
                "or render with missingKey = \"empty\"".to_string(),
            ],
            Self::Execution { .. } => Vec::new(),
            Self::Image { .. } => {
                vec!["image placeholders must be the only content of a text run".to_string()]
            }
        }
    }

    pub(crate) fn syntax(message: impl Into<String>, line: usize, tag: Option<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
            tag,
        }
    }

    pub(crate) fn execution(message: impl Into<String>, line: usize, tag: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            line,
            tag,
        }
    }
}

impl From<TemplateError> for DocError {
    fn from(err: TemplateError) -> Self {
        let mut out = DocError::new(err.kind(), err.to_string());
        if let Some(tag) = err.tag() {
            out = out.with_placeholder(tag);
        }
        for hint in err.suggestions() {
            out = out.with_suggestion(hint);
        }
        out.with_cause(err)
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
