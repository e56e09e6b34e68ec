//! Render Word (.docx) documents from templates.
//!
//! Placeholders written in the document as `{{ … }}` are executed as a small
//! template language against caller data: field lookups, conditionals,
//! loops, builtins and helper functions such as `link`. Placeholders may be
//! split across runs by the editor; they are re-assembled before evaluation.
//! Strings that name image files become inline pictures.
//!
//! ```no_run
//! use docxtpl::Document;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Letter {
//!     name: String,
//!     items: Vec<String>,
//! }
//!
//! let mut doc = Document::open("letter.docx")?;
//! doc.render(&Letter {
//!     name: "Ada".to_string(),
//!     items: vec!["tea".to_string(), "cake".to_string()],
//! })?;
//! doc.save("letter-ada.docx")?;
//! # Ok::<(), docxtpl::Error>(())
//! ```

pub mod docx;
pub mod error;
pub mod render;
pub mod template;

pub use docx::Document;
pub use error::{Error, ErrorKind, Result};
pub use render::{normalize, ImageHandle, RenderOptions};
pub use template::{execute, register_helper, Engine, HelperTable, MissingKey, Value};
