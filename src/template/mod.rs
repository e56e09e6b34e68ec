//! Text-template engine used to evaluate placeholders.
//!
//! The dialect is the familiar `{{ … }}` one: field paths, pipelines,
//! `if`/`range`/`with` blocks, variables and function calls. Functions are
//! the builtins in [`funcs`] plus whatever is in the [`HelperTable`] the
//! engine was built with.

pub mod error;
mod exec;
mod funcs;
pub mod helpers;
mod lexer;
mod parse;
pub mod value;

use serde::{Deserialize, Serialize};

use crate::render::image::ImageHandle;

pub use error::{Result, TemplateError};
pub use helpers::{register_helper, Helper, HelperError, HelperTable};
pub use parse::Template;
pub use value::Value;

/// Part-level services available to helpers and to image printing
pub trait PartContext {
    /// Name of the part being rendered, e.g. `word/document.xml`
    fn part_name(&self) -> &str;

    /// Relationship id for an external hyperlink, registering it on first use
    fn hyperlink(&mut self, url: &str) -> String;

    /// Registers the image as a media part and returns the markup that
    /// closes the current text node, draws the image and reopens a text node.
    fn embed_image(&mut self, image: &ImageHandle) -> std::result::Result<String, String>;
}

/// Context for templates evaluated outside any document
#[derive(Debug, Default)]
pub struct Detached {
    links: Vec<String>,
}

impl Detached {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs handed out by [`PartContext::hyperlink`], in id order
    pub fn links(&self) -> &[String] {
        &self.links
    }
}

impl PartContext for Detached {
    fn part_name(&self) -> &str {
        ""
    }

    fn hyperlink(&mut self, url: &str) -> String {
        let index = match self.links.iter().position(|u| u == url) {
            Some(i) => i,
            None => {
                self.links.push(url.to_string());
                self.links.len() - 1
            }
        };
        format!("rId{}", index + 1)
    }

    fn embed_image(&mut self, _image: &ImageHandle) -> std::result::Result<String, String> {
        Err("images can only be placed inside a document part".to_string())
    }
}

/// What an undefined field evaluates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKey {
    /// Render as nothing
    #[default]
    Empty,
    /// Fail with an undefined-field error
    Error,
}

/// Compiles and runs templates against a helper table
#[derive(Debug, Clone)]
pub struct Engine {
    helpers: HelperTable,
    missing_key: MissingKey,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine over a snapshot of the process-wide helpers
    pub fn new() -> Self {
        Self::with_helpers(HelperTable::global())
    }

    pub fn with_helpers(helpers: HelperTable) -> Self {
        Self {
            helpers,
            missing_key: MissingKey::default(),
        }
    }

    pub fn missing_key(mut self, policy: MissingKey) -> Self {
        self.missing_key = policy;
        self
    }

    pub fn helpers(&self) -> &HelperTable {
        &self.helpers
    }

    pub fn helpers_mut(&mut self) -> &mut HelperTable {
        &mut self.helpers
    }

    /// Whether `name` can be called from a template
    pub fn is_function(&self, name: &str) -> bool {
        self.helpers.contains(name) || funcs::is_builtin(name)
    }

    pub fn parse(&self, text: &str) -> Result<Template> {
        Template::parse(text, &|name| self.is_function(name))
    }

    /// Runs a parsed template
    pub fn render(&self, template: &Template, data: &Value, cx: &mut dyn PartContext) -> Result<String> {
        exec::run(self, template, data, cx)
    }

    /// Parses and runs `text` in one go
    pub fn execute(&self, text: &str, data: &Value, cx: &mut dyn PartContext) -> Result<String> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        let template = self.parse(text)?;
        self.render(&template, data, cx)
    }
}

/// Evaluates `text` outside any document with the process-wide helpers
pub fn execute(text: &str, data: &Value) -> Result<String> {
    Engine::new().execute(text, data, &mut Detached::new())
}
