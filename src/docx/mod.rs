pub mod blank;
pub mod body;
pub mod content_types;
mod document;
pub mod package;
pub mod relationships;
pub mod xml;

pub use body::Body;
pub use content_types::ContentTypes;
pub use document::{Document, PeripheralPart};
pub use package::{Package, PartKind};
pub use relationships::{Relationship, Relationships, TargetMode};
