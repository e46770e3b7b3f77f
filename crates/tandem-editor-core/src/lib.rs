//! tandem-editor-core: Pure Rust editing model without CRDT dependencies.
//!
//! This crate provides:
//! - `Node` / `Document` - the element/text node tree
//! - `Path` - index paths from the document root, with operation transforms
//! - `Operation` - the atomic, path-addressed edits the editor produces
//! - `Editor` - applies operations and hands out ordered change batches

pub mod document;
pub mod editor;
pub mod error;
pub mod node;
pub mod operation;
pub mod path;
pub mod types;

pub use document::Document;
pub use editor::{ChangeBatch, ChangeOrigin, Editor};
pub use error::EditorError;
pub use node::{Element, Node, Props, TextLeaf, is_reserved_key, CHILDREN_KEY, TEXT_KEY};
pub use operation::Operation;
pub use path::Path;
pub use smol_str::SmolStr;
pub use types::{Point, Selection};
