//! Path-addressable, dynamically typed document tree.
//!
//! A [`DataTree`] owns one tree of text-valued nodes; [`Data`] views
//! compose dot-paths fluently and read, write, merge, and serialize the
//! locations they name without ever copying the tree. One node shape
//! covers scalars, objects (labelled children) and arrays (ordered
//! unlabelled children), so JSON- and XML-shaped documents round-trip
//! through the same structure.
//!
//! ```
//! use datatree::DataTree;
//!
//! # fn main() -> datatree::TreeResult<()> {
//! let tree = DataTree::new();
//! tree.child("server").child("port").set(5432)?;
//! tree.child("tags").push("alpha")?;
//! tree.child("tags").push("beta")?;
//!
//! assert_eq!(tree.child("server").child("port").get::<u16>()?, 5432);
//! assert!(tree.child("tags").is_array());
//! assert_eq!(
//!     tree.to_json()?,
//!     r#"{"server":{"port":"5432"},"tags":["alpha","beta"]}"#
//! );
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod errors;
pub mod tree;
pub mod util;

mod display;
mod json;
mod store;
mod xml;

pub use data::{ChildIter, Data};
pub use errors::{TreeError, TreeResult};
pub use tree::DataTree;
