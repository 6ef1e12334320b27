//! Cached model management: listing, downloads, and deletion.

mod store;
mod types;

pub use store::ModelStore;
pub use types::{
    ModelAction, ModelActionResult, ModelEntry, ModelListing, RuntimeNodeEntry, RuntimeNodeKind,
};
