pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{InMemorySnapshot, InMemoryStorage};
pub use record::{EntityRecord, EntityUpdate, TransitionRecord};
pub use traits::PraxisStorage;
