pub mod event;
pub mod projection;

pub use event::{EventId, NewEvent, StoredEvent, StreamSpec, EMPTY_STREAM};
pub use projection::StoredProjection;
