pub mod projection;

pub use projection::ProjectionStore;
