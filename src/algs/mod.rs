//! Communication layer: point-to-point backends, wire types and the small
//! collectives built on top of them.

pub mod collectives;
pub mod communicator;
pub mod wire;

pub use communicator::Communicator;
