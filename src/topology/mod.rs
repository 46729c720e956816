//! Mesh topology in LDU form.
//!
//! A level mesh is the cell graph ([`ldu_addressing::LduAddressing`]) plus the
//! coupled interfaces through which it talks to neighbouring ranks or to the
//! other side of a cyclic patch pair.

pub mod compact_list_list;
pub mod interfaces;
pub mod ldu_addressing;
pub mod primitive_mesh;

pub use compact_list_list::CompactListList;
pub use ldu_addressing::LduAddressing;
pub use primitive_mesh::LduPrimitiveMesh;
