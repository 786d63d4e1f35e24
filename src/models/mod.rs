//! Domain model module declarations.

pub mod job;
pub mod lane;
