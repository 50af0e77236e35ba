//! Deserializers for manifest backward compatibility.

mod item_or_vec;

pub use item_or_vec::*;
