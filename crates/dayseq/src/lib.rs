#![doc = include_str!("../README.md")]

mod allocator;
mod date;
mod error;
#[cfg(feature = "serde")]
mod serde;
mod serial;
mod store;

pub use crate::allocator::*;
pub use crate::date::*;
pub use crate::error::*;
pub use crate::serial::*;
pub use crate::store::*;
