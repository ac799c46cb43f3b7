mod file;
mod interface;
mod memory;

pub use file::*;
pub use interface::*;
pub use memory::*;
