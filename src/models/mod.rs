pub mod code;
pub mod enums;
pub mod report;

pub use code::*;
pub use enums::*;
pub use report::*;
