//! Pattern-based evidence pulled from report text: explicit codes, section
//! boundaries, clinical mentions and patient header fields.

pub mod patterns;
pub mod sections;
pub mod mentions;
pub mod patient;
pub mod evidence;

pub use patterns::*;
pub use sections::*;
pub use mentions::*;
pub use patient::*;
pub use evidence::*;
