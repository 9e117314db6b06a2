//! Configuration types, defaults and validation.

mod boxkeeper;
mod defaults;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use boxkeeper::*;
pub use defaults::*;
