mod intention;
mod validators;

pub use intention::*;
pub use validators::*;
