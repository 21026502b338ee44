mod intentions;

pub use intentions::*;
