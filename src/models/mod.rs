mod account;
mod creation;

pub use account::*;
pub use creation::*;
