pub mod ledger;
pub mod market;

pub use ledger::*;
pub use market::*;
