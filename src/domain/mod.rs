mod ledger;
mod money;
mod record;

pub use ledger::*;
pub use money::*;
pub use record::*;
