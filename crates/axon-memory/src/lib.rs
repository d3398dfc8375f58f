pub mod long_term;
pub mod session;
pub mod working;

pub use long_term::LongTermMemory;
pub use session::SessionMemory;
pub use working::WorkingMemory;
