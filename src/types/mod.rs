pub mod job;
pub mod priority;
pub mod protocol;
pub mod serialisable;
pub mod states;
