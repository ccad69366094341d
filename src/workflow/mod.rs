//! Composition agents: no model of their own, only their children's streams.

pub mod looping;
pub mod parallel;
pub mod sequential;

pub use looping::LoopAgent;
pub use parallel::ParallelAgent;
pub use sequential::SequentialAgent;
