pub mod scheduler;
pub mod sweep;

pub use scheduler::SweepScheduler;
pub use sweep::sweep_orphans;
