//! Process lifecycle: termination signals and the shutdown token

mod shutdown;

pub use shutdown::ShutdownSignal;
