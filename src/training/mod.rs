/// Training infrastructure for PointNet
pub mod scheduler;
pub mod summary;
pub mod trainer;

pub use scheduler::{ExponentialDecay, ExponentialDecayConfig};
pub use summary::SummaryWriter;
pub use trainer::{install_interrupt_handler, RunState, Trainer};
