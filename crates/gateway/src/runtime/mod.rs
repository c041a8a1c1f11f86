pub mod dispatch;
pub mod lifecycle;
pub mod registry;

pub use dispatch::Dispatcher;
pub use lifecycle::{LifecycleController, LifecycleError};
pub use registry::SessionRegistry;
