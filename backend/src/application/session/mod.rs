pub mod handle;
pub mod lifecycle;

pub use handle::SessionHandle;
pub use lifecycle::SessionLifecycle;
