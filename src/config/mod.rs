//! Configuration types.
//!
//! - `target` - Probe targets (`ServiceTarget`, `Protocol`)
//! - `policy` - Wait policy (`WaitPolicy`, `DeadlineScope`)
//! - `settings` - Environment-driven settings (`Settings`, `Dependency`)
//! - `environment` - Deployment environment (`Environment`)
//! - `duration` - Human-readable duration parsing

mod duration;
mod environment;
mod policy;
mod settings;
mod target;

pub use duration::*;
pub use environment::*;
pub use policy::*;
pub use settings::*;
pub use target::*;
