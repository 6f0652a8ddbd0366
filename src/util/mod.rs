pub mod clock;
pub mod fs;
pub mod id;
pub mod telemetry;

pub use clock::*;
pub use fs::*;
pub use id::*;
pub use telemetry::*;
