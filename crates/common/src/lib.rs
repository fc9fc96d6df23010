pub mod context;
pub mod envelope;
pub mod error;
pub mod money;
pub mod symbols;
pub mod telemetry;
pub mod timez;

pub use context::UserContext;
pub use envelope::{Envelope, ErrorBody};
pub use error::{AppError, ErrorCode};
