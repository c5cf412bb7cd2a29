/// Byte cursors, relocation queues, the reference ledger, chunk framing and dictionaries
pub mod data;
/// Error definitions
pub mod error;
/// The CGFX container and the records it holds
pub mod models;
/// Settings that change how a file is saved
pub mod options;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;

pub use error::{CgfxError, CgfxResult};
pub use models::cgfx::Cgfx;
pub use options::SaveOptions;
