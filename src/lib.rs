// Export modules for use in tests
pub mod capture;
pub mod engine;
pub mod export;
pub mod panic_handler;
pub mod render;
pub mod session;
pub mod settings;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the session surface
pub use session::{ScriptStep, Session, SessionOptions};
