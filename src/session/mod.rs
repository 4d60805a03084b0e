pub mod medium;
pub mod store;
pub mod types;

pub use medium::{FileMedium, KeyringMedium, MemoryMedium, SessionMedium};
pub use store::SessionStore;
pub use types::Session;
