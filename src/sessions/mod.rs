pub mod memory;
pub mod store;

pub use memory::MemorySessionStore;
pub use store::{ChatTurn, Session, SessionStore};
