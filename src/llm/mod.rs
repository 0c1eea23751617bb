pub mod deepseek;
pub mod mock;
pub mod provider;
pub mod types;


pub use deepseek::DeepSeekProvider;
pub use mock::MockProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};
