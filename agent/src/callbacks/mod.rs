use crate::Result;
use crate::llm::Message;
use async_trait::async_trait;

mod transcript;
pub use transcript::Transcript;

/// Runs after every agent step and may rewrite the message history.
#[async_trait]
pub trait Callback {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>>;
}
