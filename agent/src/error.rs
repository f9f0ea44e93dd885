use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Openai error: {0}")]
    OpenaiError(#[from] OpenAIError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("No response from llm: {0}")]
    LLMResponseError(String),

    #[error("Could not parse llm output: {0}")]
    OutputParseError(String),

    #[error("Table {0} does not exist")]
    TableNotFound(String),

    #[error("Query rejected: {0}")]
    RejectedQuery(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Tool {0} does not exist")]
    ToolDoesNotExist(String),

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("Agent stopped after {0} iterations without a final answer")]
    IterationLimit(usize),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}
