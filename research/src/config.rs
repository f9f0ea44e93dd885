use agent::Result;
use agent::tools::PgSqlConfig;
use clap::{Args, Parser};
use std::path::PathBuf;

const DEFAULT_PROMPT: &str = include_str!("prompts/research.md");

/// Research assistant with web search and read-only PostgreSQL access
#[derive(Parser)]
#[command(name = "research-assistant")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub llm: LlmArgs,

    /// Replaces the built-in system prompt
    #[arg(long, env = "RESEARCH_PROMPT_FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Maximum number of model calls per query
    #[arg(long, default_value_t = 15)]
    pub max_iterations: usize,

    /// Maximum number of web search results handed to the model
    #[arg(long, default_value_t = 5)]
    pub search_results: usize,

    /// Print the agent transcript and debug logs to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn system_prompt(&self) -> Result<String> {
        match &self.prompt_file {
            Some(path) => Ok(std::fs::read_to_string(path)?),
            None => Ok(DEFAULT_PROMPT.to_string()),
        }
    }
}

#[derive(Args)]
pub struct DatabaseArgs {
    #[arg(long = "pg-host", env = "PGSQL_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "pg-port", env = "PGSQL_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long = "pg-username", env = "PGSQL_USERNAME", default_value = "postgres")]
    pub username: String,

    #[arg(
        long = "pg-password",
        env = "PGSQL_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,

    #[arg(long = "pg-database", env = "PGSQL_DATABASE")]
    pub database: String,
}

impl DatabaseArgs {
    pub fn config(&self) -> PgSqlConfig {
        PgSqlConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
    }
}

#[derive(Args)]
pub struct LlmArgs {
    /// Chat model to use
    #[arg(long, env = "RESEARCH_MODEL", default_value = "gemini-2.0-flash")]
    pub model: String,

    /// Base url of an OpenAI compatible chat completions api
    #[arg(
        long,
        env = "RESEARCH_API_BASE",
        default_value = "https://generativelanguage.googleapis.com/v1beta/openai"
    )]
    pub api_base: String,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: String,
}
