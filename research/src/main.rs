mod config;
mod response;
mod session;

use agent::callbacks::Transcript;
use agent::tools::{DuckDuckGoSearch, PgSqlTool};
use agent::{AgentBuilder, FinalAnswer, Result};
use clap::Parser;
use session::{History, Session};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const FIRST_PROMPT: &str = "How can I help you?: ";
const NEXT_PROMPT: &str = "Tell me more: ";

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,agent=debug,research_assistant=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = config::Cli::parse();
    init_tracing(cli.verbose);

    let database = cli.database.config();
    tracing::info!(?database, model = %cli.llm.model, "starting research assistant");

    let llm = agent::llm::OpenAI::with_endpoint(
        cli.llm.model.clone(),
        &cli.llm.api_base,
        &cli.llm.api_key,
    );

    let mut builder = AgentBuilder::new()
        .llm(llm)
        .tool(DuckDuckGoSearch::new(cli.search_results)?)
        .tools(PgSqlTool::new(&database).tools())
        .stop_condition(Box::new(FinalAnswer))
        .max_iterations(cli.max_iterations);

    if cli.verbose {
        builder = builder.callback(Transcript::new(std::io::stderr()));
    }

    let mut session = Session::new(builder.build()?, &cli.system_prompt()?)?;
    let mut history = History::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let prompt = if history.turns().is_empty() {
            FIRST_PROMPT
        } else {
            NEXT_PROMPT
        };
        print!("{}", prompt);
        std::io::stdout().flush()?;

        let Some(query) = lines.next_line().await? else {
            println!();
            break;
        };
        if query.trim().is_empty() {
            continue;
        }

        let (next, response) = session.turn(history, query.trim()).await;
        history = next;

        match response {
            Ok(response) => println!("{}", response.summary),
            Err(e) => tracing::error!(error = %e, "could not answer query"),
        }
    }

    Ok(())
}
