use crate::response::ResearchResponse;
use agent::llm::Message;
use agent::{Agent, Error, Result, StructuredOutputParser};

/// One answered query.
#[derive(Debug, Clone)]
pub struct Turn {
    pub query: String,
    pub response: ResearchResponse,
}

/// The answered turns of a session, oldest first. Only successful turns are
/// recorded.
#[derive(Debug, Default)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    fn record(&mut self, query: &str, response: ResearchResponse) {
        self.turns.push(Turn {
            query: query.to_string(),
            response,
        });
    }

    fn messages(&self) -> impl Iterator<Item = Message> + '_ {
        self.turns.iter().flat_map(|turn| {
            [
                Message::User(turn.query.clone()),
                Message::Assistant(turn.response.history_text(), vec![]),
            ]
        })
    }
}

pub struct Session {
    agent: Agent,
    parser: StructuredOutputParser<ResearchResponse>,
    system_prompt: String,
}

impl Session {
    pub fn new(agent: Agent, prompt: &str) -> Result<Self> {
        let parser = StructuredOutputParser::new();
        let system_prompt = format!("{}\n\n{}", parser.format_instructions()?, prompt);

        Ok(Self {
            agent,
            parser,
            system_prompt,
        })
    }

    /// Answers `query` in the context of `history`. The history comes back
    /// with the new turn appended on success and untouched on failure.
    pub async fn turn(
        &mut self,
        mut history: History,
        query: &str,
    ) -> (History, Result<ResearchResponse>) {
        match self.respond(&history, query).await {
            Ok(response) => {
                history.record(query, response.clone());
                (history, Ok(response))
            }
            Err(e) => (history, Err(e)),
        }
    }

    async fn respond(&mut self, history: &History, query: &str) -> Result<ResearchResponse> {
        let mut messages = vec![Message::System(self.system_prompt.clone())];
        messages.extend(history.messages());
        messages.push(Message::User(query.to_string()));

        let messages = self.agent.run(messages).await?;

        match messages.last() {
            Some(Message::Assistant(output, _)) => self.parser.parse(output),
            _ => Err(Error::LLMResponseError(
                "agent finished without an answer".to_string(),
            )),
        }
    }
}
