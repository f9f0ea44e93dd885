use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The answer to one research query. Field names and order are what the
/// model is told to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchResponse {
    pub topic: String,
    pub summary: String,
    pub sources: Vec<String>,
    pub tools_used: Vec<String>,
    pub research_time: String,
}

impl ResearchResponse {
    /// Flattens the response into the assistant text kept in the
    /// conversation history.
    pub fn history_text(&self) -> String {
        format!(
            "{}\n\nTopic: {}\nSources: {}\nTools used: {}\nResearch time: {}",
            self.summary,
            self.topic,
            self.sources.join(", "),
            self.tools_used.join(", "),
            self.research_time
        )
    }
}
