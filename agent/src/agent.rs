use crate::callbacks;
use crate::llm;
use crate::tools;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub trait StopCondition {
    fn done(&self, history: &[llm::Message]) -> bool;
}

/// Stops once the model answers without asking for any tool.
pub struct FinalAnswer;

impl StopCondition for FinalAnswer {
    fn done(&self, history: &[llm::Message]) -> bool {
        matches!(history.last(), Some(llm::Message::Assistant(_, tool_calls)) if tool_calls.is_empty())
    }
}

type Tool = Box<dyn tools::Tool + Send>;
type Callback = Box<dyn callbacks::Callback + Send>;

pub struct Agent {
    llm: Arc<dyn llm::LLM + Send + Sync>,
    tools: HashMap<String, Tool>,
    callbacks: Vec<Callback>,
    tool_defs: Vec<tools::ToolDefinition>,
    stop_condition: Box<dyn StopCondition + Send>,
    max_iterations: Option<usize>,
}

impl Agent {
    async fn execute_tool_call(
        &mut self,
        tool_call: &tools::ToolCall,
        messages: &mut Vec<llm::Message>,
    ) -> Result<()> {
        let tool = self
            .tools
            .get_mut(&tool_call.name)
            .ok_or(Error::ToolDoesNotExist(tool_call.name.clone()))?;

        tracing::debug!(tool = %tool_call.name, args = %tool_call.args, "invoking tool");

        tool.invoke(tool_call, messages).await
    }

    /// Runs completions and tool calls until the stop condition holds and
    /// returns the full message history. Tool failures are handed back to
    /// the model as tool results; llm failures end the run.
    pub async fn run(&mut self, mut messages: Vec<llm::Message>) -> Result<Vec<llm::Message>> {
        let mut iterations = 0;

        while !self.stop_condition.done(&messages) {
            if let Some(max) = self.max_iterations {
                if iterations >= max {
                    return Err(Error::IterationLimit(max));
                }
            }
            iterations += 1;

            let next = self
                .llm
                .completion(llm::CompletionRequest {
                    messages: &messages,
                    tools: &self.tool_defs,
                })
                .await?;

            messages.push(llm::Message::Assistant(
                next.content,
                next.tool_calls.clone(),
            ));

            for tool_call in &next.tool_calls {
                if let Err(e) = self.execute_tool_call(tool_call, &mut messages).await {
                    tracing::warn!(tool = %tool_call.name, error = %e, "tool call failed");
                    messages.push(llm::Message::Tool {
                        id: tool_call.id.clone(),
                        name: tool_call.name.clone(),
                        result: format!("Error: {}", e),
                    });
                }
            }

            for callback in &mut self.callbacks {
                messages = callback.call(messages).await?;
            }
        }

        Ok(messages)
    }
}

pub struct AgentBuilder {
    llm: Option<Arc<dyn llm::LLM + Send + Sync>>,
    tools: Vec<Tool>,
    callbacks: Vec<Callback>,
    stop_condition: Option<Box<dyn StopCondition + Send>>,
    max_iterations: Option<usize>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            tools: Vec::new(),
            callbacks: Vec::new(),
            stop_condition: None,
            max_iterations: None,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn llm::LLM + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn stop_condition(mut self, cond: Box<dyn StopCondition + Send>) -> Self {
        self.stop_condition = Some(cond);
        self
    }

    /// Caps the number of completions per run.
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut tool_defs = Vec::new();
        let mut tools = HashMap::new();

        for tool in self.tools {
            let def = tool.definition()?;
            tools.insert(def.name.clone(), tool);
            tool_defs.push(def);
        }

        Ok(Agent {
            llm: self
                .llm
                .ok_or(Error::MissingArg("llm is required for agent".to_string()))?,
            tools,
            tool_defs,
            callbacks: self.callbacks,
            stop_condition: self.stop_condition.ok_or(Error::MissingArg(
                "stop_condition is required for agent".to_string(),
            ))?,
            max_iterations: self.max_iterations,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
