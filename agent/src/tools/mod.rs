use crate::Result;
use crate::llm::Message;
use async_trait::async_trait;
use schemars::{JsonSchema, schema_for};

mod pgsql;
pub use pgsql::{ColumnDescriptor, PgSqlConfig, PgSqlTool, Row};

mod search;
pub use search::{DuckDuckGoSearch, SearchResult};

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub desc: String,
    pub params: serde_json::Value,
}

impl ToolDefinition {
    pub fn new<P: JsonSchema>(name: &str, desc: &str) -> Result<Self> {
        let schema = schema_for!(P);
        let params = serde_json::to_value(&schema.schema)?;
        Ok(Self {
            name: name.to_string(),
            desc: desc.to_string(),
            params,
        })
    }
}

/// Argument type for tools that take no input.
#[derive(serde::Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Clone, Debug, PartialEq, std::hash::Hash)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

impl ToolCall {
    pub fn args<O: for<'de> serde::Deserialize<'de>>(&self) -> Result<O> {
        // some models send an empty string instead of `{}` for argument-less tools
        let raw = match self.args.trim() {
            "" => "{}",
            args => args,
        };
        let args = serde_json::from_str(raw)?;
        Ok(args)
    }
}

impl std::fmt::Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {} ({})\n\t- `{}`\n", self.name, self.id, self.args)
    }
}

#[async_trait]
pub trait Tool {
    fn definition(&self) -> Result<ToolDefinition>;

    /// Runs the call and appends its result to `messages`.
    async fn invoke(&mut self, call: &ToolCall, messages: &mut Vec<Message>) -> Result<()>;
}

#[async_trait]
pub trait FunctionalTool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message>;
}

#[async_trait]
impl<T> Tool for T
where
    T: FunctionalTool + Send + Sync,
{
    fn definition(&self) -> Result<ToolDefinition> {
        FunctionalTool::definition(self)
    }

    async fn invoke(&mut self, call: &ToolCall, messages: &mut Vec<Message>) -> Result<()> {
        let result = FunctionalTool::invoke_fn(self, call).await?;
        messages.push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{NoArgs, ToolCall, ToolDefinition};
    use crate::Result;

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct LookupArgs {
        table_name: String,
    }

    fn call(args: &str) -> ToolCall {
        ToolCall {
            id: "call1".to_string(),
            name: "lookup".to_string(),
            args: args.to_string(),
        }
    }

    #[test]
    fn test_definition_schema() -> Result<()> {
        let def = ToolDefinition::new::<LookupArgs>("lookup", "look something up")?;

        assert_eq!(def.name, "lookup");
        assert_eq!(def.params["type"], "object");
        assert_eq!(def.params["properties"]["table_name"]["type"], "string");
        assert_eq!(def.params["required"][0], "table_name");

        let def = ToolDefinition::new::<NoArgs>("nothing", "takes nothing")?;
        assert_eq!(def.params["type"], "object");

        Ok(())
    }

    #[test]
    fn test_call_args() -> Result<()> {
        let args: LookupArgs = call("{\"table_name\":\"users\"}").args()?;
        assert_eq!(args.table_name, "users");

        let _: NoArgs = call("").args()?;
        let _: NoArgs = call("{}").args()?;

        assert!(call("users").args::<LookupArgs>().is_err());
        assert!(call("{}").args::<LookupArgs>().is_err());

        Ok(())
    }
}
