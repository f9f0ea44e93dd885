use crate::{Error, Result};
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

const FORMAT_INSTRUCTIONS: &str = "The output should be formatted as a JSON instance that conforms to the JSON schema below.

As an example, for the schema {\"properties\": {\"foo\": {\"title\": \"Foo\", \"description\": \"a list of strings\", \"type\": \"array\", \"items\": {\"type\": \"string\"}}}, \"required\": [\"foo\"]}
the object {\"foo\": [\"bar\", \"baz\"]} is a well-formatted instance of the schema. The object {\"properties\": {\"foo\": [\"bar\", \"baz\"]}} is not well-formatted.

Here is the output schema:
```
";

/// Tells the model which JSON shape to answer with, and turns its final
/// answer back into a `T`.
pub struct StructuredOutputParser<T> {
    _output: PhantomData<fn() -> T>,
}

impl<T> StructuredOutputParser<T>
where
    T: JsonSchema + DeserializeOwned,
{
    pub fn new() -> Self {
        Self {
            _output: PhantomData,
        }
    }

    pub fn format_instructions(&self) -> Result<String> {
        let schema = serde_json::to_string(&schema_for!(T))?;
        Ok(format!(
            "{}{}\n```\nAnswer with that JSON instance only, no other text.",
            FORMAT_INSTRUCTIONS, schema
        ))
    }

    /// Fails with [`Error::OutputParseError`] unless `text` holds a JSON
    /// object matching `T`. Markdown fences and prose around the object are
    /// ignored.
    pub fn parse(&self, text: &str) -> Result<T> {
        let json = json_object(text).ok_or_else(|| {
            Error::OutputParseError(format!("no JSON object in output: {:?}", text))
        })?;

        serde_json::from_str(json)
            .map_err(|e| Error::OutputParseError(format!("{} in output: {:?}", e, text)))
    }
}

impl<T> Default for StructuredOutputParser<T>
where
    T: JsonSchema + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
