use crate::llm::Message;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use crate::{Error, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

const SEARCH_TOOL: &str = "search";
const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; research-assistant/0.1)";
const NO_RESULTS: &str = "No good DuckDuckGo Search Result was found";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl std::fmt::Display for SearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}\n{}", self.title, self.url, self.snippet)
    }
}

/// Web search through DuckDuckGo's html endpoint. Needs no api key.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(max_results: usize) -> Result<Box<Self>> {
        Self::with_endpoint(ENDPOINT, max_results)
    }

    pub fn with_endpoint(endpoint: &str, max_results: usize) -> Result<Box<Self>> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Box::new(Self {
            client,
            endpoint: endpoint.to_string(),
            max_results,
        }))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        tracing::debug!(query, "searching the web");

        let html = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_results(&html, self.max_results)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::SearchError(format!("bad selector {}: {:?}", css, e)))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.result")?;
    let title_sel = selector("a.result__a")?;
    let url_sel = selector(".result__url")?;
    let snippet_sel = selector(".result__snippet")?;

    let results = document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&title_sel).next()?;
            let title = text_of(link);
            if title.is_empty() {
                return None;
            }

            let url = match result.select(&url_sel).next().map(text_of) {
                Some(url) if url.starts_with("http") => url,
                Some(url) if !url.is_empty() => format!("https://{}", url),
                _ => link.value().attr("href").unwrap_or_default().to_string(),
            };

            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(text_of)
                .unwrap_or_default();

            Some(SearchResult {
                title,
                url,
                snippet,
            })
        })
        .take(max_results)
        .collect();

    Ok(results)
}

#[derive(Deserialize, JsonSchema)]
struct SearchArgs {
    /// What to look up on the internet
    query: String,
}

#[async_trait]
impl FunctionalTool for DuckDuckGoSearch {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<SearchArgs>(
            SEARCH_TOOL,
            "Useful for when you need to do a search on the internet to find information about a query.",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: SearchArgs = call.args()?;
        let results = self.search(&args.query).await?;

        let result = if results.is_empty() {
            NO_RESULTS.to_string()
        } else {
            results
                .iter()
                .map(SearchResult::to_string)
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        Ok(Message::Tool {
            id: call.id.clone(),
            name: SEARCH_TOOL.to_string(),
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{SearchResult, parse_results};
    use crate::Result;

    const PAGE: &str = r##"
        <html><body>
          <div class="result results_links web-result">
            <div class="links_main result__body">
              <h2 class="result__title">
                <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.postgresql.org%2F">PostgreSQL: The World's
                  Most Advanced Open Source Database</a>
              </h2>
              <a class="result__url" href="//duckduckgo.com/l/?uddg=x"> www.postgresql.org </a>
              <a class="result__snippet" href="#">PostgreSQL is a powerful, <b>open source</b> object-relational database.</a>
            </div>
          </div>
          <div class="result results_links web-result">
            <div class="links_main result__body">
              <h2 class="result__title"><a class="result__a" href="https://docs.rs/sqlx">sqlx - Rust</a></h2>
            </div>
          </div>
          <div class="result result--ad">
            <div class="links_main result__body"></div>
          </div>
        </body></html>
    "##;

    #[test]
    fn test_parse_results() -> Result<()> {
        let results = parse_results(PAGE, 10)?;

        assert_eq!(
            results,
            vec![
                SearchResult {
                    title: "PostgreSQL: The World's Most Advanced Open Source Database".to_string(),
                    url: "https://www.postgresql.org".to_string(),
                    snippet: "PostgreSQL is a powerful, open source object-relational database."
                        .to_string(),
                },
                SearchResult {
                    title: "sqlx - Rust".to_string(),
                    url: "https://docs.rs/sqlx".to_string(),
                    snippet: String::new(),
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn test_parse_results_limit_and_empty() -> Result<()> {
        assert_eq!(parse_results(PAGE, 1)?.len(), 1);
        assert!(parse_results("<html><body>nothing</body></html>", 5)?.is_empty());
        Ok(())
    }
}
