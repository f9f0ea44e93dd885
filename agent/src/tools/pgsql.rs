use crate::llm::Message;
use crate::tools::{FunctionalTool, NoArgs, Tool, ToolCall, ToolDefinition};
use crate::{Error, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::postgres::{
    PgConnectOptions, PgConnection, PgHasArrayType, PgRow, PgTypeInfo, PgTypeKind, Postgres,
};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, Connection, Decode, Row as _, Type, TypeInfo};

const FIND_TABLES: &str =
    "SELECT table_name::text FROM information_schema.tables WHERE table_schema = 'public'";

const FIND_COLUMNS: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 \
     ORDER BY ordinal_position";

const TABLE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_name = $1)";

/// One result row of [`PgSqlTool::run_query`], keyed by column name in
/// select-list order.
pub type Row = serde_json::Map<String, Value>;

/// Connection parameters, fixed for the lifetime of a [`PgSqlTool`].
#[derive(Clone)]
pub struct PgSqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for PgSqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub column_data_type: String,
}

/// Read-only access to a PostgreSQL database.
///
/// Every operation opens its own connection and closes it before returning,
/// whether the work succeeded or not. Connections are never pooled or shared
/// between calls.
#[derive(Clone)]
pub struct PgSqlTool {
    options: PgConnectOptions,
}

impl PgSqlTool {
    pub fn new(config: &PgSqlConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        Self { options }
    }

    async fn connect(&self) -> Result<PgConnection> {
        Ok(PgConnection::connect_with(&self.options).await?)
    }

    /// Names of all tables in the `public` schema.
    pub async fn find_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;
        let tables = sqlx::query_scalar::<_, String>(FIND_TABLES)
            .fetch_all(&mut conn)
            .await;
        release(conn).await;

        Ok(tables?)
    }

    /// Columns of a `public` table in declaration order.
    ///
    /// Returns [`Error::TableNotFound`] when the table does not exist, so an
    /// unknown table is not mistaken for a table without columns.
    pub async fn find_columns(&self, table_name: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut conn = self.connect().await?;
        let columns = describe_table(&mut conn, table_name).await;
        release(conn).await;

        columns
    }

    /// Runs `query` inside a read-only transaction and returns every row.
    ///
    /// Statements that would end or change that transaction, such as
    /// `COMMIT` or `SET TRANSACTION`, fail with [`Error::RejectedQuery`]
    /// before any connection is opened.
    pub async fn run_query(&self, query: &str) -> Result<Vec<Row>> {
        check_read_query(query)?;

        let mut conn = self.connect().await?;
        let rows = read_only(&mut conn, query).await;
        release(conn).await;

        rows
    }

    fn find_tables_tool(&self) -> Box<FindTablesTool> {
        Box::new(FindTablesTool(self.clone()))
    }

    fn find_columns_tool(&self) -> Box<FindColumnsTool> {
        Box::new(FindColumnsTool(self.clone()))
    }

    fn run_query_tool(&self) -> Box<RunQueryTool> {
        Box::new(RunQueryTool(self.clone()))
    }

    pub fn tools(&self) -> Vec<Box<dyn Tool + Send>> {
        vec![
            self.find_tables_tool(),
            self.find_columns_tool(),
            self.run_query_tool(),
        ]
    }
}

async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "database connection did not close cleanly");
    }
}

async fn describe_table(
    conn: &mut PgConnection,
    table_name: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let columns: Vec<ColumnDescriptor> = sqlx::query_as::<_, (String, String)>(FIND_COLUMNS)
        .bind(table_name)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|(column_name, column_data_type)| ColumnDescriptor {
            column_name,
            column_data_type,
        })
        .collect();

    if columns.is_empty() {
        let exists = sqlx::query_scalar::<_, bool>(TABLE_EXISTS)
            .bind(table_name)
            .fetch_one(&mut *conn)
            .await?;

        if !exists {
            return Err(Error::TableNotFound(table_name.to_string()));
        }
    }

    Ok(columns)
}

/// Statements that would end or reconfigure the read-only transaction
/// `run_query` wraps the caller's SQL in.
const TRANSACTION_CONTROL: &[&str] = &[
    "ABORT", "BEGIN", "COMMIT", "END", "PREPARE", "RELEASE", "RESET", "ROLLBACK", "SAVEPOINT",
    "SET", "START",
];

/// First keyword of `query`, upper-cased, skipping leading whitespace and
/// SQL comments.
fn leading_keyword(query: &str) -> String {
    let mut rest = query;
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map(|(_, after)| after).unwrap_or("");
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map(|(_, after)| after).unwrap_or("");
        } else {
            break;
        }
    }

    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn check_read_query(query: &str) -> Result<()> {
    let keyword = leading_keyword(query);
    if TRANSACTION_CONTROL.contains(&keyword.as_str()) {
        return Err(Error::RejectedQuery(format!(
            "{} statements are not allowed",
            keyword
        )));
    }
    Ok(())
}

async fn read_only(conn: &mut PgConnection, query: &str) -> Result<Vec<Row>> {
    // dropping the transaction on an early return rolls it back
    let mut tx = conn.begin().await?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;

    let rows = sqlx::query(query).fetch_all(&mut *tx).await?;
    tx.commit().await?;

    Ok(rows.iter().map(row_to_json).collect())
}

fn row_to_json(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let value = column_value(row, column.ordinal(), column.type_info());
            (column.name().to_string(), value)
        })
        .collect()
}

#[derive(Clone, Copy)]
enum Shape {
    Scalar,
    Array,
}

fn column_value(row: &PgRow, index: usize, type_info: &PgTypeInfo) -> Value {
    // domains and enums share the binary format of their base type and text,
    // so they are decoded without sqlx's type check
    let value = match type_info.kind() {
        PgTypeKind::Domain(base) => decode(row, index, base.name(), Shape::Scalar, true),
        PgTypeKind::Array(element) => decode(row, index, element.name(), Shape::Array, false),
        PgTypeKind::Enum(_) => decode(row, index, "TEXT", Shape::Scalar, true),
        _ => decode(row, index, type_info.name(), Shape::Scalar, false),
    };

    value.unwrap_or_else(|e| {
        tracing::debug!(
            column = index,
            type_name = type_info.name(),
            error = %e,
            "undecodable column, using null"
        );
        Value::Null
    })
}

fn decode(
    row: &PgRow,
    index: usize,
    type_name: &str,
    shape: Shape,
    unchecked: bool,
) -> sqlx::Result<Value> {
    let column = Field {
        row,
        index,
        shape,
        unchecked,
    };

    match type_name {
        "BOOL" => column.get::<bool>(|v| json!(v)),
        "INT2" => column.get::<i16>(|v| json!(v)),
        "INT4" => column.get::<i32>(|v| json!(v)),
        "INT8" => column.get::<i64>(|v| json!(v)),
        "FLOAT4" => column.get::<f32>(|v| json!(v)),
        "FLOAT8" => column.get::<f64>(|v| json!(v)),
        // kept as text so no precision is lost
        "NUMERIC" => column.get::<BigDecimal>(|v| json!(v.to_string())),
        "JSON" | "JSONB" => column.get::<Value>(|v| v),
        "TIMESTAMPTZ" => column.get::<DateTime<Utc>>(|v| json!(v.to_rfc3339())),
        "TIMESTAMP" => column.get::<NaiveDateTime>(|v| json!(v.to_string())),
        "DATE" => column.get::<NaiveDate>(|v| json!(v.to_string())),
        "TIME" => column.get::<NaiveTime>(|v| json!(v.to_string())),
        "UUID" => column.get::<Uuid>(|v| json!(v.to_string())),
        _ => column.get::<String>(|v| json!(v)),
    }
}

struct Field<'r> {
    row: &'r PgRow,
    index: usize,
    shape: Shape,
    unchecked: bool,
}

impl<'r> Field<'r> {
    fn raw<T>(&self) -> sqlx::Result<T>
    where
        T: Decode<'r, Postgres> + Type<Postgres>,
    {
        if self.unchecked {
            self.row.try_get_unchecked(self.index)
        } else {
            self.row.try_get(self.index)
        }
    }

    fn get<T>(&self, to_json: fn(T) -> Value) -> sqlx::Result<Value>
    where
        T: for<'a> Decode<'a, Postgres> + Type<Postgres> + PgHasArrayType,
    {
        let value = match self.shape {
            Shape::Scalar => self.raw::<Option<T>>()?.map(to_json),
            Shape::Array => self.raw::<Option<Vec<Option<T>>>>()?.map(|items| {
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| item.map(to_json).unwrap_or(Value::Null))
                        .collect(),
                )
            }),
        };

        Ok(value.unwrap_or(Value::Null))
    }
}

/// Hands a database outcome back to the model. Failures are logged and
/// answered with an empty list since the model cannot act on them.
fn tool_response<T: Serialize>(
    call: &ToolCall,
    name: &str,
    outcome: Result<Vec<T>>,
) -> Result<Message> {
    let data = outcome.unwrap_or_else(|e| {
        tracing::warn!(tool = name, error = %e, "database tool failed, answering with no data");
        Vec::new()
    });

    Ok(Message::Tool {
        id: call.id.clone(),
        name: name.to_string(),
        result: serde_json::to_string(&data)?,
    })
}

struct FindTablesTool(PgSqlTool);

const FIND_TABLES_TOOL: &str = "find_tables_inside_database_pgsql";

#[async_trait]
impl FunctionalTool for FindTablesTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<NoArgs>(
            FIND_TABLES_TOOL,
            "Useful for when you need to find the schema and tables of your database",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let _: NoArgs = call.args()?;
        tool_response(call, FIND_TABLES_TOOL, self.0.find_tables().await)
    }
}

#[derive(Deserialize, JsonSchema)]
struct FindColumnsArgs {
    /// Name of a table in the public schema
    table_name: String,
}

struct FindColumnsTool(PgSqlTool);

const FIND_COLUMNS_TOOL: &str = "find_table_column_name_and_datatype";

#[async_trait]
impl FunctionalTool for FindColumnsTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<FindColumnsArgs>(
            FIND_COLUMNS_TOOL,
            "Useful for when you need to find all the columns and column datatypes of a particular table inside postgresql db. Pass the table name as table_name and it returns a list of objects with columnName and columnDataType",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: FindColumnsArgs = call.args()?;
        tool_response(
            call,
            FIND_COLUMNS_TOOL,
            self.0.find_columns(&args.table_name).await,
        )
    }
}

#[derive(Deserialize, JsonSchema)]
struct RunQueryArgs {
    /// A single read-only SQL statement
    query: String,
}

struct RunQueryTool(PgSqlTool);

const RUN_QUERY_TOOL: &str = "run_read_only_query_pgsql";

#[async_trait]
impl FunctionalTool for RunQueryTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<RunQueryArgs>(
            RUN_QUERY_TOOL,
            "Useful for when you need to read data from the postgresql db. Pass one SQL SELECT statement as query; it runs in a read-only transaction and returns the rows as a list of objects",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: RunQueryArgs = call.args()?;
        tool_response(call, RUN_QUERY_TOOL, self.0.run_query(&args.query).await)
    }
}
