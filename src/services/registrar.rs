use std::sync::Arc;

use crate::error::AppError;
use crate::models::{QueryExecution, TableDescriptor, ViewDescriptor};
use crate::services::query_runner::QueryRunner;
use crate::storage::ObjectStorage;
use crate::validation::IdentifierSanitizer;

const CSV_SERDE: &str = "org.apache.hadoop.hive.serde2.OpenCSVSerde";

/// Builds catalog DDL and submits it through the query runner
pub struct CatalogRegistrar {
    runner: Arc<QueryRunner>,
    storage: Arc<dyn ObjectStorage>,
}

impl CatalogRegistrar {
    pub fn new(runner: Arc<QueryRunner>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { runner, storage }
    }

    pub fn create_database_sql(database: &str) -> String {
        format!("CREATE DATABASE IF NOT EXISTS {};", database)
    }

    pub fn create_table_sql(database: &str, table: &TableDescriptor) -> String {
        let columns = table
            .columns
            .iter()
            .map(|column| format!("`{}` {}", column.name, column.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        let delimiter = IdentifierSanitizer::quote_literal(&table.delimiter.as_char().to_string());

        format!(
            "CREATE EXTERNAL TABLE IF NOT EXISTS\n  {}.{} ({})\n  ROW FORMAT SERDE '{}'\n  WITH SERDEPROPERTIES ('serialization.format' = {d}, 'separatorChar' = {d}, 'field.delim' = {d})\n  LOCATION {}\n  TBLPROPERTIES ('skip.header.line.count'='1');",
            database,
            table.name,
            columns,
            CSV_SERDE,
            IdentifierSanitizer::quote_literal(&table.location),
            d = delimiter,
        )
    }

    /// Sibling `views/` prefix of a CSV directory: the directory's last
    /// segment is replaced by `views/`
    pub fn views_prefix(csv_directory: &str) -> String {
        match csv_directory.rfind('/') {
            Some(idx) => format!("{}/views/", &csv_directory[..idx]),
            None => "views/".to_string(),
        }
    }

    /// Substitute positional `{}` placeholders with `args`, in order.
    ///
    /// `{0}`/`{1}` address arguments explicitly and `{{`/`}}` are literal
    /// braces. Placeholders beyond the supplied arguments are an error.
    pub fn render_template(template: &str, args: &[&str]) -> Result<String, AppError> {
        let mut rendered = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        let mut next_auto = 0;

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    rendered.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    rendered.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        field.push(inner);
                    }
                    if !closed {
                        return Err(AppError::MalformedInput(
                            "View template has an unclosed '{'".to_string(),
                        ));
                    }

                    let index = if field.is_empty() {
                        next_auto += 1;
                        next_auto - 1
                    } else {
                        field.trim().parse::<usize>().map_err(|_| {
                            AppError::MalformedInput(format!(
                                "View template placeholder '{{{}}}' is not positional",
                                field
                            ))
                        })?
                    };

                    let value = args.get(index).ok_or_else(|| {
                        AppError::MalformedInput(format!(
                            "View template refers to placeholder {} but only {} values are supplied",
                            index,
                            args.len()
                        ))
                    })?;
                    rendered.push_str(value);
                }
                '}' => {
                    return Err(AppError::MalformedInput(
                        "View template has a single '}' outside a placeholder".to_string(),
                    ));
                }
                _ => rendered.push(c),
            }
        }

        Ok(rendered)
    }

    pub async fn register_database(&self, database: &str) -> Result<QueryExecution, AppError> {
        self.runner.run(&Self::create_database_sql(database)).await
    }

    pub async fn register_table(
        &self,
        database: &str,
        table: &TableDescriptor,
    ) -> Result<QueryExecution, AppError> {
        tracing::info!(
            "Registering table {}.{} with {} columns at {}",
            database,
            table.name,
            table.columns.len(),
            table.location
        );
        self.runner.run(&Self::create_table_sql(database, table)).await
    }

    /// Render and run every view template found next to the table's directory.
    ///
    /// The listing index names each view, so a changed listing renames views
    /// on the next run. `object_store` listings never include directory
    /// markers, so every listed key is a template.
    pub async fn register_views(
        &self,
        bucket: &str,
        csv_directory: &str,
        table: &TableDescriptor,
    ) -> Result<Vec<(ViewDescriptor, QueryExecution)>, AppError> {
        let prefix = Self::views_prefix(csv_directory);
        let keys = self.storage.list_keys(bucket, &prefix).await?;
        tracing::info!("Found {} objects under s3://{}/{}", keys.len(), bucket, prefix);

        let mut registered = Vec::new();
        for (index, key) in keys.into_iter().enumerate() {
            let body = self.storage.get_object(bucket, &key).await?;
            let template = String::from_utf8(body).map_err(|e| {
                AppError::MalformedInput(format!("View template {} is not UTF-8: {}", key, e))
            })?;

            let name = ViewDescriptor::name_for(&table.name, index);
            let sql = Self::render_template(&template, &[&name, &table.name])?;
            let execution = self.runner.run(&sql).await?;

            registered.push((
                ViewDescriptor {
                    name,
                    index,
                    template_key: key,
                    sql,
                },
                execution,
            ));
        }

        Ok(registered)
    }
}
