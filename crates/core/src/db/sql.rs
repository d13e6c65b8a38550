//! Named SQL templates and the transaction handle handed to processors.

use std::collections::HashMap;

use rusqlite::{Connection, Params};

use crate::errors::DatabaseError;

/// Template that appends one row to the history ledger.
///
/// Parameters: `?1` action, `?2` item id, `?3` item path, `?4` user, `?5` timestamp.
pub const UPDATE_HISTORY: &str = "update_history";

/// Template that enqueues one item for publishing.
///
/// Parameters: `?1` item id, `?2` action, `?3` path depth, `?4` timestamp.
pub const UPDATE_PUBLISH_QUEUE: &str = "update_publish_queue";

const DEFAULT_HISTORY_SQL: &str = "INSERT INTO history (category, action, item_id, item_path, user_name, created_at)
     VALUES ('item', ?1, ?2, ?3, ?4, ?5)";

const DEFAULT_PUBLISH_QUEUE_SQL: &str =
    "INSERT INTO publish_queue (item_id, action, path_depth, queued_at) VALUES (?1, ?2, ?3, ?4)";

/// Registry of named SQL snippets used by the load pipeline.
///
/// The defaults target the bundled schema; deployments with a different
/// ledger layout override individual templates by name.
#[derive(Debug, Clone)]
pub struct SqlTemplates {
    templates: HashMap<String, String>,
}

impl Default for SqlTemplates {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(UPDATE_HISTORY.to_string(), DEFAULT_HISTORY_SQL.to_string());
        templates.insert(
            UPDATE_PUBLISH_QUEUE.to_string(),
            DEFAULT_PUBLISH_QUEUE_SQL.to_string(),
        );
        Self { templates }
    }
}

impl SqlTemplates {
    /// Register or replace a template.
    pub fn with_template(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.templates.insert(name.into(), sql.into());
        self
    }

    pub fn get(&self, name: &str) -> Result<&str, DatabaseError> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| DatabaseError::TemplateNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

/// Borrowed view of an open connection or transaction.
///
/// Validators see the connection before the write transaction opens;
/// in-transaction synchronizers see the write transaction itself, so their
/// statements commit or roll back together with the load.
pub struct TxHandle<'a> {
    conn: &'a Connection,
    templates: &'a SqlTemplates,
}

impl<'a> TxHandle<'a> {
    pub fn new(conn: &'a Connection, templates: &'a SqlTemplates) -> Self {
        Self { conn, templates }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn template(&self, name: &str) -> Result<&str, DatabaseError> {
        self.templates.get(name)
    }

    /// Execute a statement, returning the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, DatabaseError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params)?)
    }

    /// Execute a named template.
    pub fn execute_template<P: Params>(&self, name: &str, params: P) -> Result<usize, DatabaseError> {
        let sql = self.templates.get(name)?;
        self.execute(sql, params)
    }

    /// Run a query returning a single integer.
    pub fn query_count<P: Params>(&self, sql: &str, params: P) -> Result<i64, DatabaseError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.query_row(params, |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use rusqlite::params;

    #[test]
    fn test_default_templates_resolve() {
        let templates = SqlTemplates::default();
        assert!(templates.get(UPDATE_HISTORY).is_ok());
        assert!(templates.get(UPDATE_PUBLISH_QUEUE).is_ok());
        assert!(matches!(
            templates.get("update_link_database"),
            Err(DatabaseError::TemplateNotFound(name)) if name == "update_link_database"
        ));
    }

    #[test]
    fn test_execute_template_writes_history() {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        let templates = SqlTemplates::default();
        {
            let conn = db.conn();
            let tx = TxHandle::new(&conn, &templates);
            let rows = tx
                .execute_template(
                    UPDATE_HISTORY,
                    params!["created", "item-1", "/sitecore/content", "admin", "2026-01-01T00:00:00Z"],
                )
                .unwrap();
            assert_eq!(rows, 1);
            assert_eq!(tx.query_count("SELECT COUNT(*) FROM history", []).unwrap(), 1);
        }
        let history = db.list_history(10).unwrap();
        assert_eq!(history[0].user_name, "admin");
    }

    #[test]
    fn test_override_template() {
        let templates = SqlTemplates::default().with_template(UPDATE_HISTORY, "SELECT 1");
        assert_eq!(templates.get(UPDATE_HISTORY).unwrap(), "SELECT 1");
    }
}
