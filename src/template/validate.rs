use crate::error::CoreError;
use crate::models::DataSourceCategory;

/// Destructive keywords rejected anywhere in raw (pre-substitution) query
/// text, case-insensitively.
///
/// This is a lightweight denylist, not a SQL parser; it cannot catch every
/// injection vector.
pub const DENY_LIST: [&str; 11] = [
    "DROP TABLE",
    "DELETE FROM",
    "TRUNCATE",
    "ALTER TABLE",
    "CREATE TABLE",
    "INSERT INTO",
    "UPDATE ",
    "EXEC",
    "EXECUTE",
    "SP_",
    "XP_",
];

/// Validate raw query text before any rendering or network call.
///
/// Checks, in order: non-blank text, the destructive-keyword denylist, then
/// the category-specific shape rule (relational and time-series SQL must start
/// with SELECT, document commands must not carry delete/drop verbs, search
/// and HTTP requests must start with GET or POST).
pub fn validate_query(text: &str, category: DataSourceCategory) -> Result<(), CoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::QueryRejected("Query text is empty".into()));
    }

    let upper = trimmed.to_uppercase();
    for keyword in DENY_LIST {
        if upper.contains(keyword) {
            return Err(CoreError::QueryRejected(format!(
                "Query contains forbidden keyword '{}'",
                keyword.trim()
            )));
        }
    }

    match category {
        DataSourceCategory::Relational | DataSourceCategory::TimeSeries => {
            if !upper.starts_with("SELECT") {
                return Err(CoreError::QueryRejected(
                    "Only SELECT statements are allowed for this data source".into(),
                ));
            }
        }
        DataSourceCategory::Document => {
            if upper.contains("DELETE") || upper.contains("DROP") {
                return Err(CoreError::QueryRejected(
                    "Delete and drop commands are not allowed for document stores".into(),
                ));
            }
        }
        DataSourceCategory::Search | DataSourceCategory::HttpApi => {
            if !upper.starts_with("GET") && !upper.starts_with("POST") {
                return Err(CoreError::QueryRejected(
                    "Request text must start with GET or POST".into(),
                ));
            }
        }
        DataSourceCategory::Graph | DataSourceCategory::MessageQueue => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_text() {
        assert!(validate_query("   ", DataSourceCategory::Relational).is_err());
        assert!(validate_query("", DataSourceCategory::HttpApi).is_err());
    }

    #[test]
    fn rejects_denylisted_keywords_regardless_of_category() {
        assert!(validate_query("DROP TABLE users", DataSourceCategory::Relational).is_err());
        assert!(validate_query("drop table users", DataSourceCategory::Document).is_err());
        assert!(validate_query(
            "SELECT * FROM x; DELETE FROM y",
            DataSourceCategory::Relational
        )
        .is_err());
        assert!(validate_query(
            "SELECT * FROM t; TRUNCATE t2",
            DataSourceCategory::TimeSeries
        )
        .is_err());
    }

    #[test]
    fn accepts_parameterized_select_for_relational() {
        assert!(validate_query(
            "SELECT * FROM users WHERE id = ${id}",
            DataSourceCategory::Relational
        )
        .is_ok());
    }

    #[test]
    fn relational_requires_select_prefix() {
        assert!(validate_query("SHOW TABLES", DataSourceCategory::Relational).is_err());
        assert!(validate_query(
            "  select 1",
            DataSourceCategory::Relational
        )
        .is_ok());
    }

    #[test]
    fn document_store_rejects_delete_and_drop_verbs() {
        assert!(validate_query(
            r#"{"deleteMany": "users"}"#,
            DataSourceCategory::Document
        )
        .is_err());
        assert!(validate_query(
            r#"{"find": "users", "filter": {"age": {"$gt": 21}}}"#,
            DataSourceCategory::Document
        )
        .is_ok());
    }

    #[test]
    fn search_requires_get_or_post() {
        assert!(validate_query(
            "GET /logs/_search {\"query\": {\"match_all\": {}}}",
            DataSourceCategory::Search
        )
        .is_ok());
        assert!(validate_query(
            "POST /logs/_search {}",
            DataSourceCategory::Search
        )
        .is_ok());
        assert!(validate_query("PUT /logs/_doc/1 {}", DataSourceCategory::Search).is_err());
    }
}
