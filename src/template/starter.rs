use crate::error::CoreError;
use crate::models::{JoinType, TableSelection};

/// Derive a starter SELECT template from a draft's table selections.
///
/// The primary selection anchors the FROM clause; the remaining selections
/// join onto it in position order using their declared join type and
/// condition. Selections without columns contribute `table.*`.
pub fn derive_query_template(selections: &[TableSelection]) -> Result<String, CoreError> {
    if selections.is_empty() {
        return Err(CoreError::Configuration(
            "At least one table selection is required".into(),
        ));
    }

    let mut ordered: Vec<&TableSelection> = selections.iter().collect();
    ordered.sort_by_key(|s| s.position);

    let primary = ordered
        .iter()
        .find(|s| s.primary)
        .ok_or_else(|| CoreError::Configuration("No primary table selected".into()))?;

    let mut columns = Vec::new();
    for selection in &ordered {
        if selection.columns.is_empty() {
            columns.push(format!("{}.*", selection.table_name));
        } else {
            for column in &selection.columns {
                columns.push(format!("{}.{}", selection.table_name, column));
            }
        }
    }

    let mut query = format!("SELECT {} FROM {}", columns.join(", "), primary.table_name);

    for selection in &ordered {
        if selection.primary {
            continue;
        }
        let condition = selection.join_condition.as_deref().ok_or_else(|| {
            CoreError::Configuration(format!(
                "Table '{}' is missing a join condition",
                selection.table_name
            ))
        })?;
        let join = selection.join_type.unwrap_or(JoinType::Inner);
        query.push_str(&format!(" {} {} ON {}", join, selection.table_name, condition));
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn selection(
        table: &str,
        columns: &[&str],
        primary: bool,
        join: Option<(JoinType, &str)>,
        position: u32,
    ) -> TableSelection {
        TableSelection {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            table_name: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary,
            join_type: join.map(|(t, _)| t),
            join_condition: join.map(|(_, c)| c.to_string()),
            position,
        }
    }

    #[test]
    fn single_primary_table() {
        let query =
            derive_query_template(&[selection("users", &["id", "name"], true, None, 0)]).unwrap();
        assert_eq!(query, "SELECT users.id, users.name FROM users");
    }

    #[test]
    fn joins_follow_position_order() {
        let query = derive_query_template(&[
            selection("orders", &["id", "total"], true, None, 0),
            selection(
                "users",
                &["name"],
                false,
                Some((JoinType::Left, "orders.user_id = users.id")),
                1,
            ),
        ])
        .unwrap();
        assert_eq!(
            query,
            "SELECT orders.id, orders.total, users.name FROM orders \
             LEFT JOIN users ON orders.user_id = users.id"
        );
    }

    #[test]
    fn empty_columns_expand_to_star() {
        let query = derive_query_template(&[selection("events", &[], true, None, 0)]).unwrap();
        assert_eq!(query, "SELECT events.* FROM events");
    }

    #[test]
    fn missing_primary_or_condition_is_an_error() {
        assert!(derive_query_template(&[]).is_err());
        assert!(derive_query_template(&[selection("users", &[], false, None, 0)]).is_err());
        assert!(derive_query_template(&[
            selection("orders", &[], true, None, 0),
            selection("users", &[], false, None, 1),
        ])
        .is_err());
    }
}
