use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Placeholder names in order of first appearance; duplicates collapse to one
/// entry.
pub fn placeholder_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Render a single bound value into query text.
///
/// Numbers render as their literal text; every other non-null value renders
/// single-quoted. Quotes inside string values are NOT escaped — a value
/// containing a single quote can break out of the literal. This matches the
/// documented behavior for trusted query authors and is intentionally not a
/// parameterized-query guarantee.
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => format!("'{}'", s),
        Some(Value::Bool(b)) => format!("'{}'", b),
        Some(other) => format!("'{}'", other),
    }
}

/// Substitute every `${name}` occurrence in `template` from `params`.
///
/// Missing parameters render as the literal `NULL`. Malformed syntax (a `${`
/// with no closing `}`) is left verbatim; avoiding it is the author's
/// responsibility. Rendering is pure: the same template and parameter map
/// always produce byte-identical output.
pub fn render(template: &str, params: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            render_value(params.get(&caps[1]))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn collects_names_in_first_appearance_order() {
        let names =
            placeholder_names("SELECT * FROM t WHERE a = ${b} AND c = ${a} AND d = ${b}");
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn numbers_render_unquoted() {
        let out = render(
            "id = ${id} AND score > ${score}",
            &params(&[("id", json!(42)), ("score", json!(3.5))]),
        );
        assert_eq!(out, "id = 42 AND score > 3.5");
    }

    #[test]
    fn strings_render_single_quoted() {
        let out = render(
            "name = ${name}",
            &params(&[("name", json!("alice"))]),
        );
        assert_eq!(out, "name = 'alice'");
    }

    #[test]
    fn missing_parameter_renders_null() {
        let out = render("id = ${userId}", &params(&[]));
        assert_eq!(out, "id = NULL");
    }

    #[test]
    fn explicit_null_renders_null() {
        let out = render("id = ${userId}", &params(&[("userId", Value::Null)]));
        assert_eq!(out, "id = NULL");
    }

    #[test]
    fn duplicate_placeholders_share_a_value() {
        let out = render(
            "${a} + ${a} = ${b}",
            &params(&[("a", json!(1)), ("b", json!(2))]),
        );
        assert_eq!(out, "1 + 1 = 2");
    }

    #[test]
    fn rendering_is_idempotent_per_call() {
        let template = "SELECT * FROM orders WHERE user = ${user} AND state = ${state}";
        let map = params(&[("user", json!("bob")), ("state", json!("open"))]);
        assert_eq!(render(template, &map), render(template, &map));
    }

    #[test]
    fn malformed_placeholder_left_verbatim() {
        let out = render("a = ${a AND b = ${b}", &params(&[("b", json!(2))]));
        assert_eq!(out, "a = ${a AND b = 2");
    }

    #[test]
    fn comma_separated_list_strings_pass_through_quoted() {
        // The documented idiom for IN clauses: the caller supplies one string.
        let out = render(
            "state IN (${states})",
            &params(&[("states", json!("open,closed"))]),
        );
        assert_eq!(out, "state IN ('open,closed')");
    }

    #[test]
    fn embedded_quote_is_not_escaped() {
        // Known limitation: the quote breaks the literal.
        let out = render("name = ${name}", &params(&[("name", json!("O'Brien"))]));
        assert_eq!(out, "name = 'O'Brien'");
    }
}
