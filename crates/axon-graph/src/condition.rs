use std::collections::HashMap;

use serde_json::Value;

/// Evaluates a minimal condition-expression grammar against a variable
/// map: `<ident>`, `<ident> <op> <literal>` where `op` is one of
/// `== != > >= < <=` and `literal` is a JSON scalar (bare word, quoted
/// string, number, `true`/`false`). A bare identifier with no operator is
/// truthy-checked.
pub fn evaluate_condition(expression: &str, variables: &HashMap<String, Value>) -> bool {
    let expression = expression.trim();
    for op in ["==", "!=", ">=", "<=", ">", "<"] {
        if let Some(idx) = expression.find(op) {
            let (lhs, rhs) = expression.split_at(idx);
            let rhs = &rhs[op.len()..];
            let lhs_value = resolve_operand(lhs.trim(), variables);
            let rhs_value = resolve_operand(rhs.trim(), variables);
            return compare(op, &lhs_value, &rhs_value);
        }
    }
    is_truthy(&resolve_operand(expression, variables))
}

fn resolve_operand(token: &str, variables: &HashMap<String, Value>) -> Value {
    if let Some(stripped) = token.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Value::String(stripped.to_string());
    }
    if let Some(stripped) = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Value::String(stripped.to_string());
    }
    if token == "true" {
        return Value::Bool(true);
    }
    if token == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = token.parse::<f64>() {
        return serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null);
    }
    variables.get(token).cloned().unwrap_or(Value::Null)
}

fn compare(op: &str, lhs: &Value, rhs: &Value) -> bool {
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        _ => {
            let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) else {
                return false;
            };
            match op {
                ">" => l > r,
                ">=" => l >= r,
                "<" => l < r,
                "<=" => l <= r,
                _ => false,
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn numeric_comparison() {
        let variables = vars(&[("x", json!(5))]);
        assert!(evaluate_condition("x > 0", &variables));
        assert!(!evaluate_condition("x > 10", &variables));
    }

    #[test]
    fn string_equality() {
        let variables = vars(&[("status", json!("done"))]);
        assert!(evaluate_condition("status == 'done'", &variables));
        assert!(!evaluate_condition("status == 'pending'", &variables));
    }

    #[test]
    fn bare_identifier_is_truthy_checked() {
        let variables = vars(&[("flag", json!(true)), ("empty", json!(""))]);
        assert!(evaluate_condition("flag", &variables));
        assert!(!evaluate_condition("empty", &variables));
    }

    #[test]
    fn missing_variable_resolves_to_null_and_is_falsy() {
        let variables = HashMap::new();
        assert!(!evaluate_condition("missing", &variables));
    }
}
