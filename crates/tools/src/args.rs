//! Argument extraction shared by the expense tools.
//!
//! Models send loosely-typed JSON; these helpers validate it and produce
//! `ToolError::InvalidArguments` messages the model can act on.

use scout_core::error::ToolError;
use scout_core::expense::ExpenseCategory;
use scout_core::tool::ToolContext;
use serde_json::Value;
use uuid::Uuid;

/// The customer a call acts for. An explicit `customer_id` must match the
/// session's customer.
pub fn resolve_customer(ctx: &ToolContext, args: &Value) -> Result<String, ToolError> {
    match optional_string(args, "customer_id")? {
        None => Ok(ctx.customer_id.clone()),
        Some(requested) if requested == ctx.customer_id => Ok(requested),
        Some(requested) => Err(ToolError::InvalidArguments(format!(
            "customer_id '{requested}' does not match the active customer"
        ))),
    }
}

/// A required expense id.
pub fn expense_id(args: &Value) -> Result<Uuid, ToolError> {
    let raw = required_string(args, "id")?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| ToolError::InvalidArguments(format!("'{raw}' is not a valid expense id")))
}

/// A required, non-blank string field.
pub fn required_string(args: &Value, key: &str) -> Result<String, ToolError> {
    optional_string(args, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// An optional string field. `null` and blank strings count as absent.
pub fn optional_string(args: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

/// An optional string field that can be cleared. `null` counts as absent;
/// an explicit blank string becomes `Some("")`.
pub fn clearable_string(args: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(String::new())),
        _ => optional_string(args, key),
    }
}

/// An optional amount: a finite number greater than zero. Numeric strings
/// are accepted.
pub fn optional_amount(args: &Value) -> Result<Option<f64>, ToolError> {
    let amount = match args.get("amount") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_start_matches('$').parse::<f64>().ok(),
        Some(_) => None,
    };
    match amount {
        Some(a) if a.is_finite() && a > 0.0 => Ok(Some(a)),
        _ => Err(ToolError::InvalidArguments(
            "'amount' must be a number greater than zero".into(),
        )),
    }
}

pub fn optional_category(args: &Value) -> Result<Option<ExpenseCategory>, ToolError> {
    optional_string(args, "category")?
        .map(|raw| raw.parse::<ExpenseCategory>().map_err(ToolError::InvalidArguments))
        .transpose()
}

/// JSON Schema fragment for the category field.
pub fn category_schema() -> Value {
    serde_json::json!({
        "type": "string",
        "enum": ExpenseCategory::names(),
        "description": format!(
            "The category of the expense. Options are: {}",
            ExpenseCategory::names().join(", ")
        )
    })
}

/// JSON Schema fragment for the optional customer id.
pub fn customer_schema() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "The active customer_id. Defaults to the session's customer."
    })
}
