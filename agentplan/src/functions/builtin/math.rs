use crate::functions::{FunctionCatalog, NativeFunction, ParameterSchema, ParameterType};

pub const PLUGIN: &str = "math";

fn binary(name: &str, description: &str, op: fn(f64, f64) -> f64) -> NativeFunction {
    NativeFunction::builder(PLUGIN, name)
        .description(description)
        .parameter(ParameterSchema::new("input", ParameterType::Number).describe("Initial value"))
        .parameter(ParameterSchema::new("amount", ParameterType::Number).describe("Amount to apply"))
        .build_sync(move |args| Ok(format_number(op(args.number("input")?, args.number("amount")?))))
}

/// Integral results print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register_native(binary("Add", "Add an amount to a value", |a, b| a + b));
    catalog.register_native(binary("Subtract", "Subtract an amount from a value", |a, b| a - b));
}
