use promptlang::FunctionError;
use std::time::Duration;

use crate::functions::{FunctionCatalog, NativeFunction, ParameterSchema, ParameterType};

pub const PLUGIN: &str = "wait";

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register_native(
        NativeFunction::builder(PLUGIN, "seconds")
            .description("Wait for the given number of seconds")
            .parameter(ParameterSchema::new("input", ParameterType::Number).describe("Seconds to wait"))
            .build(|args| async move {
                let seconds = args.number("input")?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(FunctionError::InvalidArgument {
                        function: format!("{}.seconds", PLUGIN),
                        parameter: "input".to_string(),
                        message: "expected a non-negative number of seconds".to_string(),
                    });
                }
                tokio::select! {
                    _ = args.cancellation().cancelled() => Err(FunctionError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => Ok(String::new()),
                }
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptlang::{ContextVariables, ExecutionContext, FunctionRegistry};

    #[tokio::test]
    async fn test_zero_wait_returns_empty() {
        let mut catalog = FunctionCatalog::new();
        register(&mut catalog);
        let ctx = ExecutionContext::new(&catalog);
        let wait = catalog.resolve("wait", "seconds").unwrap();
        let out = wait
            .invoke(&ctx, ContextVariables::with_input("0"))
            .await
            .unwrap();
        assert_eq!(out.input(), "");
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let mut catalog = FunctionCatalog::new();
        register(&mut catalog);
        let ctx = ExecutionContext::new(&catalog);
        ctx.cancellation.cancel();
        let wait = catalog.resolve("wait", "seconds").unwrap();
        let err = wait
            .invoke(&ctx, ContextVariables::with_input("30"))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
