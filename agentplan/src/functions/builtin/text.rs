use crate::functions::{FunctionCatalog, NativeFunction, ParameterSchema};

pub const PLUGIN: &str = "text";

fn unary(name: &str, description: &str, f: fn(&str) -> String) -> NativeFunction {
    NativeFunction::builder(PLUGIN, name)
        .description(description)
        .parameter(ParameterSchema::string("input").describe("Text to process"))
        .build_sync(move |args| Ok(f(args.str("input")?)))
}

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register_native(unary("trim", "Remove leading and trailing whitespace", |s| {
        s.trim().to_string()
    }));
    catalog.register_native(unary("trim_start", "Remove leading whitespace", |s| {
        s.trim_start().to_string()
    }));
    catalog.register_native(unary("trim_end", "Remove trailing whitespace", |s| {
        s.trim_end().to_string()
    }));
    catalog.register_native(unary("uppercase", "Convert text to uppercase", |s| {
        s.to_uppercase()
    }));
    catalog.register_native(unary("lowercase", "Convert text to lowercase", |s| {
        s.to_lowercase()
    }));
    catalog.register_native(unary("length", "Count the characters of the text", |s| {
        s.chars().count().to_string()
    }));
    catalog.register_native(unary("echo", "Return the input unchanged", |s| s.to_string()));
    catalog.register_native(
        NativeFunction::builder(PLUGIN, "concat")
            .description("Concatenate two strings")
            .parameter(ParameterSchema::string("input").describe("First string"))
            .parameter(ParameterSchema::string("input2").describe("Second string"))
            .build_sync(|args| Ok(format!("{}{}", args.str("input")?, args.str("input2")?))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptlang::{ContextVariables, ExecutionContext, FunctionRegistry};

    #[tokio::test]
    async fn test_text_functions() {
        let mut catalog = FunctionCatalog::new();
        register(&mut catalog);
        let ctx = ExecutionContext::new(&catalog);

        let upper = catalog.resolve("text", "uppercase").unwrap();
        let out = upper
            .invoke(&ctx, ContextVariables::with_input("abc"))
            .await
            .unwrap();
        assert_eq!(out.input(), "ABC");

        let concat = catalog.resolve("TEXT", "Concat").unwrap();
        let mut vars = ContextVariables::with_input("foo");
        vars.set("input2", "bar");
        assert_eq!(concat.invoke(&ctx, vars).await.unwrap().input(), "foobar");

        let length = catalog.resolve("text", "length").unwrap();
        let out = length
            .invoke(&ctx, ContextVariables::with_input("héllo"))
            .await
            .unwrap();
        assert_eq!(out.input(), "5");
    }
}
