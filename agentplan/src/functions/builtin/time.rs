use chrono::{Datelike, Local, Utc};

use crate::functions::{FunctionCatalog, NativeFunction};

pub const PLUGIN: &str = "time";

fn clock(name: &str, description: &str, f: fn() -> String) -> NativeFunction {
    NativeFunction::builder(PLUGIN, name)
        .description(description)
        .build_sync(move |_| Ok(f()))
}

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register_native(clock("today", "Current date, e.g. Sunday, 12 January 2031", || {
        Local::now().format("%A, %d %B %Y").to_string()
    }));
    catalog.register_native(clock("now", "Current date and time in the local timezone", || {
        Local::now().format("%A, %B %d, %Y %I:%M %p").to_string()
    }));
    catalog.register_native(clock("utc_now", "Current UTC time in RFC 3339 format", || {
        Utc::now().to_rfc3339()
    }));
    catalog.register_native(clock("year", "Current year", || Local::now().year().to_string()));
    catalog.register_native(clock("day_of_week", "Current day of the week", || {
        Local::now().format("%A").to_string()
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptlang::{ContextVariables, ExecutionContext, FunctionRegistry};

    #[tokio::test]
    async fn test_year_is_numeric() {
        let mut catalog = FunctionCatalog::new();
        register(&mut catalog);
        let ctx = ExecutionContext::new(&catalog);
        let year = catalog.resolve("time", "year").unwrap();
        let out = year.invoke(&ctx, ContextVariables::new()).await.unwrap();
        assert!(out.input().parse::<i32>().unwrap() >= 2024);
    }
}
