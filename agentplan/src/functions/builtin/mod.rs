//! Built-in plugins available to every kernel.

pub mod math;
pub mod text;
pub mod time;
pub mod wait;

use super::FunctionCatalog;

pub fn register_builtin_plugins(catalog: &mut FunctionCatalog) {
    text::register(catalog);
    math::register(catalog);
    time::register(catalog);
    wait::register(catalog);
}
