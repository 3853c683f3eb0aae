pub mod render;
pub mod starter;
pub mod validate;

pub use render::{placeholder_names, render, render_value};
pub use starter::derive_query_template;
pub use validate::{validate_query, DENY_LIST};
