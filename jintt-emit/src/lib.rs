#![forbid(unsafe_code)]

mod emit;
mod filters;

pub use emit::Emitter;
pub use filters::{CustomFn, FilterRule, FilterTable};
