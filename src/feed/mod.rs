pub mod dates;
pub mod parser;
pub mod strategy;

pub use parser::FeedParser;
pub use strategy::{FeedStrategy, HtmlSourceRules};
