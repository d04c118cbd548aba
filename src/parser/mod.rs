pub mod adapter;
pub mod ast;

pub use adapter::SqlParserAdapter;
pub use ast::Statement;
