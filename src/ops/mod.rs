pub mod filter;
pub mod list_ops;
pub mod reorder;
