pub mod products;
pub mod reconciler;
pub mod transactions;

pub use products::ProductService;
pub use reconciler::run_reconciler;
pub use transactions::TransactionService;
