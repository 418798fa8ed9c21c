pub mod bootstrap;
pub mod locks;
pub mod service;
pub mod telemetry;

pub use bootstrap::{bootstrap, Application, BootstrapError};
pub use locks::ExpenseLocks;
pub use service::{ExpenseDraft, ExpenseService, ExpenseUpdate, Repositories};
pub use telemetry::{init_logging, TracingAuditSink};
