//! The transaction executor: install/remove step pipeline, hooks, config-protect and the
//! on-disk cache manager (`spec.md` §4.8, §5, §9 Design Notes 3–4).

pub mod cache;
pub mod configprotect;
pub mod error;
pub mod fetch;
pub mod hooks;
pub mod install;
pub mod remove;
pub mod transaction;

pub use cache::CacheManager;
pub use configprotect::ConfigProtect;
pub use error::{ExecError, InstallStep, InstallStepError, RemoveStep, RemoveStepError, TransactionError};
pub use fetch::fetch_archive;
pub use hooks::{dispatch, HookKind, HookRunner};
pub use install::{install_one, InstallOptions, InstallRequest};
pub use remove::{remove_one, RemoveOptions};
pub use transaction::{run_transaction, TransactionPlan, TransactionReport};
