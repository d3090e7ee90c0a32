//! Hook dispatch (`spec.md` §9 Design Note 3): the four lifecycle points a package record
//! may carry a script for.
//!
//! Grounded on `alpm-package::scriptlet`'s naming of the four lifecycle functions
//! (`pre_install`/`post_install`/`pre_remove`/`post_remove`); this crate dispatches the
//! equivalent shipped scripts rather than validating scriptlet source text.

use entomb_types::Hooks;

use crate::error::ExecError;

/// Which lifecycle point a hook script runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreInstall,
    PostInstall,
    PreRemove,
    PostRemove,
}

/// The external script interpreter. Implemented outside this crate (a shell invocation,
/// a sandboxed runner, or a test double).
pub trait HookRunner {
    fn run(&self, kind: HookKind, script: &[u8]) -> Result<(), String>;
}

/// Runs `kind`'s script from `hooks` if present; a record with no script for `kind` is a
/// no-op.
pub fn dispatch(runner: &dyn HookRunner, kind: HookKind, hooks: &Hooks) -> Result<(), ExecError> {
    let script = match kind {
        HookKind::PreInstall => &hooks.preinstall,
        HookKind::PostInstall => &hooks.postinstall,
        HookKind::PreRemove => &hooks.preremove,
        HookKind::PostRemove => &hooks.postremove,
    };
    let Some(script) = script else {
        return Ok(());
    };
    runner.run(kind, script).map_err(|message| ExecError::HookFailed { kind, message })
}
