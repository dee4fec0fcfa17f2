//! Operation roles active on the current thread.
//!
//! Trusted call sites (macro rendering, materialization dispatch, target
//! serialization) mark themselves by entering a [CallRole] for the duration
//! of the call. Identity proxies consult [any_active] to decide which adapter
//! type to report.

use std::cell::RefCell;
use std::marker::PhantomData;

use strum_macros::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum CallRole {
    /// Rendering a macro through the macro generator
    RenderMacro,
    /// Dispatching to the concrete backend's materialization macro
    MaterializeSql,
    /// Serializing the run configuration into a target dictionary
    #[strum(serialize = "serialize-to-target-dictionary")]
    SerializeTargetDict,
}

thread_local! {
    static ACTIVE_ROLES: RefCell<Vec<CallRole>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a role active until dropped, including when unwinding.
#[must_use = "the role is only active while the guard is alive"]
#[derive(Debug)]
pub struct RoleGuard {
    role: CallRole,
    // roles are per thread, the guard must be dropped where it was created
    _not_send: PhantomData<*const ()>,
}

impl Drop for RoleGuard {
    fn drop(&mut self) {
        let _ = ACTIVE_ROLES.try_with(|roles| {
            let mut roles = roles.borrow_mut();
            if let Some(pos) = roles.iter().rposition(|r| *r == self.role) {
                roles.remove(pos);
            }
        });
    }
}

pub fn enter(role: CallRole) -> RoleGuard {
    ACTIVE_ROLES.with(|roles| roles.borrow_mut().push(role));
    RoleGuard {
        role,
        _not_send: PhantomData,
    }
}

pub fn with_role<T>(role: CallRole, f: impl FnOnce() -> T) -> T {
    let _guard = enter(role);
    f()
}

/// True if any of `roles` is active on the calling thread.
pub fn any_active(roles: &[CallRole]) -> bool {
    ACTIVE_ROLES
        .try_with(|active| active.borrow().iter().any(|r| roles.contains(r)))
        .unwrap_or(false)
}

/// Roles active on the calling thread, outermost first.
pub fn active_roles() -> Vec<CallRole> {
    ACTIVE_ROLES
        .try_with(|active| active.borrow().clone())
        .unwrap_or_default()
}
