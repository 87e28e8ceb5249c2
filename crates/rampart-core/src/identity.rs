//! Capabilities of the principal attached to a request.
//!
//! Identity is established upstream (session lookup, cookies). The control
//! plane only asks two questions of whatever was attached: who is it, for
//! log correlation, and is it an admin, for the admin gate.

use std::fmt;

/// An authenticated caller attached to the request context.
///
/// # Example
///
/// ```
/// use rampart_core::Principal;
///
/// #[derive(Debug)]
/// struct User {
///     id: u64,
///     admin: bool,
/// }
///
/// impl Principal for User {
///     fn id(&self) -> Option<u64> {
///         Some(self.id)
///     }
///
///     fn is_admin(&self) -> bool {
///         self.admin
///     }
/// }
///
/// let user = User { id: 7, admin: false };
/// assert_eq!(user.id(), Some(7));
/// assert!(!user.is_admin());
/// ```
pub trait Principal: Send + Sync + fmt::Debug {
    /// Returns the numeric user id used in logs, if the principal has one.
    fn id(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the principal holds admin privileges.
    fn is_admin(&self) -> bool {
        false
    }
}

/// A plain principal with an id and an admin flag.
///
/// Useful for tests and for hosts whose user model is not worth wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplePrincipal {
    /// Numeric user id.
    pub id: u64,
    /// Whether the user is an administrator.
    pub admin: bool,
}

impl SimplePrincipal {
    /// Creates a regular user.
    #[must_use]
    pub const fn user(id: u64) -> Self {
        Self { id, admin: false }
    }

    /// Creates an administrator.
    #[must_use]
    pub const fn admin(id: u64) -> Self {
        Self { id, admin: true }
    }
}

impl Principal for SimplePrincipal {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn is_admin(&self) -> bool {
        self.admin
    }
}
