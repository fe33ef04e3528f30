//! Permission tokens narrowing what a snippet may contain.
//!
//! The checker is the only component that looks inside a [`Permission`];
//! everything else forwards it. When a caller passes none, the innermost
//! [`scoped`] override on the calling thread applies, falling back to
//! [`Permission::ALL`].

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitOr, BitOrAssign, Sub};

/// A set of permitted construct families.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Self = Self(0);
    /// Literals, names, operators, calls, assignments.
    pub const BASIC: Self = Self(1 << 0);
    /// `if` statements and conditional expressions.
    pub const CONDITION: Self = Self(1 << 1);
    /// `for`, `while` and comprehensions.
    pub const LOOP: Self = Self(1 << 2);
    /// `try`, `raise` and `assert`.
    pub const EXCEPTION: Self = Self(1 << 3);
    /// `def` and `lambda`.
    pub const FUNCTION_DEFINITION: Self = Self(1 << 4);
    /// `import` and `from ... import`.
    pub const IMPORT: Self = Self(1 << 5);
    pub const ALL: Self = Self(0b11_1111);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::BASIC, "BASIC"),
        (Self::CONDITION, "CONDITION"),
        (Self::LOOP, "LOOP"),
        (Self::EXCEPTION, "EXCEPTION"),
        (Self::FUNCTION_DEFINITION, "FUNCTION_DEFINITION"),
        (Self::IMPORT, "IMPORT"),
    ];

    /// Whether every flag of `other` is granted.
    pub fn contains(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Look up a single flag by its constant name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ALL" => Some(Self::ALL),
            "NONE" => Some(Self::NONE),
            _ => Self::NAMES
                .iter()
                .find(|(_, n)| n.eq_ignore_ascii_case(name))
                .map(|(p, _)| *p),
        }
    }

    /// The current default for this thread: innermost [`scoped`] override,
    /// else [`Permission::ALL`].
    pub fn current() -> Self {
        current()
    }
}

impl Default for Permission {
    fn default() -> Self {
        Self::current()
    }
}

impl BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Sub for Permission {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permission({self})")
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return write!(f, "ALL");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(p, _)| self.contains(*p))
            .map(|(_, n)| *n)
            .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

thread_local! {
    static OVERRIDES: RefCell<Vec<Permission>> = const { RefCell::new(Vec::new()) };
}

/// Restores the previous default permission when dropped.
#[must_use = "the override ends as soon as the guard is dropped"]
pub struct PermissionGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for PermissionGuard {
    fn drop(&mut self) {
        OVERRIDES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The process-wide default, used when no override is active.
pub fn default() -> Permission {
    Permission::ALL
}

/// Innermost override on the calling thread, else [`default`].
pub fn current() -> Permission {
    OVERRIDES.with(|stack| stack.borrow().last().copied().unwrap_or_else(default))
}

/// Make `permission` the calling thread's default until the guard drops.
pub fn scoped(permission: Permission) -> PermissionGuard {
    OVERRIDES.with(|stack| stack.borrow_mut().push(permission));
    PermissionGuard {
        _not_send: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_combination() {
        let p = Permission::BASIC | Permission::LOOP;
        assert!(p.contains(Permission::BASIC));
        assert!(p.contains(Permission::LOOP));
        assert!(!p.contains(Permission::IMPORT));
        assert!(Permission::ALL.contains(p));
        assert!(!(Permission::ALL - Permission::IMPORT).contains(Permission::IMPORT));
    }

    #[test]
    fn test_display() {
        assert_eq!(Permission::ALL.to_string(), "ALL");
        assert_eq!(Permission::NONE.to_string(), "NONE");
        assert_eq!(
            (Permission::BASIC | Permission::IMPORT).to_string(),
            "BASIC | IMPORT"
        );
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Permission::from_name("loop"), Some(Permission::LOOP));
        assert_eq!(Permission::from_name("ALL"), Some(Permission::ALL));
        assert_eq!(Permission::from_name("network"), None);
    }

    #[test]
    fn test_from_bits_truncate_drops_unknown_bits() {
        assert_eq!(Permission::from_bits_truncate(0xff), Permission::ALL);
    }

    #[test]
    fn test_scoped_override_nests_and_restores() {
        assert_eq!(Permission::current(), Permission::ALL);
        {
            let _outer = scoped(Permission::BASIC);
            assert_eq!(Permission::current(), Permission::BASIC);
            {
                let _inner = scoped(Permission::BASIC | Permission::LOOP);
                assert_eq!(Permission::current(), Permission::BASIC | Permission::LOOP);
            }
            assert_eq!(Permission::current(), Permission::BASIC);
        }
        assert_eq!(Permission::current(), Permission::ALL);
    }

    #[test]
    fn test_scoped_override_is_thread_local() {
        let _guard = scoped(Permission::NONE);
        let other = std::thread::spawn(Permission::current).join().unwrap();
        assert_eq!(other, Permission::ALL);
        assert_eq!(Permission::current(), Permission::NONE);
    }

    #[test]
    fn test_serde_round_trip() {
        let p = Permission::BASIC | Permission::CONDITION;
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "3");
        assert_eq!(serde_json::from_str::<Permission>(&json).unwrap(), p);
    }
}
