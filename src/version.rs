//! Firmware version string and dotted-version ordering.

use core::cmp::Ordering;

/// Version of the running image, as published next to `<name>.bin`.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compare two dotted versions component by component.
///
/// Components that both parse as integers compare numerically; anything
/// else compares as text.  A missing component counts as `"0"`, so
/// `"1.4"` and `"1.4.0"` are equal.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.trim().split('.');
    let mut right = b.trim().split('.');
    loop {
        let (l, r) = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => (l.unwrap_or("0"), r.unwrap_or("0")),
        };
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// `true` when `remote` is strictly newer than `local`.
pub fn is_newer(remote: &str, local: &str) -> bool {
    compare(remote, local) == Ordering::Greater
}
