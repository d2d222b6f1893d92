//! Field-level rebuild of a PUT body against fresh server state.
//!
//! Two policies share this module:
//! - `reapply` (after 409): the caller's changes are laid over the server's
//!   current representation unconditionally.
//! - `merge` (after 412): a three-way merge between the caller's `base`, the
//!   server's current representation and the caller's changes. A field counts
//!   as changed on the server when its current value differs from `base`
//!   (a missing field reads as `null`). When both sides changed a field to
//!   different values the server wins, unless the caller marked it
//!   authoritative.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::types::Representation;

/// Overlay `changes` onto `server`.
pub fn reapply(server: &Representation, changes: &Representation) -> Representation {
    let mut out = server.clone();
    for (field, value) in changes {
        out.insert(field.clone(), value.clone());
    }
    out
}

/// Three-way merge of the caller's `changes` into `server`.
pub fn merge(
    base: &Representation,
    server: &Representation,
    changes: &Representation,
    authoritative: &BTreeSet<String>,
) -> Representation {
    let mut out = server.clone();
    for (field, ours) in changes {
        let theirs = server.get(field).unwrap_or(&Value::Null);
        let original = base.get(field).unwrap_or(&Value::Null);

        let server_changed = theirs != original;
        if !server_changed || ours == theirs || authoritative.contains(field) {
            out.insert(field.clone(), ours.clone());
        } else {
            tracing::debug!(field = %field, "merge conflict, keeping server value");
        }
    }
    out
}
