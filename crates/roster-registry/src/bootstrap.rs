//! Bootstrap candidate unification
//!
//! The bootstrap loop recomputes its candidate list on every tick from
//! three sources: statically configured addresses, the substrate's
//! compiled-in defaults, and addresses seen via local discovery. The
//! union is de-duplicated by full address string; discovery is additive
//! for the process lifetime, so candidates never expire here.

use roster_core::NodeAddr;
use std::collections::HashSet;

/// Union of the three bootstrap address sources, de-duplicated by address
/// equality, preserving source order (static, defaults, discovered)
#[must_use]
pub fn unify_candidates(
    configured: &[NodeAddr],
    defaults: &[NodeAddr],
    discovered: &[NodeAddr],
) -> Vec<NodeAddr> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for addr in configured.iter().chain(defaults).chain(discovered) {
        if seen.insert(addr.to_string()) {
            out.push(addr.clone());
        }
    }
    out
}
