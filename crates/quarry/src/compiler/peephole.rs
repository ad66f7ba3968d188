//! One-step lookback rewrite for dot-qualified resource names.
//!
//! Resource names such as `sshd.config` are dot-qualified, so `sshd.config`
//! first compiles to a bare `sshd` reference followed by a field access.
//! When the receiver of the field access is the immediately preceding chunk,
//! that chunk is an argument-less resource reference, and
//! `<receiver>.<field>` names a resource, the receiver is dropped and the
//! caller instantiates the fused resource directly. Only the last emitted
//! chunk is ever examined.

use crate::program::{Program, Ref, INPUT_REF};
use crate::schema::Schema;

/// Try to fuse the bound resource reference with `field`.
///
/// On success the preceding chunk has been removed and the fused resource
/// name is returned; the caller must emit the replacement chunk.
pub fn fuse_resource_chain(
    code: &mut Program,
    schema: &Schema,
    bound_ref: Ref,
    field: &str,
) -> Option<String> {
    if bound_ref == INPUT_REF || code.chunk_index() != bound_ref {
        return None;
    }
    let prev = code.last_chunk()?;
    if !prev.is_bare_resource() {
        return None;
    }
    let fused = format!("{}.{}", prev.id, field);
    if !schema.contains(&fused) {
        return None;
    }
    tracing::trace!("Fusing chunk {bound_ref} into resource {fused}");
    code.remove_last_chunk();
    Some(fused)
}
