//! `LanguageContext`: the contract the GC core needs from whatever VM embeds it.
//!
//! Tracing, class roots, object sizing, and forwarding are named directly as a small trait
//! rather than folded into a larger object-model abstraction, since this crate has no
//! compiler/JIT/class-linker surface of its own to bundle them with.

use crate::util::ObjectReference;

/// Everything the GC core needs from the embedding language runtime. The core is never
/// generic over a concrete language; callers hand it a `&dyn LanguageContext` (or resolve
/// roots/tracing into a [`crate::gc::collector::TraceContext`] up front).
pub trait LanguageContext: Send + Sync {
    /// Invoke `visitor` once per outgoing reference field of `obj`.
    fn trace_object(&self, obj: ObjectReference, visitor: &mut dyn FnMut(ObjectReference));

    /// Roots that exist independent of any thread stack (loaded classes, interned
    /// constants, static fields).
    fn class_roots(&self) -> Vec<ObjectReference>;

    fn object_size(&self, obj: ObjectReference) -> usize;

    /// Whether `obj`'s header already carries a forwarding pointer from a prior compaction.
    fn is_forwarded(&self, obj: ObjectReference) -> bool;

    fn forward_address(&self, obj: ObjectReference) -> Option<ObjectReference>;

    /// Install a forwarding pointer in `obj`'s header, pointing at `to`.
    fn set_forward_address(&self, obj: ObjectReference, to: ObjectReference);
}
