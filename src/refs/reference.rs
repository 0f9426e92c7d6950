//! `Ref`: a tagged reference handle distinguishing stack/local/global/weak storage.
//!
//! A compressed, pointer-sized handle: a 2-bit kind tag in the low bits, the slot index in
//! the high bits. `decode(encode(kind, slot)) == (kind, slot)` is an invariant this module's
//! tests check directly.

#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RefKind {
    /// Produced only by the native stack walker; never created via `new_ref`.
    Stack = 0,
    Local = 1,
    Global = 2,
    Weak = 3,
}

impl RefKind {
    fn from_bits(bits: usize) -> Self {
        match bits {
            0 => RefKind::Stack,
            1 => RefKind::Local,
            2 => RefKind::Global,
            3 => RefKind::Weak,
            _ => unreachable!("2-bit tag"),
        }
    }
}

const KIND_BITS: u32 = 2;
const KIND_MASK: usize = (1 << KIND_BITS) - 1;

/// An opaque handle: 2-bit `RefKind` tag in the low bits, slot index in the rest.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Ref(usize);

impl Ref {
    pub fn encode(kind: RefKind, slot: usize) -> Self {
        debug_assert!(slot <= (usize::MAX >> KIND_BITS), "slot index overflows the tag encoding");
        Ref((slot << KIND_BITS) | kind as usize)
    }

    pub fn decode(self) -> (RefKind, usize) {
        (RefKind::from_bits(self.0 & KIND_MASK), self.0 >> KIND_BITS)
    }

    pub fn kind(self) -> RefKind {
        self.decode().0
    }

    pub fn slot(self) -> usize {
        self.decode().1
    }
}
