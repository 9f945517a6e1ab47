use core::num::NonZero;

/// Names one slot of an [`Arena`](super::Arena).
///
/// The slot index is stored as its bitwise complement: every index below
/// [`Handle::CAP`] complements to a nonzero word, so `Option<Handle>` fits in
/// the same four bytes as `Handle`. That niche is what keeps the B+Tree's
/// `prev`/`next` leaf links and the child arrays at one word per reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub(crate) struct Handle(NonZero<u32>);

impl Handle {
    /// Number of slots addressable per arena.
    pub(crate) const CAP: usize = u32::MAX as usize;

    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        assert!(index < Self::CAP, "`Handle::new()` - slot index is out of range!");
        #[allow(clippy::cast_possible_truncation)]
        let complement = !(index as u32);
        // The complement of an in-range index is never zero.
        match NonZero::new(complement) {
            Some(raw) => Self(raw),
            None => panic!("`Handle::new()` - in-range index complemented to zero!"),
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        (!self.0.get()) as usize
    }
}
