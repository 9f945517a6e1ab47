use alloc::vec::Vec;

use super::handle::Handle;

/// One slot of an [`Arena`]: a live element, or a link in the vacancy chain
/// threaded through freed slots.
#[derive(Clone)]
enum Entry<T> {
    Occupied(T),
    Vacant(Option<Handle>),
}

/// Slab-style element pool.
///
/// The tree engines address nodes and values through [`Handle`]s instead of
/// references, which is what lets B+Tree leaves hold non-owning sibling links
/// in safe code. Freed slots are linked into an intrusive vacancy chain and
/// reused most-recently-freed first, so merge-heavy deletion keeps the pool
/// dense instead of growing the backing vector.
#[derive(Clone)]
pub(crate) struct Arena<T> {
    entries: Vec<Entry<T>>,
    vacant_head: Option<Handle>,
    live: usize,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: Vec::new(),
            vacant_head: None,
            live: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.live
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub(crate) fn alloc(&mut self, element: T) -> Handle {
        self.live += 1;
        match self.vacant_head {
            Some(handle) => {
                let slot = &mut self.entries[handle.index()];
                let next = match slot {
                    Entry::Vacant(next) => *next,
                    Entry::Occupied(_) => panic!("`Arena::alloc()` - vacancy chain points at a live slot!"),
                };
                self.vacant_head = next;
                *slot = Entry::Occupied(element);
                handle
            }
            None => {
                // `Handle::new` rejects growth past the addressable range.
                let handle = Handle::new(self.entries.len());
                self.entries.push(Entry::Occupied(element));
                handle
            }
        }
    }

    #[inline]
    pub(crate) fn get(&self, handle: Handle) -> &T {
        match &self.entries[handle.index()] {
            Entry::Occupied(element) => element,
            Entry::Vacant(_) => panic!("`Arena::get()` - `handle` names a freed slot!"),
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: Handle) -> &mut T {
        match &mut self.entries[handle.index()] {
            Entry::Occupied(element) => element,
            Entry::Vacant(_) => panic!("`Arena::get_mut()` - `handle` names a freed slot!"),
        }
    }

    pub(crate) fn take(&mut self, handle: Handle) -> T {
        let vacant_head = self.vacant_head;
        let slot = &mut self.entries[handle.index()];
        match core::mem::replace(slot, Entry::Vacant(vacant_head)) {
            Entry::Occupied(element) => {
                self.vacant_head = Some(handle);
                self.live -= 1;
                element
            }
            Entry::Vacant(previous) => {
                *slot = Entry::Vacant(previous);
                panic!("`Arena::take()` - `handle` names a freed slot!")
            }
        }
    }

    pub(crate) fn free(&mut self, handle: Handle) {
        drop(self.take(handle));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.vacant_head = None;
        self.live = 0;
    }
}
