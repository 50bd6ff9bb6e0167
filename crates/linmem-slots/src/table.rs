//! The storage an allocator hands indices into.

/// A growable table of uniform slots, each empty or holding one handle.
///
/// [`SlotAllocator`](crate::SlotAllocator) manages which indices are in use;
/// the table only stores what the caller puts there.
pub trait SlotTable {
    /// What a slot holds.
    type Handle;

    /// Number of slots.
    fn len(&self) -> u32;

    /// Whether the table has no slots.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `additional` empty slots.
    fn grow(&mut self, additional: u32);

    /// Contents of slot `index`; `None` if empty or out of range.
    fn get(&self, index: u32) -> Option<&Self::Handle>;

    /// Replace the contents of slot `index`, returning the old contents.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    fn set(&mut self, index: u32, handle: Option<Self::Handle>) -> Option<Self::Handle>;

    /// Discard the table and build a fresh one of the same length, carrying
    /// over only slots `0..keep`.
    fn rebuild(&mut self, keep: u32);
}

/// In-process [`SlotTable`] backed by a `Vec`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VecSlotTable<H> {
    slots: Vec<Option<H>>,
}

impl<H> VecSlotTable<H> {
    /// A table of `len` empty slots.
    pub fn new(len: u32) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
        }
    }

    /// A table whose first slots hold `reserved`, followed by `free` empty
    /// slots.
    pub fn with_reserved(reserved: Vec<H>, free: u32) -> Self {
        let mut slots: Vec<Option<H>> = reserved.into_iter().map(Some).collect();
        slots.extend((0..free).map(|_| None));
        Self { slots }
    }

    /// Iterate over `(index, handle)` for occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &H)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|h| (i as u32, h)))
    }
}

impl<H> Default for VecSlotTable<H> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<H> SlotTable for VecSlotTable<H> {
    type Handle = H;

    fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    fn grow(&mut self, additional: u32) {
        let new_len = self.len().checked_add(additional);
        assert!(new_len.is_some(), "slot table cannot exceed u32::MAX slots");
        self.slots.extend((0..additional).map(|_| None));
    }

    fn get(&self, index: u32) -> Option<&H> {
        self.slots.get(index as usize)?.as_ref()
    }

    fn set(&mut self, index: u32, handle: Option<H>) -> Option<H> {
        let len = self.len();
        match self.slots.get_mut(index as usize) {
            Some(slot) => std::mem::replace(slot, handle),
            None => panic!("slot {index} out of range for table of {len}"),
        }
    }

    fn rebuild(&mut self, keep: u32) {
        let len = self.slots.len();
        let old = std::mem::take(&mut self.slots);
        let mut fresh: Vec<Option<H>> = old.into_iter().take(keep as usize).collect();
        fresh.resize_with(len, || None);
        self.slots = fresh;
    }
}
