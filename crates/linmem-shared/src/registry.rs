//! Agent-local bookkeeping for shared blocks.
//!
//! The atomic strong count in linear memory is shared by every agent. Each
//! agent additionally keeps, per control block it holds handles to, the
//! destructor to run on release and how many of its own handles are live.
//! The two counts are independent: a block with a strong count of five may
//! have one local handle here and four elsewhere.
//!
//! Views handed out over a block's payload are recorded too. When the
//! agent's last handle to the block goes, nothing here keeps the payload
//! alive any more, so those views are detached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use linmem_core::Address;
use linmem_view::DetachHandle;

/// Releases a payload. Receives the payload address (not the block).
///
/// Runs on whichever thread drops the last share, so it must be
/// `Send + Sync`.
pub type Destructor = Arc<dyn Fn(Address) + Send + Sync>;

struct Entry {
    destructor: Option<Destructor>,
    handles: u32,
    views: Vec<DetachHandle>,
}

/// Per-agent map from control block to destructor and local handle count.
#[derive(Default)]
pub struct DestructorRegistry {
    entries: HashMap<Address, Entry>,
}

impl DestructorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more local handle to `block`. A supplied destructor
    /// replaces any previously registered one.
    pub fn track(&mut self, block: Address, destructor: Option<Destructor>) {
        let entry = self.entries.entry(block).or_insert_with(|| Entry {
            destructor: None,
            handles: 0,
            views: Vec::new(),
        });
        entry.handles += 1;
        if destructor.is_some() {
            entry.destructor = destructor;
        }
    }

    /// Record a view over `block`'s payload, to be detached with the
    /// agent's last handle.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not tracked.
    pub fn attach_view(&mut self, block: Address, view: DetachHandle) {
        let entry = match self.entries.get_mut(&block) {
            Some(entry) => entry,
            None => panic!("block {block} has no local handles"),
        };
        entry.views.retain(|v| !v.is_dropped());
        entry.views.push(view);
    }

    /// Record one fewer local handle. With none left, detach the block's
    /// views and forget it. Returns the block's destructor.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not tracked.
    pub fn untrack(&mut self, block: Address) -> Option<Destructor> {
        let entry = match self.entries.get_mut(&block) {
            Some(entry) => entry,
            None => panic!("block {block} has no local handles"),
        };
        entry.handles -= 1;
        if entry.handles == 0 {
            let entry = self.entries.remove(&block)?;
            for view in &entry.views {
                view.detach();
            }
            entry.destructor
        } else {
            entry.destructor.clone()
        }
    }

    /// The destructor registered for `block`.
    pub fn destructor(&self, block: Address) -> Option<&Destructor> {
        self.entries.get(&block)?.destructor.as_ref()
    }

    /// Live local handles to `block`.
    pub fn local_handles(&self, block: Address) -> u32 {
        self.entries.get(&block).map_or(0, |e| e.handles)
    }

    /// Number of blocks with live local handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no blocks are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DestructorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(block, e)| {
                (block, (e.handles, e.destructor.is_some()))
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_forgets() {
        let mut r = DestructorRegistry::new();
        let block = Address(64);
        r.track(block, None);
        r.track(block, Some(Arc::new(|_: Address| {})));
        assert_eq!(r.local_handles(block), 2);
        assert!(r.untrack(block).is_some());
        assert_eq!(r.local_handles(block), 1);
        assert!(r.untrack(block).is_some());
        assert!(r.is_empty());
        assert!(r.destructor(block).is_none());
    }

    #[test]
    fn later_track_without_destructor_keeps_existing() {
        let mut r = DestructorRegistry::new();
        r.track(Address(8), Some(Arc::new(|_: Address| {})));
        r.track(Address(8), None);
        assert!(r.destructor(Address(8)).is_some());
    }

    #[test]
    fn last_untrack_detaches_views() {
        use linmem_core::{AddressWidth, DescriptorBuilder, TypeTag};
        use linmem_memory::{LinearMemory, MemoryAccessor, MemoryConfig};
        use linmem_view::StructView;

        let memory = LinearMemory::shared(MemoryConfig::new(AddressWidth::W32)).unwrap();
        let acc = MemoryAccessor::new(memory);
        let desc = DescriptorBuilder::new("One", AddressWidth::W32)
            .scalar("v", TypeTag::U32)
            .build()
            .unwrap();
        let view: StructView = StructView::new(acc, Address(128), desc);

        let mut r = DestructorRegistry::new();
        let block = Address(64);
        r.track(block, None);
        r.track(block, None);
        r.attach_view(block, view.detach_handle());
        r.untrack(block);
        assert!(!view.is_detached());
        r.untrack(block);
        assert!(view.is_detached());
    }

    #[test]
    #[should_panic(expected = "no local handles")]
    fn untrack_unknown_panics() {
        DestructorRegistry::new().untrack(Address(8));
    }
}
