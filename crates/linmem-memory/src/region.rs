//! The shared flat memory region.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use linmem_core::{Address, AddressWidth};

use crate::config::{MemoryConfig, PAGE_SIZE};
use crate::error::MemoryError;
use crate::raw::RawBuffer;

/// A linear memory region shared between threads.
pub type SharedMemory = Arc<LinearMemory>;

/// A contiguous, zero-initialised byte region addressed from `0`.
///
/// The full `max_pages` is reserved when the region is created and the
/// backing buffer never moves, so a region can be shared through `Arc` by
/// every agent that maps it. Only the first [`len`](Self::len) bytes are
/// accessible; [`grow`](Self::grow) raises that bound a page at a time.
///
/// There is no locking. Agents coordinate through the region itself (the
/// atomic helpers on [`MemoryAccessor`](crate::MemoryAccessor)) or through
/// narrow external messages.
pub struct LinearMemory {
    raw: RawBuffer,
    /// Accessible bytes; only ever increases.
    len: AtomicUsize,
    config: MemoryConfig,
}

impl LinearMemory {
    /// Create a region from a validated config.
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        let raw = RawBuffer::new(config.max_bytes());
        tracing::debug!(
            initial_pages = config.initial_pages,
            max_pages = config.max_pages,
            width = %config.width,
            "created linear memory"
        );
        Ok(Self {
            raw,
            len: AtomicUsize::new(config.initial_bytes()),
            config,
        })
    }

    /// Create a region wrapped for sharing.
    pub fn shared(config: MemoryConfig) -> Result<SharedMemory, MemoryError> {
        Self::new(config).map(Arc::new)
    }

    /// The configuration the region was created with.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Pointer width of the region.
    pub fn width(&self) -> AddressWidth {
        self.config.width
    }

    /// Accessible bytes.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Always `false`: a region has at least one page.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum bytes the region can grow to.
    pub fn max_len(&self) -> usize {
        self.raw.capacity()
    }

    /// Accessible pages.
    pub fn pages(&self) -> u32 {
        (self.len() / PAGE_SIZE) as u32
    }

    /// Make `pages` more pages accessible.
    ///
    /// Returns the page count before growing. Growing by zero pages is a
    /// query. New pages are already zero.
    pub fn grow(&self, pages: u32) -> Result<u32, MemoryError> {
        let add = pages as usize * PAGE_SIZE;
        let max = self.max_len();
        let previous = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                len.checked_add(add).filter(|&new| new <= max)
            })
            .map_err(|len| MemoryError::GrowFailed {
                requested: pages,
                current: (len / PAGE_SIZE) as u32,
                max: self.config.max_pages,
            })?;
        if pages > 0 {
            tracing::debug!(
                from_pages = previous / PAGE_SIZE,
                to_pages = (previous + add) / PAGE_SIZE,
                "grew linear memory"
            );
        }
        Ok((previous / PAGE_SIZE) as u32)
    }

    /// Check `[address, address + len)` against the accessible length and
    /// return the start as a buffer offset.
    ///
    /// # Panics
    ///
    /// Panics if any byte of the range is outside the accessible region.
    #[inline]
    pub fn check_range(&self, address: Address, len: usize) -> usize {
        let limit = self.len();
        let start = usize::try_from(address.get()).ok();
        match start.and_then(|s| s.checked_add(len).map(|end| (s, end))) {
            Some((start, end)) if end <= limit => start,
            _ => panic!(
                "memory access [{address}, +{len}) outside region of {limit} bytes"
            ),
        }
    }

    pub(crate) fn raw(&self) -> &RawBuffer {
        &self.raw
    }
}

impl std::fmt::Debug for LinearMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearMemory")
            .field("len", &self.len())
            .field("max_len", &self.max_len())
            .field("width", &self.width())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<LinearMemory>();
};

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> LinearMemory {
        LinearMemory::new(MemoryConfig::default().with_pages(1, 3)).unwrap()
    }

    #[test]
    fn starts_at_initial_pages() {
        let mem = small();
        assert_eq!(mem.len(), PAGE_SIZE);
        assert_eq!(mem.max_len(), 3 * PAGE_SIZE);
        assert_eq!(mem.pages(), 1);
        assert!(!mem.is_empty());
    }

    #[test]
    fn grow_returns_previous_pages() {
        let mem = small();
        assert_eq!(mem.grow(1), Ok(1));
        assert_eq!(mem.grow(0), Ok(2));
        assert_eq!(mem.len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn grow_past_max_fails_without_change() {
        let mem = small();
        assert_eq!(
            mem.grow(3),
            Err(MemoryError::GrowFailed {
                requested: 3,
                current: 1,
                max: 3
            })
        );
        assert_eq!(mem.pages(), 1);
    }

    #[test]
    fn invalid_config_rejected() {
        let err = LinearMemory::new(MemoryConfig::default().with_pages(0, 1)).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidConfig { .. }));
    }

    #[test]
    fn check_range_accepts_exact_end() {
        let mem = small();
        assert_eq!(mem.check_range(Address(PAGE_SIZE as u64 - 4), 4), PAGE_SIZE - 4);
    }

    #[test]
    #[should_panic(expected = "outside region")]
    fn check_range_rejects_past_len() {
        let mem = small();
        // Reserved but not yet accessible.
        mem.check_range(Address(PAGE_SIZE as u64), 1);
    }
}
