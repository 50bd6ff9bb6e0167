//! Linear memory configuration parameters.

use linmem_core::AddressWidth;

use crate::error::MemoryError;

/// Size of one growth page in bytes (64 KiB).
pub const PAGE_SIZE: usize = 65_536;

/// Configuration for a [`LinearMemory`](crate::LinearMemory) region.
///
/// Validated at construction; all values are immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Pages accessible when the region is created.
    ///
    /// Default: 1 (64 KiB).
    pub initial_pages: u32,

    /// Upper bound for [`grow`](crate::LinearMemory::grow).
    ///
    /// The whole maximum is reserved (zeroed, lazily committed by the OS)
    /// up front so the region never moves. Default: 256 (16 MiB).
    pub max_pages: u32,

    /// Width of stored pointers.
    pub width: AddressWidth,

    /// Bytes at the bottom of the region a heap allocator never hands out,
    /// keeping address `0` null.
    ///
    /// Default: 8. Must be a non-zero multiple of 8 below the initial size.
    pub reserved_low: u32,
}

impl MemoryConfig {
    /// Default initial page count.
    pub const DEFAULT_INITIAL_PAGES: u32 = 1;

    /// Default maximum page count.
    pub const DEFAULT_MAX_PAGES: u32 = 256;

    /// Default reserved low range.
    pub const DEFAULT_RESERVED_LOW: u32 = 8;

    /// Create a config of the given width with default sizes.
    pub fn new(width: AddressWidth) -> Self {
        Self {
            initial_pages: Self::DEFAULT_INITIAL_PAGES,
            max_pages: Self::DEFAULT_MAX_PAGES,
            width,
            reserved_low: Self::DEFAULT_RESERVED_LOW,
        }
    }

    /// Same config with different page counts.
    pub fn with_pages(mut self, initial_pages: u32, max_pages: u32) -> Self {
        self.initial_pages = initial_pages;
        self.max_pages = max_pages;
        self
    }

    /// Initial size in bytes.
    pub fn initial_bytes(&self) -> usize {
        self.initial_pages as usize * PAGE_SIZE
    }

    /// Maximum size in bytes.
    pub fn max_bytes(&self) -> usize {
        self.max_pages as usize * PAGE_SIZE
    }

    /// Check every constraint.
    pub fn validate(&self) -> Result<(), MemoryError> {
        let invalid = |reason: String| Err(MemoryError::InvalidConfig { reason });
        if self.initial_pages == 0 {
            return invalid("initial_pages must be at least 1".into());
        }
        if self.initial_pages > self.max_pages {
            return invalid(format!(
                "initial_pages ({}) exceeds max_pages ({})",
                self.initial_pages, self.max_pages
            ));
        }
        let addressable = self.width.max_address() as u128 + 1;
        if self.max_bytes() as u128 > addressable {
            return invalid(format!(
                "max_pages ({}) is not addressable with {} pointers",
                self.max_pages, self.width
            ));
        }
        if self.reserved_low == 0 || self.reserved_low % 8 != 0 {
            return invalid(format!(
                "reserved_low ({}) must be a non-zero multiple of 8",
                self.reserved_low
            ));
        }
        if self.reserved_low as usize >= self.initial_bytes() {
            return invalid(format!(
                "reserved_low ({}) leaves no room in the initial region",
                self.reserved_low
            ));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new(AddressWidth::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = MemoryConfig::default();
        assert_eq!(config.initial_bytes(), 64 * 1024);
        assert_eq!(config.max_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_initial_above_max() {
        let config = MemoryConfig::default().with_pages(4, 2);
        assert!(matches!(
            config.validate(),
            Err(MemoryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_unaligned_reserved_low() {
        let mut config = MemoryConfig::default();
        config.reserved_low = 12;
        assert!(config.validate().is_err());
        config.reserved_low = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn w32_caps_at_four_gib() {
        let ok = MemoryConfig::new(AddressWidth::W32).with_pages(1, 65_536);
        assert_eq!(ok.validate(), Ok(()));
        let too_big = MemoryConfig::new(AddressWidth::W32).with_pages(1, 65_537);
        assert!(too_big.validate().is_err());
    }
}
