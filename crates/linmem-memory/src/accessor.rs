//! Typed loads and stores over a [`LinearMemory`].
//!
//! [`MemoryAccessor`] is the single choke point for touching the region:
//! one read and one write arm per [`TypeTag`], dispatched with a closed
//! `match`. Plain tags are little-endian and may be unaligned; atomic tags
//! and the read-modify-write helpers require natural alignment and are
//! sequentially consistent.
//!
//! Every access is checked against the region's accessible length. An
//! out-of-region access, a `void`/`null` tag, or a misaligned atomic is a
//! programming error and panics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use linmem_core::{Address, AddressWidth, TypeTag, Value};

use crate::region::{LinearMemory, SharedMemory};

/// Float-to-integer stores saturate at the target type; everything else
/// wraps.
macro_rules! int_of {
    ($value:expr, $t:ty) => {
        match $value {
            Value::Float(f) => f as $t,
            other => other.as_i64() as $t,
        }
    };
}

/// Typed access to a shared region. Cloning is cheap (`Arc` clone).
#[derive(Clone, Debug)]
pub struct MemoryAccessor {
    memory: SharedMemory,
}

impl MemoryAccessor {
    /// Wrap a region.
    pub fn new(memory: SharedMemory) -> Self {
        Self { memory }
    }

    /// The underlying region.
    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Pointer width of the region.
    pub fn width(&self) -> AddressWidth {
        self.memory.width()
    }

    /// Whether two accessors share one region.
    pub fn same_region(&self, other: &MemoryAccessor) -> bool {
        Arc::ptr_eq(&self.memory, &other.memory)
    }

    fn region(&self) -> &LinearMemory {
        &self.memory
    }

    #[inline]
    fn load<const N: usize>(&self, address: Address) -> [u8; N] {
        let offset = self.region().check_range(address, N);
        let mut buf = [0u8; N];
        self.region().raw().load(offset, &mut buf);
        buf
    }

    #[inline]
    fn store(&self, address: Address, bytes: &[u8]) {
        let offset = self.region().check_range(address, bytes.len());
        self.region().raw().store(offset, bytes);
    }

    // ── Tag dispatch ───────────────────────────────────────────────

    /// Read one value of `tag` at `address`.
    ///
    /// Unsigned tags produce [`Value::Unsigned`], signed tags
    /// [`Value::Signed`], float tags [`Value::Float`], and the pointer tag
    /// [`Value::Pointer`].
    ///
    /// # Panics
    ///
    /// Panics on `void`/`null`, on out-of-region access, and on misaligned
    /// atomic tags.
    pub fn read(&self, tag: TypeTag, address: Address) -> Value {
        match tag {
            TypeTag::Void | TypeTag::Null => panic!("cannot read through the {tag} tag"),
            TypeTag::I8 => Value::Signed(i8::from_le_bytes(self.load(address)) as i64),
            TypeTag::U8 => Value::Unsigned(self.read_u8(address) as u64),
            TypeTag::I16 => Value::Signed(i16::from_le_bytes(self.load(address)) as i64),
            TypeTag::U16 => Value::Unsigned(self.read_u16(address) as u64),
            TypeTag::I32 => Value::Signed(self.read_i32(address) as i64),
            TypeTag::U32 => Value::Unsigned(self.read_u32(address) as u64),
            TypeTag::I64 => Value::Signed(self.read_i64(address)),
            TypeTag::U64 => Value::Unsigned(self.read_u64(address)),
            TypeTag::F32 => Value::Float(self.read_f32(address) as f64),
            TypeTag::F64 => Value::Float(self.read_f64(address)),
            TypeTag::Pointer => Value::Pointer(self.read_address(address)),
            TypeTag::AtomicI8 => Value::Signed(self.atomic_load_u8(address) as i8 as i64),
            TypeTag::AtomicU8 => Value::Unsigned(self.atomic_load_u8(address) as u64),
            TypeTag::AtomicI16 => Value::Signed(self.atomic_load_u16(address) as i16 as i64),
            TypeTag::AtomicU16 => Value::Unsigned(self.atomic_load_u16(address) as u64),
            TypeTag::AtomicI32 => Value::Signed(self.atomic_load_u32(address) as i32 as i64),
            TypeTag::AtomicU32 => Value::Unsigned(self.atomic_load_u32(address) as u64),
            TypeTag::AtomicI64 => Value::Signed(self.atomic_load_u64(address) as i64),
            TypeTag::AtomicU64 => Value::Unsigned(self.atomic_load_u64(address)),
        }
    }

    /// Write `value` at `address` in the format of `tag`.
    ///
    /// Integers are truncated to the tag's width; floats stored to integer
    /// tags saturate.
    ///
    /// # Panics
    ///
    /// Panics on `void`/`null`, on out-of-region access, on misaligned
    /// atomic tags, and on pointer values that do not fit the region's
    /// address width.
    pub fn write(&self, tag: TypeTag, address: Address, value: Value) {
        match tag {
            TypeTag::Void | TypeTag::Null => panic!("cannot write through the {tag} tag"),
            TypeTag::I8 => self.store(address, &int_of!(value, i8).to_le_bytes()),
            TypeTag::U8 => self.write_u8(address, int_of!(value, u8)),
            TypeTag::I16 => self.store(address, &int_of!(value, i16).to_le_bytes()),
            TypeTag::U16 => self.write_u16(address, int_of!(value, u16)),
            TypeTag::I32 => self.write_i32(address, int_of!(value, i32)),
            TypeTag::U32 => self.write_u32(address, int_of!(value, u32)),
            TypeTag::I64 => self.write_i64(address, int_of!(value, i64)),
            TypeTag::U64 => self.write_u64(address, int_of!(value, u64)),
            TypeTag::F32 => self.write_f32(address, value.as_f64() as f32),
            TypeTag::F64 => self.write_f64(address, value.as_f64()),
            TypeTag::Pointer => self.write_address(address, value.as_address()),
            TypeTag::AtomicI8 => self.atomic_store_u8(address, int_of!(value, i8) as u8),
            TypeTag::AtomicU8 => self.atomic_store_u8(address, int_of!(value, u8)),
            TypeTag::AtomicI16 => self.atomic_store_u16(address, int_of!(value, i16) as u16),
            TypeTag::AtomicU16 => self.atomic_store_u16(address, int_of!(value, u16)),
            TypeTag::AtomicI32 => self.atomic_store_u32(address, int_of!(value, i32) as u32),
            TypeTag::AtomicU32 => self.atomic_store_u32(address, int_of!(value, u32)),
            TypeTag::AtomicI64 => self.atomic_store_u64(address, int_of!(value, i64) as u64),
            TypeTag::AtomicU64 => self.atomic_store_u64(address, int_of!(value, u64)),
        }
    }

    // ── Bulk ───────────────────────────────────────────────────────

    /// Set `len` bytes at `address` to `byte`.
    pub fn fill(&self, address: Address, byte: u8, len: usize) {
        let offset = self.region().check_range(address, len);
        self.region().raw().fill(offset, byte, len);
    }

    /// Copy `len` bytes from `src` to `dst`. Overlapping ranges are fine.
    pub fn copy(&self, dst: Address, src: Address, len: usize) {
        let dst_off = self.region().check_range(dst, len);
        let src_off = self.region().check_range(src, len);
        self.region().raw().copy_within(dst_off, src_off, len);
    }

    /// Copy bytes out of the region.
    pub fn read_bytes(&self, address: Address, dst: &mut [u8]) {
        let offset = self.region().check_range(address, dst.len());
        self.region().raw().load(offset, dst);
    }

    /// Copy bytes into the region.
    pub fn write_bytes(&self, address: Address, src: &[u8]) {
        self.store(address, src);
    }

    /// `len` bytes at `address` as a new vector.
    pub fn to_vec(&self, address: Address, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.read_bytes(address, &mut out);
        out
    }

    // ── Typed helpers ──────────────────────────────────────────────

    /// Read a `u8`.
    pub fn read_u8(&self, address: Address) -> u8 {
        u8::from_le_bytes(self.load(address))
    }

    /// Write a `u8`.
    pub fn write_u8(&self, address: Address, v: u8) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read a `u16`.
    pub fn read_u16(&self, address: Address) -> u16 {
        u16::from_le_bytes(self.load(address))
    }

    /// Write a `u16`.
    pub fn write_u16(&self, address: Address, v: u16) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read a `u32`.
    pub fn read_u32(&self, address: Address) -> u32 {
        u32::from_le_bytes(self.load(address))
    }

    /// Write a `u32`.
    pub fn write_u32(&self, address: Address, v: u32) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read an `i32`.
    pub fn read_i32(&self, address: Address) -> i32 {
        i32::from_le_bytes(self.load(address))
    }

    /// Write an `i32`.
    pub fn write_i32(&self, address: Address, v: i32) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read a `u64`.
    pub fn read_u64(&self, address: Address) -> u64 {
        u64::from_le_bytes(self.load(address))
    }

    /// Write a `u64`.
    pub fn write_u64(&self, address: Address, v: u64) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read an `i64`.
    pub fn read_i64(&self, address: Address) -> i64 {
        i64::from_le_bytes(self.load(address))
    }

    /// Write an `i64`.
    pub fn write_i64(&self, address: Address, v: i64) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read an `f32`.
    pub fn read_f32(&self, address: Address) -> f32 {
        f32::from_le_bytes(self.load(address))
    }

    /// Write an `f32`.
    pub fn write_f32(&self, address: Address, v: f32) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read an `f64`.
    pub fn read_f64(&self, address: Address) -> f64 {
        f64::from_le_bytes(self.load(address))
    }

    /// Write an `f64`.
    pub fn write_f64(&self, address: Address, v: f64) {
        self.store(address, &v.to_le_bytes());
    }

    /// Read a pointer of the region's width.
    pub fn read_address(&self, address: Address) -> Address {
        match self.width() {
            AddressWidth::W32 => Address(self.read_u32(address) as u64),
            AddressWidth::W64 => Address(self.read_u64(address)),
        }
    }

    /// Write a pointer of the region's width.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not fit the width.
    pub fn write_address(&self, address: Address, value: Address) {
        let bytes = self.width().encode(value);
        self.store(address, &bytes);
    }

    // ── Atomics ────────────────────────────────────────────────────

    fn atomic_offset(&self, address: Address, size: usize) -> usize {
        self.region().check_range(address, size)
    }

    fn atomic_load_u8(&self, address: Address) -> u8 {
        let offset = self.atomic_offset(address, 1);
        self.region().raw().atomic_u8(offset).load(Ordering::SeqCst)
    }

    fn atomic_store_u8(&self, address: Address, v: u8) {
        let offset = self.atomic_offset(address, 1);
        self.region().raw().atomic_u8(offset).store(v, Ordering::SeqCst);
    }

    fn atomic_load_u16(&self, address: Address) -> u16 {
        let offset = self.atomic_offset(address, 2);
        self.region().raw().atomic_u16(offset).load(Ordering::SeqCst)
    }

    fn atomic_store_u16(&self, address: Address, v: u16) {
        let offset = self.atomic_offset(address, 2);
        self.region().raw().atomic_u16(offset).store(v, Ordering::SeqCst);
    }

    /// Atomic load of an aligned `u32`.
    pub fn atomic_load_u32(&self, address: Address) -> u32 {
        let offset = self.atomic_offset(address, 4);
        self.region().raw().atomic_u32(offset).load(Ordering::SeqCst)
    }

    /// Atomic store of an aligned `u32`.
    pub fn atomic_store_u32(&self, address: Address, v: u32) {
        let offset = self.atomic_offset(address, 4);
        self.region().raw().atomic_u32(offset).store(v, Ordering::SeqCst);
    }

    /// Atomic wrapping add on an aligned `u32`; returns the previous value.
    pub fn fetch_add_u32(&self, address: Address, v: u32) -> u32 {
        let offset = self.atomic_offset(address, 4);
        self.region().raw().atomic_u32(offset).fetch_add(v, Ordering::SeqCst)
    }

    /// Atomic wrapping subtract on an aligned `u32`; returns the previous
    /// value.
    pub fn fetch_sub_u32(&self, address: Address, v: u32) -> u32 {
        let offset = self.atomic_offset(address, 4);
        self.region().raw().atomic_u32(offset).fetch_sub(v, Ordering::SeqCst)
    }

    /// Atomic compare-and-swap on an aligned `u32`.
    ///
    /// `Ok(previous)` if the cell held `current` and now holds `new`;
    /// `Err(actual)` otherwise.
    pub fn compare_exchange_u32(
        &self,
        address: Address,
        current: u32,
        new: u32,
    ) -> Result<u32, u32> {
        let offset = self.atomic_offset(address, 4);
        self.region().raw().atomic_u32(offset).compare_exchange(
            current,
            new,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
    }

    /// Atomic load of an aligned `u64`.
    pub fn atomic_load_u64(&self, address: Address) -> u64 {
        let offset = self.atomic_offset(address, 8);
        self.region().raw().atomic_u64(offset).load(Ordering::SeqCst)
    }

    /// Atomic store of an aligned `u64`.
    pub fn atomic_store_u64(&self, address: Address, v: u64) {
        let offset = self.atomic_offset(address, 8);
        self.region().raw().atomic_u64(offset).store(v, Ordering::SeqCst);
    }

    /// Atomic wrapping add on an aligned `u64`; returns the previous value.
    pub fn fetch_add_u64(&self, address: Address, v: u64) -> u64 {
        let offset = self.atomic_offset(address, 8);
        self.region().raw().atomic_u64(offset).fetch_add(v, Ordering::SeqCst)
    }

    /// Atomic wrapping subtract on an aligned `u64`; returns the previous
    /// value.
    pub fn fetch_sub_u64(&self, address: Address, v: u64) -> u64 {
        let offset = self.atomic_offset(address, 8);
        self.region().raw().atomic_u64(offset).fetch_sub(v, Ordering::SeqCst)
    }

    /// Atomic compare-and-swap on an aligned `u64`.
    pub fn compare_exchange_u64(
        &self,
        address: Address,
        current: u64,
        new: u64,
    ) -> Result<u64, u64> {
        let offset = self.atomic_offset(address, 8);
        self.region().raw().atomic_u64(offset).compare_exchange(
            current,
            new,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    fn accessor(width: AddressWidth) -> MemoryAccessor {
        MemoryAccessor::new(LinearMemory::shared(MemoryConfig::new(width)).unwrap())
    }

    #[test]
    fn u32_all_ones_reads_unsigned() {
        let acc = accessor(AddressWidth::W32);
        acc.write(TypeTag::U32, Address(16), Value::Unsigned(0xFFFF_FFFF));
        assert_eq!(acc.read(TypeTag::U32, Address(16)), Value::Unsigned(4_294_967_295));
        assert_eq!(acc.read(TypeTag::I32, Address(16)), Value::Signed(-1));
    }

    #[test]
    fn sixty_four_bit_values_are_exact() {
        let acc = accessor(AddressWidth::W32);
        acc.write(TypeTag::U64, Address(8), Value::Unsigned(u64::MAX - 1));
        assert_eq!(acc.read(TypeTag::U64, Address(8)), Value::Unsigned(u64::MAX - 1));
        acc.write(TypeTag::I64, Address(8), Value::Signed(i64::MIN));
        assert_eq!(acc.read(TypeTag::I64, Address(8)), Value::Signed(i64::MIN));
    }

    #[test]
    fn stores_truncate_and_saturate() {
        let acc = accessor(AddressWidth::W32);
        acc.write(TypeTag::U8, Address(8), Value::Unsigned(0x1FF));
        assert_eq!(acc.read(TypeTag::U8, Address(8)), Value::Unsigned(0xFF));
        acc.write(TypeTag::I8, Address(8), Value::Float(1000.0));
        assert_eq!(acc.read(TypeTag::I8, Address(8)), Value::Signed(127));
        acc.write(TypeTag::U16, Address(8), Value::Signed(-1));
        assert_eq!(acc.read(TypeTag::U16, Address(8)), Value::Unsigned(0xFFFF));
    }

    #[test]
    fn unaligned_plain_access() {
        let acc = accessor(AddressWidth::W32);
        acc.write(TypeTag::F64, Address(13), Value::Float(2.5));
        assert_eq!(acc.read(TypeTag::F64, Address(13)), Value::Float(2.5));
    }

    #[test]
    fn pointer_width_follows_region() {
        let narrow = accessor(AddressWidth::W32);
        narrow.write(TypeTag::Pointer, Address(8), Value::Pointer(Address(0x40)));
        narrow.write_u32(Address(12), 0xAAAA_AAAA);
        assert_eq!(narrow.read(TypeTag::Pointer, Address(8)), Value::Pointer(Address(0x40)));
        assert_eq!(narrow.read_u32(Address(12)), 0xAAAA_AAAA);

        let wide = accessor(AddressWidth::W64);
        wide.write(TypeTag::Pointer, Address(8), Value::Pointer(Address(1 << 40)));
        assert_eq!(wide.read_u64(Address(8)), 1 << 40);
    }

    #[test]
    fn atomic_tags_share_storage_with_plain() {
        let acc = accessor(AddressWidth::W32);
        acc.write(TypeTag::AtomicI16, Address(8), Value::Signed(-2));
        assert_eq!(acc.read(TypeTag::I16, Address(8)), Value::Signed(-2));
        assert_eq!(acc.read(TypeTag::AtomicU16, Address(8)), Value::Unsigned(0xFFFE));
    }

    #[test]
    fn rmw_helpers() {
        let acc = accessor(AddressWidth::W32);
        let a = Address(64);
        assert_eq!(acc.fetch_add_u32(a, 5), 0);
        assert_eq!(acc.fetch_sub_u32(a, 2), 5);
        assert_eq!(acc.compare_exchange_u32(a, 3, 10), Ok(3));
        assert_eq!(acc.compare_exchange_u32(a, 3, 11), Err(10));
        assert_eq!(acc.atomic_load_u32(a), 10);
        acc.atomic_store_u64(Address(72), 7);
        assert_eq!(acc.fetch_add_u64(Address(72), 1), 7);
        assert_eq!(acc.compare_exchange_u64(Address(72), 8, 0), Ok(8));
    }

    #[test]
    fn fill_and_overlapping_copy() {
        let acc = accessor(AddressWidth::W32);
        acc.write_bytes(Address(100), &[1, 2, 3, 4]);
        acc.copy(Address(102), Address(100), 4);
        assert_eq!(acc.to_vec(Address(100), 6), vec![1, 2, 1, 2, 3, 4]);
        acc.fill(Address(100), 0xEE, 3);
        assert_eq!(acc.to_vec(Address(100), 4), vec![0xEE, 0xEE, 0xEE, 2]);
    }

    #[test]
    #[should_panic(expected = "cannot read through the void tag")]
    fn void_read_panics() {
        accessor(AddressWidth::W32).read(TypeTag::Void, Address(8));
    }

    #[test]
    #[should_panic(expected = "cannot write through the null tag")]
    fn null_write_panics() {
        accessor(AddressWidth::W32).write(TypeTag::Null, Address(8), Value::Unsigned(0));
    }

    #[test]
    #[should_panic(expected = "outside region")]
    fn out_of_region_panics() {
        let acc = accessor(AddressWidth::W32);
        let end = acc.memory().len() as u64;
        acc.read(TypeTag::U16, Address(end - 1));
    }

    #[test]
    #[should_panic(expected = "not 4-byte aligned")]
    fn misaligned_atomic_panics() {
        accessor(AddressWidth::W32).atomic_load_u32(Address(6));
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn storable_tag() -> impl Strategy<Value = TypeTag> {
            proptest::sample::select(
                TypeTag::ALL
                    .iter()
                    .copied()
                    .filter(|t| t.is_storable())
                    .collect::<Vec<_>>(),
            )
        }

        /// An in-range value for `tag`, built from random bits.
        fn in_range(tag: TypeTag, bits: u64) -> Value {
            match tag.non_atomic() {
                TypeTag::I8 => Value::Signed(bits as i8 as i64),
                TypeTag::U8 => Value::Unsigned(bits as u8 as u64),
                TypeTag::I16 => Value::Signed(bits as i16 as i64),
                TypeTag::U16 => Value::Unsigned(bits as u16 as u64),
                TypeTag::I32 => Value::Signed(bits as i32 as i64),
                TypeTag::U32 => Value::Unsigned(bits as u32 as u64),
                TypeTag::I64 => Value::Signed(bits as i64),
                TypeTag::U64 => Value::Unsigned(bits),
                TypeTag::F32 => Value::Float(f32::from_bits(bits as u32 & 0x7F7F_FFFF) as f64),
                TypeTag::F64 => Value::Float(f64::from_bits(bits & 0x7FEF_FFFF_FFFF_FFFF)),
                TypeTag::Pointer => Value::Pointer(Address(bits as u32 as u64)),
                other => unreachable!("{other} is not storable"),
            }
        }

        proptest! {
            #[test]
            fn round_trip_every_tag(tag in storable_tag(), bits in any::<u64>(), slot in 1u64..64) {
                let acc = accessor(AddressWidth::W32);
                let address = Address(slot * 8);
                let value = in_range(tag, bits);
                acc.write(tag, address, value);
                prop_assert_eq!(acc.read(tag, address), value);
            }
        }
    }
}
