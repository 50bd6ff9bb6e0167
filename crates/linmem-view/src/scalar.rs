//! Scalar and bit-field loads and stores.

use linmem_core::{Address, BitField, TypeTag, Value};
use linmem_memory::MemoryAccessor;

/// Read a scalar, extracting and (for signed tags) sign-extending a
/// bit-field if there is one.
pub(crate) fn read(
    acc: &MemoryAccessor,
    address: Address,
    tag: TypeTag,
    bits: Option<BitField>,
) -> Value {
    let Some(bf) = bits else {
        return acc.read(tag, address);
    };
    let unit = acc.read(tag, address).as_u64();
    let raw = (unit >> bf.offset) & bf.mask();
    if !tag.is_signed() {
        return Value::Unsigned(raw);
    }
    let sign = bf.width < 64 && (raw >> (bf.width - 1)) & 1 == 1;
    if sign {
        Value::Signed((raw | !bf.mask()) as i64)
    } else {
        Value::Signed(raw as i64)
    }
}

/// Write a scalar. Bit-fields read the storage unit, replace only their
/// own bits, and write it back.
pub(crate) fn write(
    acc: &MemoryAccessor,
    address: Address,
    tag: TypeTag,
    bits: Option<BitField>,
    value: Value,
) {
    let Some(bf) = bits else {
        acc.write(tag, address, value);
        return;
    };
    let unit = acc.read(tag, address).as_u64();
    let mask = bf.mask() << bf.offset;
    let field = (value.as_u64() & bf.mask()) << bf.offset;
    acc.write(tag, address, Value::Unsigned((unit & !mask) | field));
}
