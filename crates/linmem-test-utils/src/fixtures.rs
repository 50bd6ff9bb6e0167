//! Sample descriptors.
//!
//! - [`vec3`]: three `f32`s.
//! - [`rgba`]: a union of a packed `u32` and four `u8` channels.
//! - [`particle`]: nests both, with bit-fields, a composite array and a
//!   typed pointer.
//! - [`node`]: a list node with a value and a `next` pointer.

use std::sync::Arc;

use linmem_core::{AddressWidth, DescriptorBuilder, FieldSpec, TypeDescriptor, TypeTag};

pub fn vec3(width: AddressWidth) -> Arc<TypeDescriptor> {
    DescriptorBuilder::new("Vec3", width)
        .scalar("x", TypeTag::F32)
        .scalar("y", TypeTag::F32)
        .scalar("z", TypeTag::F32)
        .build()
        .expect("Vec3 layout is valid")
}

pub fn rgba(width: AddressWidth) -> Arc<TypeDescriptor> {
    DescriptorBuilder::union("Rgba", width)
        .scalar("packed", TypeTag::U32)
        .array("channels", TypeTag::U8, 4)
        .build()
        .expect("Rgba layout is valid")
}

pub fn particle(width: AddressWidth) -> Arc<TypeDescriptor> {
    let v3 = vec3(width);
    DescriptorBuilder::new("Particle", width)
        .scalar("id", TypeTag::U64)
        .nested("pos", &v3)
        .nested("color", &rgba(width))
        .bit_field("active", TypeTag::U16, 1)
        .bit_field("layer", TypeTag::U16, 5)
        .bit_field("charge", TypeTag::I16, 4)
        .field(FieldSpec::composite("history", &v3).array(2))
        .pointer_to("parent", &v3)
        .scalar("mass", TypeTag::F64)
        .build()
        .expect("Particle layout is valid")
}

pub fn node(width: AddressWidth) -> Arc<TypeDescriptor> {
    DescriptorBuilder::new("Node", width)
        .scalar("value", TypeTag::I32)
        .pointer("next", TypeTag::Void)
        .build()
        .expect("Node layout is valid")
}
