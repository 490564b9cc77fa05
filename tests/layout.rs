// Layout conformance tests for the in-segment structures.
// Every process attaching a segment must agree on these sizes and offsets,
// including processes built from other toolchains.
use memoffset::offset_of;
use shmq::Core::arena::layout::{
    data_offset, directory_offset, pack_data_len, unpack_data_len, ArenaHeader, VariableSlot,
    ACTIVE_REGION_BIT, MAX_NAME_LEN,
};
use std::mem::{align_of, size_of};

#[test]
fn test_arena_header_layout() {
    let size = size_of::<ArenaHeader>();
    let align = align_of::<ArenaHeader>();
    let off_magic = offset_of!(ArenaHeader, magic);
    let off_version = offset_of!(ArenaHeader, version);
    let off_slot_count = offset_of!(ArenaHeader, slot_count);
    let off_slot_capacity = offset_of!(ArenaHeader, slot_capacity);
    let off_data_offset = offset_of!(ArenaHeader, data_offset);

    println!(
        "ArenaHeader => size: {size}, align: {align}, offsets: [magic:{off_magic}, version:{off_version}, slot_count:{off_slot_count}, slot_capacity:{off_slot_capacity}, data_offset:{off_data_offset}]"
    );

    assert_eq!(size, 128);
    assert_eq!(align, 128);
    assert_eq!(off_magic, 0);
    assert_eq!(off_version, 8);
    assert_eq!(off_slot_count, 12);
    assert_eq!(off_slot_capacity, 16);
    assert_eq!(off_data_offset, 24);
}

#[test]
fn test_variable_slot_layout() {
    let size = size_of::<VariableSlot>();
    let off_state = offset_of!(VariableSlot, state);
    let off_name_len = offset_of!(VariableSlot, name_len);
    let off_name = offset_of!(VariableSlot, name);
    let off_data_len = offset_of!(VariableSlot, data_len);

    println!(
        "VariableSlot => size: {size}, offsets: [state:{off_state}, name_len:{off_name_len}, name:{off_name}, data_len:{off_data_len}]"
    );

    // 4 + 4 + 112 + 8 fills exactly one 128-byte line
    assert_eq!(size, 128);
    assert_eq!(align_of::<VariableSlot>(), 128);
    assert_eq!(off_state, 0);
    assert_eq!(off_name_len, 4);
    assert_eq!(off_name, 8);
    assert_eq!(off_data_len, 8 + MAX_NAME_LEN);
}

#[test]
fn test_data_band_offsets() {
    assert_eq!(directory_offset(), 128);
    assert_eq!(data_offset(1), Some(256));
    assert_eq!(data_offset(16), Some(128 + 16 * 128));
    assert_eq!(data_offset(16).unwrap() % 128, 0);
    assert_eq!(data_offset(usize::MAX / 64), None);
}

#[test]
fn test_data_len_packing() {
    assert_eq!(unpack_data_len(0), (0, 0));
    assert_eq!(unpack_data_len(pack_data_len(1, 4096)), (1, 4096));
    assert_eq!(unpack_data_len(pack_data_len(0, 17)), (0, 17));
    assert_eq!(pack_data_len(1, 0), ACTIVE_REGION_BIT);
}
