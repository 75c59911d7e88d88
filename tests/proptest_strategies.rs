//! Proptest strategies for mpboot's wire formats and scan inputs

#![allow(dead_code)]

use mpboot::image::{ProgramFlags, ProgramOwner, ProgramType, SignatureHeader};
use proptest::prelude::*;

/// Any owner firmware knows about
pub fn program_owner() -> impl Strategy<Value = ProgramOwner> {
    prop_oneof![
        Just(ProgramOwner::SYSTEM),
        Just(ProgramOwner::VEX),
        Just(ProgramOwner::PARTNER),
    ]
}

/// Any combination of the defined flag bits
pub fn program_flags() -> impl Strategy<Value = ProgramFlags> {
    (0u32..8).prop_map(ProgramFlags)
}

/// Headers with arbitrary field values, valid or not
pub fn any_header() -> impl Strategy<Value = SignatureHeader> {
    (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
        |(magic, program_type, owner, flags)| SignatureHeader {
            magic,
            program_type: ProgramType(program_type),
            program_owner: ProgramOwner(owner),
            program_flags: ProgramFlags(flags),
        },
    )
}

/// Stack contents: a mix of small integers and heap-looking addresses
pub fn stack_words() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(
        prop_oneof![0usize..64, 0x1000_0000usize..0x1000_1000, any::<usize>()],
        0..96,
    )
}
