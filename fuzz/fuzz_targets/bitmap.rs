#![no_main]

use arbitrary::Arbitrary;
use commonware_codec::{Decode, Encode};
use ewah::EwahBitmap;
use libfuzzer_sys::fuzz_target;

const MAX_BITS: u32 = 1 << 16;

#[derive(Arbitrary, Debug)]
enum Operation {
    Set(u16),
    AppendSet(u16),
    Get(u16),
    Resize(u16, bool),
    Invert,
    Clear,
    Snapshot,
    And,
    Or,
    Xor,
    AndNot,
    Intersects,
}

fn expected_positions(model: &[bool], len: u32) -> Vec<u32> {
    (0..len).filter(|&i| model[i as usize]).collect()
}

fuzz_target!(|ops: Vec<Operation>| {
    let mut bitmap = EwahBitmap::new();
    let mut model = vec![false; MAX_BITS as usize];
    let mut len = 0u32;

    let mut other = EwahBitmap::new();
    let mut other_model = vec![false; MAX_BITS as usize];
    let mut other_len = 0u32;

    for op in ops {
        match op {
            Operation::Set(index) => {
                let index = index as u32;
                bitmap.set(index);
                model[index as usize] = true;
                len = len.max(index + 1);
            }
            Operation::AppendSet(index) => {
                let index = index as u32;
                let appended = bitmap.append_set(index);
                assert_eq!(appended, index >= len);
                if appended {
                    model[index as usize] = true;
                    len = index + 1;
                }
            }
            Operation::Get(index) => {
                let index = index as u32;
                assert_eq!(bitmap.get(index), index < len && model[index as usize]);
            }
            Operation::Resize(new_len, value) => {
                let new_len = new_len as u32;
                let resized = bitmap.resize(new_len, value);
                assert_eq!(resized, new_len >= len);
                if resized {
                    for slot in &mut model[len as usize..new_len as usize] {
                        *slot = value;
                    }
                    len = new_len;
                }
            }
            Operation::Invert => {
                bitmap.invert();
                for slot in &mut model[..len as usize] {
                    *slot = !*slot;
                }
            }
            Operation::Clear => {
                bitmap.clear();
                model.fill(false);
                len = 0;
            }
            Operation::Snapshot => {
                other = bitmap.clone();
                other_model.copy_from_slice(&model);
                other_len = len;
            }
            Operation::And => {
                let max = len.max(other_len);
                let expected: Vec<u32> = (0..max)
                    .filter(|&i| model[i as usize] && other_model[i as usize])
                    .collect();
                let result = bitmap.and(&other);
                assert_eq!(result.positions(), expected);
                assert_eq!(bitmap.and_count(&other), expected.len() as u64);
                assert_eq!(result.bit_len(), max);
            }
            Operation::Or => {
                let max = len.max(other_len);
                let expected: Vec<u32> = (0..max)
                    .filter(|&i| model[i as usize] || other_model[i as usize])
                    .collect();
                let result = bitmap.or(&other);
                assert_eq!(result.positions(), expected);
                assert_eq!(bitmap.or_count(&other), expected.len() as u64);
            }
            Operation::Xor => {
                let max = len.max(other_len);
                let expected: Vec<u32> = (0..max)
                    .filter(|&i| model[i as usize] != other_model[i as usize])
                    .collect();
                let result = bitmap.xor(&other);
                assert_eq!(result.positions(), expected);
                assert_eq!(bitmap.xor_count(&other), expected.len() as u64);
            }
            Operation::AndNot => {
                let max = len.max(other_len);
                let expected: Vec<u32> = (0..max)
                    .filter(|&i| model[i as usize] && !other_model[i as usize])
                    .collect();
                let result = bitmap.and_not(&other);
                assert_eq!(result.positions(), expected);
                assert_eq!(bitmap.and_not_count(&other), expected.len() as u64);
            }
            Operation::Intersects => {
                let overlaps = (0..MAX_BITS as usize).any(|i| model[i] && other_model[i]);
                assert_eq!(bitmap.intersects(&other), overlaps);
            }
        }
    }

    assert_eq!(bitmap.positions(), expected_positions(&model, len));
    assert_eq!(bitmap.count_ones(), expected_positions(&model, len).len() as u64);
    assert_eq!(bitmap.bit_len(), len);

    let encoded = bitmap.encode();
    let decoded = EwahBitmap::decode_cfg(&mut encoded.as_ref(), &(..).into()).unwrap();
    assert_eq!(decoded, bitmap);
});
