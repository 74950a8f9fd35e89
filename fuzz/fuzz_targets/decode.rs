#![no_main]

use commonware_codec::{Decode, Encode};
use ewah::EwahBitmap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary input must either fail cleanly or yield a structurally
    // valid bitmap that re-encodes to an equal one.
    let mut buf = data;
    let Ok(bitmap) = EwahBitmap::decode_cfg(&mut buf, &(..=1_000_000usize).into()) else {
        return;
    };

    let encoded = bitmap.encode();
    let decoded = EwahBitmap::decode_cfg(&mut encoded.as_ref(), &(..).into()).unwrap();
    assert_eq!(decoded, bitmap);

    let ones = bitmap.count_ones();
    assert!(ones <= bitmap.bit_len() as u64);
    if bitmap.bit_len() <= 1 << 20 {
        assert_eq!(bitmap.positions().len() as u64, ones);
    }
});
