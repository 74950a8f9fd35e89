//! Word-aligned run-length-encoded compressed bitmap.
//!
//! [EwahBitmap] represents a large boolean vector as a sequence of clauses
//! over 64-bit words. Each clause opens with a header word describing a run
//! of uniform (all-zero or all-one) words, stored as a count, followed by a
//! count of "literal" words copied verbatim because they are mixed:
//!
//! ```text
//! compressed buffer
//! +----------+---------+---------+----------+---------+-----+
//! | header 0 | literal | literal | header 1 | literal | ... |
//! +----------+---------+---------+----------+---------+-----+
//!      |                              |
//!      v                              v
//! +------------------------+----------------------+---------+
//! |  literal count (31 b)  | running length (32 b) | run bit |
//! +------------------------+----------------------+---------+
//! bit 63                                                bit 0
//! ```
//!
//! A run of a million zero words costs one header; a region with no
//! structure degrades to one literal word per 64 bits plus one header per
//! 2^31 words. Both CPU cost and memory footprint stay close to the entropy
//! of the data.
//!
//! # Set algebra without decompression
//!
//! [EwahBitmap::and], [EwahBitmap::or], [EwahBitmap::xor] and
//! [EwahBitmap::and_not] merge two compressed operands clause by clause:
//! runs combine in O(1) regardless of their length, and word-level work is
//! confined to regions where an operand stores literals. The merge loops
//! write through the [Sink] trait, so the `*_count` variants reuse them
//! with a [BitCounter] to answer cardinality queries without materializing
//! a result, and [EwahBitmap::or_all] merges any number of operands in a
//! single pass.
//!
//! # Example
//!
//! ```
//! use ewah::EwahBitmap;
//!
//! let mut a = EwahBitmap::new();
//! a.set(1);
//! a.set(2);
//! a.set(3);
//!
//! let b: EwahBitmap = [2u32, 3, 4].into_iter().collect();
//!
//! assert_eq!(a.and(&b).positions(), vec![2, 3]);
//! assert_eq!(a.and_count(&b), 2);
//! assert_eq!(a.and_not(&b).positions(), vec![1]);
//! assert!(a.intersects(&b));
//! ```
//!
//! # Limits
//!
//! Bit positions are `u32`; appending in non-decreasing order is the cheap
//! path and arbitrary-order [EwahBitmap::set] is supported but may rewrite
//! the buffer. Mutation requires exclusive access; concurrent readers of
//! the same bitmap are safe as long as no writer is active.

mod bitmap;
mod cursor;
mod iter;
mod ops;
mod rlw;
mod sink;

pub use bitmap::{Error, EwahBitmap};
pub use iter::Iter;
pub use sink::{BitCounter, Sink};
