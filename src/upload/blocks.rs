//! Block planning for fixed-size chunked uploads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

// Block size: 4MB per block
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// One planned block: a half-open byte range and its deterministic id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    pub index: u32,
    pub start: u64,
    pub end: u64,
    pub id: String,
}

impl BlockPlan {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Block id for an index: the zero-padded 6-digit decimal, base64-encoded.
/// Ids depend only on the index, so every attempt reproduces the same id.
pub fn block_id(index: u32) -> String {
    BASE64.encode(format!("{:06}", index))
}

/// Number of blocks needed to cover `file_size` bytes.
pub fn block_count(file_size: u64) -> u32 {
    file_size.div_ceil(BLOCK_SIZE) as u32
}

/// Plan the ordered blocks covering `[0, file_size)`. A zero-byte file
/// plans no blocks.
pub fn plan_blocks(file_size: u64) -> Vec<BlockPlan> {
    (0..block_count(file_size))
        .map(|index| {
            let start = index as u64 * BLOCK_SIZE;
            let end = std::cmp::min(start + BLOCK_SIZE, file_size);
            BlockPlan {
                index,
                start,
                end,
                id: block_id(index),
            }
        })
        .collect()
}

/// The full ordered id list for `total_blocks` blocks, as the commit step
/// must send it.
pub fn ordered_block_ids(total_blocks: u32) -> Vec<String> {
    (0..total_blocks).map(block_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_partition_the_file_exactly() {
        let sizes = [
            1u64,
            BLOCK_SIZE - 1,
            BLOCK_SIZE,
            BLOCK_SIZE + 1,
            3 * BLOCK_SIZE,
            10 * 1024 * 1024 + 17,
        ];
        for &size in &sizes {
            let plans = plan_blocks(size);
            assert_eq!(plans.len() as u64, size.div_ceil(BLOCK_SIZE));
            assert_eq!(plans[0].start, 0);
            assert_eq!(plans.last().unwrap().end, size);
            for pair in plans.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
            for plan in &plans {
                assert!(plan.size() > 0 && plan.size() <= BLOCK_SIZE);
            }
        }
    }

    #[test]
    fn ten_mib_file_splits_into_4_4_2() {
        let plans = plan_blocks(10 * 1024 * 1024);
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].size(), 4 * 1024 * 1024);
        assert_eq!(plans[1].size(), 4 * 1024 * 1024);
        assert_eq!(plans[2].size(), 2 * 1024 * 1024);
    }

    #[test]
    fn zero_byte_file_plans_no_blocks() {
        assert!(plan_blocks(0).is_empty());
        assert_eq!(block_count(0), 0);
        assert!(ordered_block_ids(0).is_empty());
    }

    #[test]
    fn block_ids_are_base64_of_padded_index() {
        assert_eq!(block_id(0), "MDAwMDAw");
        assert_eq!(block_id(7), "MDAwMDA3");
        assert_eq!(block_id(42), "MDAwMDQy");
        assert_eq!(block_id(123_456), "MTIzNDU2");
    }

    #[test]
    fn ordered_ids_match_plan_order() {
        let plans = plan_blocks(9 * 1024 * 1024);
        let ids = ordered_block_ids(plans.len() as u32);
        let planned: Vec<String> = plans.iter().map(|plan| plan.id.clone()).collect();
        assert_eq!(ids, planned);
    }
}
