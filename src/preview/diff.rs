//! Incremental preview updates.
//!
//! Old and new block lists are compared by key. The common prefix and suffix
//! are kept as they are (with their measured heights and highlighted code);
//! only the middle range is swapped for the new blocks.

use super::render::PreviewBlock;

/// Replace `removed` old blocks at `start` with `inserted` new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Patch {
    pub start: usize,
    pub removed: usize,
    pub inserted: usize,
}

pub fn diff_keys(old: &[u64], new: &[u64]) -> Patch {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();

    // The suffix must not overlap the prefix on either side
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    Patch {
        start: prefix,
        removed: old.len() - prefix - suffix,
        inserted: new.len() - prefix - suffix,
    }
}

/// Bring `blocks` up to date with `fresh`, reusing unchanged blocks.
pub fn apply(blocks: &mut Vec<PreviewBlock>, fresh: Vec<PreviewBlock>) -> Patch {
    let old_keys: Vec<u64> = blocks.iter().map(|b| b.key).collect();
    let new_keys: Vec<u64> = fresh.iter().map(|b| b.key).collect();
    let patch = diff_keys(&old_keys, &new_keys);
    let suffix_len = fresh.len() - patch.start - patch.inserted;

    let mut fresh = fresh.into_iter();

    // Kept blocks may have moved; refresh their positions only
    for block in blocks.iter_mut().take(patch.start) {
        if let Some(new) = fresh.next() {
            refresh_position(block, new);
        }
    }

    let middle: Vec<PreviewBlock> = fresh.by_ref().take(patch.inserted).collect();
    let suffix_start = patch.start + patch.removed;
    blocks.splice(patch.start..suffix_start, middle);

    let suffix_from = patch.start + patch.inserted;
    for (block, new) in blocks[suffix_from..].iter_mut().zip(fresh) {
        refresh_position(block, new);
    }
    debug_assert_eq!(blocks.len(), suffix_from + suffix_len);

    patch
}

fn refresh_position(block: &mut PreviewBlock, new: PreviewBlock) {
    block.lines = new.lines;
    block.node = new.node;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::{MarkdownOptions, PlainTex};
    use crate::preview::render::{build_blocks, MeasuredHeight};

    fn build(text: &str) -> Vec<PreviewBlock> {
        build_blocks(text, &MarkdownOptions::default(), &PlainTex)
    }

    #[test]
    fn test_diff_identical() {
        let patch = diff_keys(&[1, 2, 3], &[1, 2, 3]);
        assert_eq!(
            patch,
            Patch {
                start: 3,
                removed: 0,
                inserted: 0
            }
        );
    }

    #[test]
    fn test_diff_middle_change() {
        let patch = diff_keys(&[1, 2, 3, 4], &[1, 9, 3, 4]);
        assert_eq!(
            patch,
            Patch {
                start: 1,
                removed: 1,
                inserted: 1
            }
        );
    }

    #[test]
    fn test_diff_insert_and_delete() {
        assert_eq!(
            diff_keys(&[1, 2], &[1, 5, 2]),
            Patch {
                start: 1,
                removed: 0,
                inserted: 1
            }
        );
        assert_eq!(
            diff_keys(&[1, 5, 2], &[1, 2]),
            Patch {
                start: 1,
                removed: 1,
                inserted: 0
            }
        );
    }

    #[test]
    fn test_diff_repeated_keys_do_not_overlap() {
        let patch = diff_keys(&[7, 7], &[7, 7, 7]);
        assert_eq!(patch.start + patch.removed, 2);
        assert_eq!(patch.start + patch.inserted, 3);
        assert_eq!(patch.inserted - patch.removed, 1);
    }

    #[test]
    fn test_diff_empty_sides() {
        assert_eq!(
            diff_keys(&[], &[1, 2]),
            Patch {
                start: 0,
                removed: 0,
                inserted: 2
            }
        );
        assert_eq!(diff_keys(&[1], &[]).removed, 1);
    }

    #[test]
    fn test_apply_keeps_cached_heights() {
        let mut blocks = build("# 标题\n\n第一段\n\n第二段\n");
        let measured = MeasuredHeight {
            width: 400.0,
            font_size: 14.0,
            height: 10.0,
        };
        for block in &mut blocks {
            block.height = Some(measured);
        }

        let patch = apply(&mut blocks, build("# 标题\n\n改过的\n\n第二段\n"));
        assert_eq!(
            patch,
            Patch {
                start: 1,
                removed: 1,
                inserted: 1
            }
        );
        assert_eq!(blocks[0].cached_height(400.0, 14.0), Some(10.0));
        assert_eq!(blocks[1].height, None);
        assert_eq!(blocks[2].cached_height(400.0, 14.0), Some(10.0));
    }

    #[test]
    fn test_apply_updates_shifted_lines() {
        let mut blocks = build("段落\n\n尾部\n");
        let patch = apply(&mut blocks, build("段落\n\n新增\n\n尾部\n"));
        assert_eq!(patch.inserted, 1);
        assert_eq!(patch.removed, 0);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].lines, (5, 5));
    }

    #[test]
    fn test_apply_matches_full_rebuild() {
        let before = "# a\n\n- x\n- y\n\n| t |\n| - |\n\ntext\n";
        let after = "# a\n\n- x\n\ntext\n\nmore\n";
        let mut blocks = build(before);
        apply(&mut blocks, build(after));
        let rebuilt = build(after);
        let keys: Vec<u64> = blocks.iter().map(|b| b.key).collect();
        let expected: Vec<u64> = rebuilt.iter().map(|b| b.key).collect();
        assert_eq!(keys, expected);
        let lines: Vec<_> = blocks.iter().map(|b| b.lines).collect();
        let expected_lines: Vec<_> = rebuilt.iter().map(|b| b.lines).collect();
        assert_eq!(lines, expected_lines);
    }
}
