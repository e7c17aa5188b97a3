//! AVL insertion, deletion, lookup, and traversal over arena-resident nodes.
//!
//! Each function takes ownership, in the borrow-checker sense, of a subtree
//! *reference* and returns the (possibly rotated) reference that should
//! replace it in the caller. Tree height is `O(log n)` under the AVL
//! invariant, so plain recursion is used throughout rather than an explicit
//! stack.

use std::cmp::Ordering;

use scm_mem::Arena;

use crate::error::{IndexError, Result};
use crate::node::{
    alloc_node, count_of, depth_of, item_bytes, item_bytes_at, item_of, left_of, min_node,
    recompute_depth, right_of, rotate_left, rotate_right, set_count, set_item, set_left,
    set_right, NodeOffset,
};

fn balance_of(arena: &Arena, off: NodeOffset) -> i32 {
    depth_of(arena, left_of(arena, off)) - depth_of(arena, right_of(arena, off))
}

/// Rebalances `off` after an insertion, given the just-inserted `word` to
/// break ties between the single and double rotation cases.
fn rebalance_after_insert(arena: &Arena, off: NodeOffset, word: &[u8]) -> NodeOffset {
    recompute_depth(arena, off);
    let balance = balance_of(arena, off);

    if balance > 1 {
        let left = left_of(arena, off);
        if word.cmp(item_bytes(arena, left)) == Ordering::Less {
            rotate_right(arena, off)
        } else {
            set_left(arena, off, rotate_left(arena, left));
            rotate_right(arena, off)
        }
    } else if balance < -1 {
        let right = right_of(arena, off);
        if word.cmp(item_bytes(arena, right)) == Ordering::Greater {
            rotate_left(arena, off)
        } else {
            set_right(arena, off, rotate_right(arena, right));
            rotate_left(arena, off)
        }
    } else {
        off
    }
}

/// Rebalances `off` after a deletion, keyed on the heavy child's own
/// balance since the deleted key is no longer available as a tiebreaker.
fn rebalance_after_delete(arena: &Arena, off: NodeOffset) -> NodeOffset {
    if off.is_null() {
        return off;
    }
    recompute_depth(arena, off);
    let balance = balance_of(arena, off);

    if balance > 1 {
        let left = left_of(arena, off);
        if balance_of(arena, left) >= 0 {
            rotate_right(arena, off)
        } else {
            set_left(arena, off, rotate_left(arena, left));
            rotate_right(arena, off)
        }
    } else if balance < -1 {
        let right = right_of(arena, off);
        if balance_of(arena, right) <= 0 {
            rotate_left(arena, off)
        } else {
            set_right(arena, off, rotate_right(arena, right));
            rotate_left(arena, off)
        }
    } else {
        off
    }
}

/// Inserts `word` into the subtree rooted at `off`. Returns the (possibly
/// rotated) new subtree root. `*items`/`*unique` are updated in place so the
/// caller can persist them into the Index state record after the whole
/// insertion returns.
pub fn insert(
    arena: &Arena,
    off: NodeOffset,
    word: &[u8],
    items: &mut u64,
    unique: &mut u64,
) -> Result<NodeOffset> {
    if off.is_null() {
        let new_off = alloc_node(arena, word)?;
        *items = items.checked_add(1).unwrap_or_else(|| {
            debug_assert!(false, "items counter overflowed");
            u64::MAX
        });
        *unique = unique.checked_add(1).unwrap_or_else(|| {
            debug_assert!(false, "unique counter overflowed");
            u64::MAX
        });
        return Ok(new_off);
    }

    match word.cmp(item_bytes(arena, off)) {
        Ordering::Equal => {
            let new_count = count_of(arena, off).checked_add(1).unwrap_or_else(|| {
                debug_assert!(false, "count counter overflowed");
                u64::MAX
            });
            set_count(arena, off, new_count);
            *items = items.checked_add(1).unwrap_or_else(|| {
                debug_assert!(false, "items counter overflowed");
                u64::MAX
            });
            Ok(off)
        }
        Ordering::Less => {
            let new_left = insert(arena, left_of(arena, off), word, items, unique)?;
            set_left(arena, off, new_left);
            Ok(rebalance_after_insert(arena, off, word))
        }
        Ordering::Greater => {
            let new_right = insert(arena, right_of(arena, off), word, items, unique)?;
            set_right(arena, off, new_right);
            Ok(rebalance_after_insert(arena, off, word))
        }
    }
}

/// Deletes `word` from the subtree rooted at `off`. Returns the new subtree
/// root and the deleted node's former `count`.
pub fn delete(arena: &Arena, off: NodeOffset, word: &[u8]) -> Result<(NodeOffset, u64)> {
    if off.is_null() {
        return Err(IndexError::NotFound);
    }

    match word.cmp(item_bytes(arena, off)) {
        Ordering::Less => {
            let (new_left, removed) = delete(arena, left_of(arena, off), word)?;
            set_left(arena, off, new_left);
            Ok((rebalance_after_delete(arena, off), removed))
        }
        Ordering::Greater => {
            let (new_right, removed) = delete(arena, right_of(arena, off), word)?;
            set_right(arena, off, new_right);
            Ok((rebalance_after_delete(arena, off), removed))
        }
        Ordering::Equal => {
            let removed_count = count_of(arena, off);
            let left = left_of(arena, off);
            let right = right_of(arena, off);

            if left.is_null() {
                Ok((right, removed_count))
            } else if right.is_null() {
                Ok((left, removed_count))
            } else {
                let successor = min_node(arena, right);
                let succ_item = item_of(arena, successor);
                let succ_count = count_of(arena, successor);

                set_item(arena, off, succ_item);
                set_count(arena, off, succ_count);

                // SAFETY: `succ_item` was just read from a live node's
                // `item` field, so it is a valid `strdup` offset.
                let succ_bytes = unsafe { item_bytes_at(arena, succ_item) };
                let (new_right, _) = delete(arena, right, succ_bytes)?;
                set_right(arena, off, new_right);

                Ok((rebalance_after_delete(arena, off), removed_count))
            }
        }
    }
}

/// Returns the `count` stored for `word`, or 0 if absent.
pub fn exists(arena: &Arena, mut off: NodeOffset, word: &[u8]) -> u64 {
    while !off.is_null() {
        match word.cmp(item_bytes(arena, off)) {
            Ordering::Equal => return count_of(arena, off),
            Ordering::Less => off = left_of(arena, off),
            Ordering::Greater => off = right_of(arena, off),
        }
    }
    0
}

/// Visits every node in the subtree rooted at `off` in ascending key order.
pub fn traverse(arena: &Arena, off: NodeOffset, callback: &mut dyn FnMut(&str, u64)) {
    if off.is_null() {
        return;
    }
    traverse(arena, left_of(arena, off), callback);
    let text = String::from_utf8_lossy(item_bytes(arena, off));
    callback(&text, count_of(arena, off));
    traverse(arena, right_of(arena, off), callback);
}

/// Recomputes the depth of every reachable node bottom-up and asserts, at
/// each one, the AVL balance invariant (`|depth(left) - depth(right)| <= 1`)
/// and the depth recurrence (`depth = 1 + max(depth(left), depth(right))`).
/// Panics on the first violation. Returns the depth of the subtree rooted at
/// `off` so callers recurse without a second traversal.
///
/// Exposed to the rest of the crate for `Index::debug_assert_balanced`; not
/// on any production insert/delete/lookup path.
pub(crate) fn assert_balanced(arena: &Arena, off: NodeOffset) -> i32 {
    if off.is_null() {
        return -1;
    }
    let left_depth = assert_balanced(arena, left_of(arena, off));
    let right_depth = assert_balanced(arena, right_of(arena, off));

    let balance = left_depth - right_depth;
    assert!(
        balance.abs() <= 1,
        "AVL balance violated at {off:?}: left depth {left_depth}, right depth {right_depth}"
    );

    let expected_depth = 1 + left_depth.max(right_depth);
    let stored_depth = depth_of(arena, off);
    assert_eq!(
        stored_depth, expected_depth,
        "depth recurrence violated at {off:?}: stored {stored_depth}, expected {expected_depth}"
    );

    expected_depth
}
