//! On-arena layout: the Index state record and tree nodes.
//!
//! Every in-tree reference (`root`, `left`, `right`, `item`) is a `u64` byte
//! offset from the arena's base address rather than an embedded pointer.
//! Offset `0` is reserved as the null sentinel: it is always occupied by the
//! [`IndexState`] record, which is the arena's root allocation, so no node or
//! string is ever placed there.

use std::ffi::CStr;

use scm_mem::Arena;

/// An arena-relative byte offset, or the null sentinel (`0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOffset(pub u64);

impl NodeOffset {
    pub const NULL: NodeOffset = NodeOffset(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// The root allocation: `items`, `unique`, and the offset of the tree root.
///
/// Always placed at the arena's base address (offset 0).
#[repr(C)]
pub struct IndexState {
    pub items: u64,
    pub unique: u64,
    pub root: u64,
}

/// A single tree node. Leaves have `depth = 0`; a null child reads as depth
/// -1 (see [`depth_of`]).
#[repr(C)]
pub struct Node {
    pub depth: i32,
    pub count: u64,
    pub item: u64,
    pub left: u64,
    pub right: u64,
}

/// Resolves an offset into a raw pointer to a `Node` at that offset.
///
/// # Safety
/// `off` must be a non-null offset previously returned by an allocation of a
/// `Node` from this same arena.
unsafe fn node_ptr(arena: &Arena, off: NodeOffset) -> *mut Node {
    debug_assert!(!off.is_null());
    arena.base().add(off.0 as usize) as *mut Node
}

/// The depth of the subtree rooted at `off`, or -1 if `off` is null.
pub fn depth_of(arena: &Arena, off: NodeOffset) -> i32 {
    if off.is_null() {
        -1
    } else {
        unsafe { (*node_ptr(arena, off)).depth }
    }
}

pub fn set_depth(arena: &Arena, off: NodeOffset, depth: i32) {
    unsafe { (*node_ptr(arena, off)).depth = depth };
}

pub fn count_of(arena: &Arena, off: NodeOffset) -> u64 {
    unsafe { (*node_ptr(arena, off)).count }
}

pub fn set_count(arena: &Arena, off: NodeOffset, count: u64) {
    unsafe { (*node_ptr(arena, off)).count = count };
}

pub fn item_of(arena: &Arena, off: NodeOffset) -> u64 {
    unsafe { (*node_ptr(arena, off)).item }
}

pub fn set_item(arena: &Arena, off: NodeOffset, item: u64) {
    unsafe { (*node_ptr(arena, off)).item = item };
}

pub fn left_of(arena: &Arena, off: NodeOffset) -> NodeOffset {
    NodeOffset(unsafe { (*node_ptr(arena, off)).left })
}

pub fn set_left(arena: &Arena, off: NodeOffset, child: NodeOffset) {
    unsafe { (*node_ptr(arena, off)).left = child.0 };
}

pub fn right_of(arena: &Arena, off: NodeOffset) -> NodeOffset {
    NodeOffset(unsafe { (*node_ptr(arena, off)).right })
}

pub fn set_right(arena: &Arena, off: NodeOffset, child: NodeOffset) {
    unsafe { (*node_ptr(arena, off)).right = child.0 };
}

/// Recomputes `depth` from the current depths of `off`'s children.
pub fn recompute_depth(arena: &Arena, off: NodeOffset) {
    let d = 1 + depth_of(arena, left_of(arena, off)).max(depth_of(arena, right_of(arena, off)));
    set_depth(arena, off, d);
}

/// Reads the bytes of the NUL-terminated string at `item_off`.
///
/// # Safety
/// `item_off` must be a non-null offset previously returned by
/// [`Arena::strdup`] against this same arena.
pub unsafe fn item_bytes_at(arena: &Arena, item_off: u64) -> &[u8] {
    let ptr = arena.base().add(item_off as usize) as *const std::os::raw::c_char;
    CStr::from_ptr(ptr).to_bytes()
}

/// The key bytes stored at `off`.
pub fn item_bytes(arena: &Arena, off: NodeOffset) -> &[u8] {
    // SAFETY: `off`'s `item` field is always a `strdup` result from this
    // arena, written at node-creation time and never mutated except by
    // `set_item`, which only ever copies another node's valid `item` field.
    unsafe { item_bytes_at(arena, item_of(arena, off)) }
}

/// Allocates a new node with `depth = 0`, `count = 1`, and a freshly
/// duplicated copy of `word`. Returns the new node's offset.
pub fn alloc_node(arena: &Arena, word: &[u8]) -> scm_mem::Result<NodeOffset> {
    let item_ptr = arena.strdup(word)?;
    let item_off = item_ptr as usize - arena.base() as usize;

    let node_ptr = arena.alloc_aligned(
        std::mem::size_of::<Node>(),
        std::mem::align_of::<Node>(),
    )?;
    let node_off = node_ptr as usize - arena.base() as usize;

    // SAFETY: `node_ptr` is a freshly allocated, correctly aligned region
    // large enough for a `Node`.
    unsafe {
        std::ptr::write(
            node_ptr as *mut Node,
            Node {
                depth: 0,
                count: 1,
                item: item_off as u64,
                left: 0,
                right: 0,
            },
        );
    }

    Ok(NodeOffset(node_off as u64))
}

/// Rotates the subtree left around `x`, returning the new subtree root.
pub fn rotate_left(arena: &Arena, x: NodeOffset) -> NodeOffset {
    let y = right_of(arena, x);
    let t2 = left_of(arena, y);
    set_right(arena, x, t2);
    set_left(arena, y, x);
    recompute_depth(arena, x);
    recompute_depth(arena, y);
    y
}

/// Rotates the subtree right around `y`, returning the new subtree root.
pub fn rotate_right(arena: &Arena, y: NodeOffset) -> NodeOffset {
    let x = left_of(arena, y);
    let t2 = right_of(arena, x);
    set_left(arena, y, t2);
    set_right(arena, x, y);
    recompute_depth(arena, y);
    recompute_depth(arena, x);
    x
}

/// The leftmost (minimum-key) node of the subtree rooted at `off`.
///
/// `off` must not be null.
pub fn min_node(arena: &Arena, off: NodeOffset) -> NodeOffset {
    let mut cur = off;
    loop {
        let left = left_of(arena, cur);
        if left.is_null() {
            return cur;
        }
        cur = left;
    }
}
