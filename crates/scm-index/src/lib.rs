//! A persistent AVL tree of counted words, stored inside an `scm_mem::Arena`.
//!
//! This crate implements the Index component: a root state record
//! (`items`, `unique`, `root`) followed by a tree of `Node`s, every
//! reference an arena-relative offset rather than an embedded pointer.
//! Reopening the same backing file reconstitutes the whole tree without
//! replaying any log — the state record and node graph already *are* the
//! persisted state.

pub mod error;
mod node;
mod tree;

use scm_mem::Arena;

pub use error::{IndexError, Result};
pub use node::NodeOffset;

use node::IndexState;

fn state_ptr(arena: &Arena) -> *mut IndexState {
    // The Index state record is always the arena's first allocation, so it
    // sits at offset 0 — the arena's base address itself.
    arena.base() as *mut IndexState
}

/// A snapshot of index and arena usage, bundled for host reporting
/// (mirrors the `ArenaStats`/`PoolStats` snapshot-struct idiom used
/// elsewhere in this lineage).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub items: u64,
    pub unique: u64,
    pub arena_utilized: usize,
    pub arena_capacity: usize,
}

/// A persistent, file-backed index of counted words.
///
/// `Index` is not `Send`/`Sync`, matching the single-threaded, synchronous
/// access model of the underlying `Arena`.
pub struct Index {
    arena: Arena,
}

impl Index {
    /// Opens `path` as an Index, adopting a pre-existing state record if the
    /// arena was opened non-truncated and already utilized, or allocating a
    /// fresh zeroed one otherwise.
    pub fn open<P: AsRef<std::path::Path>>(path: P, truncate: bool) -> Result<Self> {
        let arena = Arena::open(path, truncate)?;

        if !truncate && arena.utilized() > 0 {
            scm_log::debug!("adopting pre-existing index state record at arena base");
        } else {
            let ptr = arena.alloc_aligned(
                std::mem::size_of::<IndexState>(),
                std::mem::align_of::<IndexState>(),
            )?;
            let offset = ptr as usize - arena.base() as usize;
            debug_assert_eq!(
                offset, 0,
                "the index state record must be the arena's first allocation"
            );

            // SAFETY: `ptr` is a freshly allocated, correctly aligned region
            // large enough for an `IndexState`.
            unsafe {
                std::ptr::write(
                    ptr as *mut IndexState,
                    IndexState {
                        items: 0,
                        unique: 0,
                        root: 0,
                    },
                );
            }
        }

        let (items, unique, _) = Self::read_state(&arena);
        scm_log::info!("index opened (items={items}, unique={unique})");

        Ok(Index { arena })
    }

    fn read_state(arena: &Arena) -> (u64, u64, NodeOffset) {
        // SAFETY: the state record was written by `open` (either freshly or
        // adopted from a prior session) before any accessor can run.
        let state = unsafe { &*state_ptr(arena) };
        (state.items, state.unique, NodeOffset(state.root))
    }

    fn write_state(arena: &Arena, items: u64, unique: u64, root: NodeOffset) {
        // SAFETY: see `read_state`.
        unsafe {
            let state = &mut *state_ptr(arena);
            state.items = items;
            state.unique = unique;
            state.root = root.0;
        }
    }

    /// Closes the underlying arena, persisting its utilization water mark.
    pub fn close(self) -> Result<()> {
        Ok(self.arena.close()?)
    }

    fn validate_word(word: &str) -> Result<()> {
        if word.is_empty() {
            return Err(IndexError::InvalidArgument("word must not be empty".into()));
        }
        if word.as_bytes().contains(&0) {
            return Err(IndexError::InvalidArgument(
                "word must not contain an embedded NUL byte".into(),
            ));
        }
        Ok(())
    }

    /// Inserts one occurrence of `word`. Allocates a new node on first
    /// occurrence; otherwise increments its `count`.
    pub fn insert(&mut self, word: &str) -> Result<()> {
        Self::validate_word(word)?;

        let (mut items, mut unique, root) = Self::read_state(&self.arena);
        let new_root = tree::insert(&self.arena, root, word.as_bytes(), &mut items, &mut unique)?;
        Self::write_state(&self.arena, items, unique, new_root);
        Ok(())
    }

    /// Returns the current `count` for `word`, or 0 if absent. Never
    /// mutates the tree.
    pub fn exists(&self, word: &str) -> u64 {
        if word.is_empty() {
            return 0;
        }
        let (_, _, root) = Self::read_state(&self.arena);
        tree::exists(&self.arena, root, word.as_bytes())
    }

    /// Removes all occurrences of `word`. Fails with
    /// [`IndexError::NotFound`] if `word` is absent, leaving state
    /// unmutated.
    pub fn delete(&mut self, word: &str) -> Result<()> {
        Self::validate_word(word)?;

        let (items, unique, root) = Self::read_state(&self.arena);
        let (new_root, removed_count) = tree::delete(&self.arena, root, word.as_bytes())?;

        let new_items = items.checked_sub(removed_count).unwrap_or_else(|| {
            debug_assert!(false, "items counter underflowed on delete");
            0
        });
        let new_unique = unique.checked_sub(1).unwrap_or_else(|| {
            debug_assert!(false, "unique counter underflowed on delete");
            0
        });

        Self::write_state(&self.arena, new_items, new_unique, new_root);
        Ok(())
    }

    /// Invokes `callback(item, count)` once per entry, in ascending
    /// lexicographic order. `item` is produced with a lossy UTF-8
    /// conversion: a non-UTF-8 insert cannot panic the traversal, but
    /// ordering and counting are always byte-exact regardless.
    pub fn traverse<F: FnMut(&str, u64)>(&self, mut callback: F) {
        let (_, _, root) = Self::read_state(&self.arena);
        tree::traverse(&self.arena, root, &mut callback);
    }

    /// Total count of inserted words, including duplicates.
    pub fn items(&self) -> u64 {
        Self::read_state(&self.arena).0
    }

    /// Number of distinct words currently present.
    pub fn unique(&self) -> u64 {
        Self::read_state(&self.arena).1
    }

    /// A snapshot of index and arena usage for host reporting.
    pub fn stats(&self) -> IndexStats {
        let (items, unique, _) = Self::read_state(&self.arena);
        IndexStats {
            items,
            unique,
            arena_utilized: self.arena.utilized(),
            arena_capacity: self.arena.capacity(),
        }
    }

    /// Recomputes depth bottom-up and asserts the AVL balance invariant and
    /// depth recurrence at every reachable node. Panics on the first
    /// violation.
    ///
    /// For test harnesses (unit, integration, and property tests) that need
    /// to check the structural invariant directly; not called from any
    /// insert/delete/lookup path.
    pub fn debug_assert_balanced(&self) {
        let (_, _, root) = Self::read_state(&self.arena);
        tree::assert_balanced(&self.arena, root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // All Indexes share the Arena's process-wide fixed address; tests that
    // open one must not run concurrently with each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn fresh_file(len: u64) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.as_file_mut().set_len(len).unwrap();
        f.flush().unwrap();
        f
    }

    fn assert_balanced(idx: &Index) {
        // In-order traversal must be strictly ascending (BST order), and
        // `debug_assert_balanced` recomputes depth bottom-up to check the
        // AVL balance invariant and depth recurrence at every node.
        let mut prev: Option<String> = None;
        idx.traverse(|word, _count| {
            if let Some(p) = &prev {
                assert!(p.as_str() < word, "traversal not ascending: {p} >= {word}");
            }
            prev = Some(word.to_string());
        });
        idx.debug_assert_balanced();
    }

    // S1
    #[test]
    fn test_s1_basic_insert_and_counts() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();

        idx.insert("foo").unwrap();
        idx.insert("foo").unwrap();
        idx.insert("bar").unwrap();

        assert_eq!(idx.items(), 3);
        assert_eq!(idx.unique(), 2);
        assert_eq!(idx.exists("foo"), 2);
        assert_eq!(idx.exists("bar"), 1);
        assert_eq!(idx.exists("baz"), 0);

        let mut seen = Vec::new();
        idx.traverse(|w, c| seen.push((w.to_string(), c)));
        assert_eq!(
            seen,
            vec![("bar".to_string(), 1), ("foo".to_string(), 2)]
        );

        idx.close().unwrap();
    }

    // S2
    #[test]
    fn test_s2_persists_across_reopen() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let path = file.path().to_path_buf();

        {
            let mut idx = Index::open(&path, true).unwrap();
            idx.insert("foo").unwrap();
            idx.insert("foo").unwrap();
            idx.insert("bar").unwrap();
            idx.close().unwrap();
        }

        {
            let idx = Index::open(&path, false).unwrap();
            assert_eq!(idx.items(), 3);
            assert_eq!(idx.unique(), 2);
            assert_eq!(idx.exists("foo"), 2);
            assert_eq!(idx.exists("bar"), 1);

            let mut seen = Vec::new();
            idx.traverse(|w, c| seen.push((w.to_string(), c)));
            assert_eq!(
                seen,
                vec![("bar".to_string(), 1), ("foo".to_string(), 2)]
            );

            idx.close().unwrap();
        }
    }

    // S3
    #[test]
    fn test_s3_sequential_inserts_stay_balanced() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();

        for w in ["a", "b", "c", "d", "e", "f", "g"] {
            idx.insert(w).unwrap();
        }

        assert_eq!(idx.unique(), 7);
        assert_eq!(idx.items(), 7);

        let mut seen = Vec::new();
        idx.traverse(|w, _| seen.push(w.to_string()));
        assert_eq!(seen, vec!["a", "b", "c", "d", "e", "f", "g"]);
        assert_balanced(&idx);

        idx.close().unwrap();
    }

    // S4
    #[test]
    fn test_s4_delete_keeps_tree_consistent() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();

        for w in ["a", "b", "c", "d", "e", "f", "g"] {
            idx.insert(w).unwrap();
        }
        idx.delete("d").unwrap();

        assert_eq!(idx.unique(), 6);
        assert_eq!(idx.items(), 6);
        assert_eq!(idx.exists("d"), 0);

        let mut seen = Vec::new();
        idx.traverse(|w, _| seen.push(w.to_string()));
        assert_eq!(seen, vec!["a", "b", "c", "e", "f", "g"]);
        assert_balanced(&idx);

        idx.close().unwrap();
    }

    // S5
    #[test]
    fn test_s5_delete_missing_key_is_not_found() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();

        idx.insert("a").unwrap();
        let before_items = idx.items();
        let before_unique = idx.unique();

        assert!(matches!(idx.delete("zzz"), Err(IndexError::NotFound)));
        assert_eq!(idx.items(), before_items);
        assert_eq!(idx.unique(), before_unique);

        idx.close().unwrap();
    }

    // S6
    #[test]
    fn test_s6_out_of_arena_leaves_state_unchanged() {
        let _guard = TEST_LOCK.lock().unwrap();
        // Small enough that a handful of inserts exhausts it.
        let file = fresh_file(256);
        let mut idx = Index::open(file.path(), true).unwrap();

        let mut inserted = 0u64;
        loop {
            let word = format!("word{inserted}");
            match idx.insert(&word) {
                Ok(()) => inserted += 1,
                Err(IndexError::Arena(scm_mem::ArenaError::OutOfArena { .. })) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let items_before = idx.items();
        let unique_before = idx.unique();
        let mut traversal_before = Vec::new();
        idx.traverse(|w, c| traversal_before.push((w.to_string(), c)));

        let result = idx.insert("one-word-too-many");
        assert!(matches!(
            result,
            Err(IndexError::Arena(scm_mem::ArenaError::OutOfArena { .. }))
        ));

        assert_eq!(idx.items(), items_before);
        assert_eq!(idx.unique(), unique_before);
        let mut traversal_after = Vec::new();
        idx.traverse(|w, c| traversal_after.push((w.to_string(), c)));
        assert_eq!(traversal_before, traversal_after);

        idx.close().unwrap();
    }

    #[test]
    fn test_case_discrimination() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();

        idx.insert("a").unwrap();
        idx.insert("A").unwrap();

        assert_eq!(idx.unique(), 2);
        assert_eq!(idx.exists("a"), 1);
        assert_eq!(idx.exists("A"), 1);

        idx.close().unwrap();
    }

    #[test]
    fn test_exists_is_idempotent() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();
        idx.insert("word").unwrap();

        for _ in 0..5 {
            assert_eq!(idx.exists("word"), 1);
        }
        assert_eq!(idx.items(), 1);

        idx.close().unwrap();
    }

    #[test]
    fn test_insert_rejects_empty_and_embedded_nul() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();

        assert!(matches!(
            idx.insert(""),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            idx.insert("bad\0word"),
            Err(IndexError::InvalidArgument(_))
        ));

        idx.close().unwrap();
    }

    #[test]
    fn test_stats_reports_arena_usage() {
        let _guard = TEST_LOCK.lock().unwrap();
        let file = fresh_file(64 * 1024);
        let mut idx = Index::open(file.path(), true).unwrap();
        idx.insert("hello").unwrap();

        let stats = idx.stats();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.unique, 1);
        assert!(stats.arena_utilized > 0);
        assert!(stats.arena_capacity > 0);

        idx.close().unwrap();
    }
}
