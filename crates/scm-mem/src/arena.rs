//! The SCM (storage-class-memory) arena: a bump-allocated heap backed by a
//! single regular file, mapped at a fixed virtual address so that any
//! pointer derived from the mapping is reproducible across process
//! invocations that reopen the same file.
//!
//! # Design
//!
//! - **Fixed address**: the whole file is mapped with `MAP_FIXED` (or
//!   `MAP_FIXED_NOREPLACE` where the platform provides it) at
//!   [`FIXED_BASE_ADDR`]. A process-wide guard refuses to map a second
//!   `Arena` at the same address while one is already open.
//! - **Bump allocation**: `alloc` hands out `base + utilized` and advances
//!   `utilized` by the requested size. There is no coalescing and no
//!   reclamation (see [`Arena::free`]).
//! - **Footer persistence**: the last 8 bytes of the file hold the
//!   utilization water mark in the host's native byte order. `close` writes
//!   it; a non-truncating `open` reads it back.
//!
//! # Examples
//!
//! ```no_run
//! use scm_mem::Arena;
//!
//! let arena = Arena::open("/tmp/words.scm", true).unwrap();
//! let ptr = arena.alloc(16).unwrap();
//! unsafe { std::ptr::write_bytes(ptr, 0, 16) };
//! arena.close().unwrap();
//! ```

use std::cell::Cell;
use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ArenaError, Result};

/// The size of the persisted utilization water mark, in bytes.
const FOOTER_SIZE: usize = std::mem::size_of::<u64>();

/// The fixed virtual address at which every `Arena` mapping is requested.
///
/// Chosen low in the canonical address space (well below where Linux's
/// default mmap placement and the stack/heap typically land) to minimize
/// collision with other mappings in the same process. This is a compile-time
/// constant, not an environment-overridable setting: letting it vary between
/// sessions would reintroduce exactly the cross-process pointer instability
/// the fixed address exists to prevent.
pub const FIXED_BASE_ADDR: usize = 0x0000_1000_0000_0000;

#[cfg(target_os = "linux")]
const MMAP_FLAGS: i32 = libc::MAP_SHARED | libc::MAP_FIXED_NOREPLACE;
#[cfg(not(target_os = "linux"))]
const MMAP_FLAGS: i32 = libc::MAP_SHARED | libc::MAP_FIXED;

/// Guards [`FIXED_BASE_ADDR`] against being mapped twice in this process.
static FIXED_ADDR_MAPPED: AtomicBool = AtomicBool::new(false);

/// A persistent, file-backed bump-allocation heap.
///
/// See the module docs for the mapping and persistence model. `Arena` does
/// not implement `Send` or `Sync`; sharing one handle across threads is not
/// supported — single-threaded, synchronous access only.
pub struct Arena {
    file: File,
    base: NonNull<u8>,
    len: usize,
    utilized: Cell<usize>,
}

impl Arena {
    /// Opens `path` as an Arena, mapping the entire file at
    /// [`FIXED_BASE_ADDR`].
    ///
    /// `path` must name an existing regular file of nonzero length. If
    /// `truncate` is `false`, the utilization water mark is read back from
    /// the file's footer; otherwise the arena starts empty (`utilized = 0`)
    /// even though the file's prior contents are left on disk until the
    /// first allocations overwrite them.
    pub fn open<P: AsRef<Path>>(path: P, truncate: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(|e| ArenaError::Open(e.to_string()))?;

        let metadata = file
            .metadata()
            .map_err(|e| ArenaError::Open(e.to_string()))?;
        if !metadata.is_file() {
            return Err(ArenaError::Open(format!(
                "{} is not a regular file",
                path.as_ref().display()
            )));
        }
        let len = metadata.len() as usize;
        if len <= FOOTER_SIZE {
            return Err(ArenaError::Open(format!(
                "file is too small to hold an arena footer ({len} bytes)"
            )));
        }

        if FIXED_ADDR_MAPPED
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(ArenaError::Map(
                "another Arena already holds the fixed address in this process".into(),
            ));
        }

        let base = match Self::map_fixed(&file, len) {
            Ok(base) => base,
            Err(e) => {
                // Release the guard: no Arena value exists to run Drop.
                FIXED_ADDR_MAPPED.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let utilized = if truncate {
            0
        } else {
            // SAFETY: `base` is valid for `len` bytes (just mapped above),
            // and `len > FOOTER_SIZE` was checked above.
            unsafe { Self::read_footer(base, len)? }
        };

        scm_log::debug!(
            "arena opened at {:p} ({} bytes, utilized={})",
            base.as_ptr(),
            len,
            utilized
        );

        Ok(Arena {
            file,
            base,
            len,
            utilized: Cell::new(utilized),
        })
    }

    /// Performs the fixed-address `mmap` call for an already-opened file.
    fn map_fixed(file: &File, len: usize) -> Result<NonNull<u8>> {
        // SAFETY: `file` is a valid, open file descriptor backing a regular
        // file of at least `len` bytes (checked by the caller). The
        // requested address, length, and flags are all well-formed; any
        // failure is reported through the return value rather than UB.
        let ptr = unsafe {
            libc::mmap(
                FIXED_BASE_ADDR as *mut c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                MMAP_FLAGS,
                file.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            return Err(ArenaError::Map(format!(
                "mmap at {FIXED_BASE_ADDR:#x} failed: {err}"
            )));
        }

        // MAP_FIXED (and MAP_FIXED_NOREPLACE on success) always returns the
        // requested address; this check guards against a future platform
        // quirk silently handing back a different one.
        if ptr as usize != FIXED_BASE_ADDR {
            unsafe { libc::munmap(ptr, len) };
            return Err(ArenaError::Map(format!(
                "mmap returned {ptr:p} instead of the requested fixed address {FIXED_BASE_ADDR:#x}"
            )));
        }

        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| ArenaError::Map("mmap returned a null pointer".into()))
    }

    /// Reads the utilization water mark from the last [`FOOTER_SIZE`] bytes
    /// of the mapping.
    ///
    /// # Safety
    ///
    /// `base` must be valid for `len` bytes and `len` must be greater than
    /// [`FOOTER_SIZE`].
    unsafe fn read_footer(base: NonNull<u8>, len: usize) -> Result<usize> {
        let footer_ptr = base.as_ptr().add(len - FOOTER_SIZE) as *const u64;
        // The footer offset is not guaranteed to be 8-byte aligned (file
        // length is arbitrary), so read without assuming alignment.
        let raw = std::ptr::read_unaligned(footer_ptr);
        let utilized = raw as usize;
        let usable = len - FOOTER_SIZE;
        if utilized > usable {
            return Err(ArenaError::Read(format!(
                "corrupt water mark: {utilized} exceeds usable capacity {usable}"
            )));
        }
        Ok(utilized)
    }

    /// Writes the current utilization water mark into the mapping's footer.
    fn write_footer(&self) {
        // SAFETY: `self.base` is valid for `self.len` bytes, and
        // `self.len > FOOTER_SIZE` was checked in `open`.
        unsafe {
            let footer_ptr = self.base.as_ptr().add(self.len - FOOTER_SIZE) as *mut u64;
            std::ptr::write_unaligned(footer_ptr, self.utilized.get() as u64);
        }
    }

    /// Bump-allocates `n` bytes and returns a pointer to the start of the
    /// new region. Fails with [`ArenaError::OutOfArena`] if the remaining
    /// capacity cannot satisfy the request. `n = 0` is rejected.
    pub fn alloc(&self, n: usize) -> Result<*mut u8> {
        if n == 0 {
            return Err(ArenaError::InvalidArgument(
                "allocation size must be nonzero".into(),
            ));
        }

        let usable = self.len - FOOTER_SIZE;
        let utilized = self.utilized.get();
        let new_utilized = utilized
            .checked_add(n)
            .filter(|&u| u <= usable)
            .ok_or(ArenaError::OutOfArena {
                requested: n,
                available: usable - utilized,
            })?;

        self.utilized.set(new_utilized);
        // SAFETY: `utilized + n <= usable <= self.len`, so the returned
        // range lies within the mapping.
        Ok(unsafe { self.base.as_ptr().add(utilized) })
    }

    /// Like [`Arena::alloc`], but first consumes whatever padding bytes are
    /// needed so the returned pointer's address is a multiple of `align`
    /// (which must be a power of two). Padding bytes are wasted, not
    /// reclaimed, consistent with the arena's append-only design.
    pub fn alloc_aligned(&self, n: usize, align: usize) -> Result<*mut u8> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidArgument(format!(
                "alignment {align} is not a power of two"
            )));
        }

        let current_addr = self.base.as_ptr() as usize + self.utilized.get();
        let aligned_addr = (current_addr + align - 1) & !(align - 1);
        let pad = aligned_addr - current_addr;
        if pad > 0 {
            self.alloc(pad)?;
        }
        self.alloc(n)
    }

    /// Allocates `s.len() + 1` bytes and copies `s` into them followed by a
    /// NUL terminator.
    pub fn strdup(&self, s: &[u8]) -> Result<*mut u8> {
        let ptr = self.alloc(s.len() + 1)?;
        // SAFETY: `ptr` is valid for `s.len() + 1` freshly allocated bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr, s.len());
            *ptr.add(s.len()) = 0;
        }
        Ok(ptr)
    }

    /// A documented no-op: the arena is append-only and never reclaims
    /// space. Kept for interface symmetry with the design this crate
    /// implements.
    pub fn free(&self, _p: *mut u8) {}

    /// Returns the arena's base address, `B`.
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Returns the current utilization, `U`.
    pub fn utilized(&self) -> usize {
        self.utilized.get()
    }

    /// Returns the remaining usable capacity, `(N - FOOTER_SIZE) - U`.
    pub fn capacity(&self) -> usize {
        (self.len - FOOTER_SIZE) - self.utilized.get()
    }

    /// Persists the utilization water mark, flushes the mapping to stable
    /// storage, and unmaps the file. Consumes `self`, so a closed arena
    /// cannot be reused.
    ///
    /// The unmap and descriptor-close steps run unconditionally even if the
    /// flush fails; only the first error encountered is returned.
    pub fn close(self) -> Result<()> {
        self.write_footer();

        // SAFETY: `self.base` is valid for `self.len` bytes.
        let sync_result = unsafe {
            if libc::msync(self.base.as_ptr() as *mut c_void, self.len, libc::MS_SYNC) != 0 {
                Err(ArenaError::Write(
                    std::io::Error::last_os_error().to_string(),
                ))
            } else {
                Ok(())
            }
        };

        scm_log::debug!(
            "arena closing at {:p} (utilized={})",
            self.base.as_ptr(),
            self.utilized.get()
        );

        // SAFETY: `self.base`/`self.len` describe the mapping created in
        // `open`; it has not been unmapped yet.
        unsafe { libc::munmap(self.base.as_ptr() as *mut c_void, self.len) };
        FIXED_ADDR_MAPPED.store(false, Ordering::Release);

        // Suppress `Drop` (which would otherwise munmap a second time and
        // log a stray warning) without leaking `self.file`: pull the
        // descriptor out first and let it close normally when dropped.
        let mut this = std::mem::ManuallyDrop::new(self);
        let file = unsafe { std::ptr::read(&this.file) };
        drop(file);
        let _ = &mut this; // fields other than `file` need no destructor

        sync_result
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        scm_log::warn!(
            "Arena at {:p} dropped without calling close(); the final water mark was not persisted",
            self.base.as_ptr()
        );
        // SAFETY: the mapping is still live; `close` forgets `self` before
        // this destructor would otherwise run.
        unsafe { libc::munmap(self.base.as_ptr() as *mut c_void, self.len) };
        FIXED_ADDR_MAPPED.store(false, Ordering::Release);
    }
}
