//! Double-mapped ("mirrored") virtual memory regions.
//!
//! A [`MirroredRegion`] of length `L` maps the same physical storage twice,
//! back to back, so that byte `i` and byte `i + L` always alias the same
//! underlying memory for `i` in `[0, L)`. This lets a ring buffer hand out
//! contiguous slices across the wrap point without ever copying.

use std::ptr::NonNull;

use crate::pagesize::{align_to_page_size, page_size};

/// Errors constructing a [`MirroredRegion`].
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// `length` was not a page-aligned power of two.
    #[error("mirrored region length {0} must be a page-aligned power of two")]
    InvalidLength(usize),
    /// The underlying `mmap`/`mremap`/`shm_open` calls failed.
    #[error("memory mapping failed: {0}")]
    System(#[source] std::io::Error),
}

/// A virtual memory region of `2 * length` bytes backed by `length` bytes of
/// physical storage, mapped twice.
///
/// `length` must be a power-of-two multiple of the system page size.
pub struct MirroredRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is anonymous shared memory; no thread-local state is
// involved and the raw pointer is only ever dereferenced through the
// synchronization protocol implemented by `RingBuffer`.
unsafe impl Send for MirroredRegion {}
unsafe impl Sync for MirroredRegion {}

impl MirroredRegion {
    /// Creates a new mirrored region of `length` bytes (mapped twice, for a
    /// total virtual span of `2 * length`).
    pub fn new(length: usize) -> Result<Self, MirrorError> {
        if length == 0 || length != align_to_page_size(length) || !length.is_power_of_two() {
            return Err(MirrorError::InvalidLength(length));
        }

        // SAFETY: see function-level comments below; all preconditions
        // (length validated above, strategy selected per target) are upheld.
        let ptr = unsafe { map_mirrored(length) }.map_err(MirrorError::System)?;

        Ok(Self { ptr, len: length })
    }

    /// Returns a pointer to the start of the low mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the length of a single mapping (the ring buffer capacity),
    /// i.e. half of the total virtual span.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MirroredRegion {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` and `self.len * 2` describe exactly the mapping
        // created in `new`, and this is the only place it is unmapped.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len * 2);
        }
    }
}

#[cfg(target_os = "linux")]
unsafe fn map_mirrored(length: usize) -> std::io::Result<NonNull<u8>> {
    // Strategy (b) from spec.md 4.1: reserve `2*length` anonymous bytes as a
    // placeholder, then `mremap` a freshly created high-half mapping onto
    // the low half with MREMAP_FIXED|MREMAP_MAYMOVE. This is a single
    // syscall that atomically destroys the low-half reservation and
    // installs the mirror, so there is no window where unrelated memory
    // could be mapped into the placeholder.
    let reserve = libc::mmap(
        std::ptr::null_mut(),
        length * 2,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if reserve == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }

    let low = reserve as *mut u8;
    let high = low.add(length);

    let mirror = libc::mmap(
        high.cast(),
        length,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_FIXED | libc::MAP_SHARED | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if mirror == libc::MAP_FAILED {
        libc::munmap(reserve, length * 2);
        return Err(std::io::Error::last_os_error());
    }

    let remapped = libc::mremap(
        mirror,
        0,
        length,
        libc::MREMAP_FIXED | libc::MREMAP_MAYMOVE,
        low.cast::<libc::c_void>(),
    );
    if remapped == libc::MAP_FAILED {
        libc::munmap(mirror, length);
        libc::munmap(low.cast(), length);
        return Err(std::io::Error::last_os_error());
    }

    debug_assert_eq!(remapped as *mut u8, low);
    Ok(NonNull::new_unchecked(low))
}

#[cfg(all(unix, not(target_os = "linux")))]
unsafe fn map_mirrored(length: usize) -> std::io::Result<NonNull<u8>> {
    // Strategy (a) from spec.md 4.1: an anonymous shared backing object
    // (via shm_open), mapped twice into a single large reservation.
    let fd = shm_open_anon()?;
    if libc::ftruncate(fd, length as libc::off_t) == -1 {
        let err = std::io::Error::last_os_error();
        libc::close(fd);
        return Err(err);
    }

    let reserve = libc::mmap(
        std::ptr::null_mut(),
        length * 2,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if reserve == libc::MAP_FAILED {
        libc::close(fd);
        return Err(std::io::Error::last_os_error());
    }

    let low = reserve as *mut u8;
    let high = low.add(length);
    let prot = libc::PROT_READ | libc::PROT_WRITE;

    let low_map = libc::mmap(low.cast(), length, prot, libc::MAP_FIXED | libc::MAP_SHARED, fd, 0);
    let high_map = if low_map != libc::MAP_FAILED {
        libc::mmap(high.cast(), length, prot, libc::MAP_FIXED | libc::MAP_SHARED, fd, 0)
    } else {
        libc::MAP_FAILED
    };

    libc::close(fd);

    if low_map == libc::MAP_FAILED || high_map == libc::MAP_FAILED {
        libc::munmap(reserve, length * 2);
        return Err(std::io::Error::last_os_error());
    }

    Ok(NonNull::new_unchecked(low))
}

#[cfg(all(unix, not(target_os = "linux")))]
unsafe fn shm_open_anon() -> std::io::Result<libc::c_int> {
    use std::ffi::CString;

    #[cfg(target_os = "freebsd")]
    {
        let fd = libc::shm_open(
            libc::SHM_ANON,
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            0o600,
        );
        if fd == -1 {
            return Err(std::io::Error::last_os_error());
        }
        return Ok(fd);
    }

    #[cfg(not(target_os = "freebsd"))]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        for attempt in 0..64u32 {
            let name = format!("/xtr.{}.{}\0", std::process::id(), nanos.wrapping_add(attempt));
            let cname = CString::from_vec_with_nul(name.into_bytes()).unwrap();
            let fd = libc::shm_open(
                cname.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                0o600,
            );
            if fd != -1 {
                libc::shm_unlink(cname.as_ptr());
                return Ok(fd);
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(err);
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "could not allocate an anonymous shm name after 64 attempts",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_low_half_into_high_half() {
        let len = page_size();
        let region = MirroredRegion::new(len).unwrap();
        unsafe {
            let base = region.as_ptr();
            for i in 0..len {
                *base.add(i) = (i % 251) as u8;
            }
            for i in 0..len {
                assert_eq!(*base.add(i), *base.add(i + len));
            }
            // And the reverse direction.
            for i in 0..len {
                *base.add(i + len) = 0xAA;
            }
            for i in 0..len {
                assert_eq!(*base.add(i), 0xAA);
            }
        }
    }

    #[test]
    fn rejects_non_page_aligned_length() {
        assert!(matches!(
            MirroredRegion::new(page_size() + 1),
            Err(MirrorError::InvalidLength(_))
        ));
    }

    #[test]
    fn rejects_non_power_of_two_length() {
        let len = page_size() * 3;
        assert!(matches!(
            MirroredRegion::new(len),
            Err(MirrorError::InvalidLength(_))
        ));
    }
}
