//! System page size helpers, grounded in `original_source/src/pagesize.cpp`.

use std::sync::OnceLock;

fn query_page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n <= 0 {
        4096
    } else {
        n as usize
    }
}

/// Returns the system page size, queried once and cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

/// Rounds `n` up to the next multiple of the page size.
pub fn align_to_page_size(n: usize) -> usize {
    let page = page_size();
    (n + page - 1) & !(page - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let p = page_size();
        assert!(p >= 4096);
        assert!(p.is_power_of_two());
    }

    #[test]
    fn align_rounds_up() {
        let p = page_size();
        assert_eq!(align_to_page_size(1), p);
        assert_eq!(align_to_page_size(p), p);
        assert_eq!(align_to_page_size(p + 1), p * 2);
    }
}
