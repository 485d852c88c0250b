//! The consumer's output buffer: a `[begin, pos, end)` window into whatever
//! buffer a storage back-end last handed out, plus a per-line scratch
//! buffer reused across records to avoid allocating on the hot rendering
//! path (`spec.md` 4.6).

use xtr_io::StorageBackend;

pub struct OutputBuffer {
    storage: Box<dyn StorageBackend + Send>,
    begin: *mut u8,
    pos: usize,
    cap: usize,
    scratch: Vec<u8>,
}

// SAFETY: `begin`/`pos`/`cap` describe a window into a buffer owned by
// `storage`, which is itself required to be `Send`; this type is only ever
// touched from the single consumer thread that owns it.
unsafe impl Send for OutputBuffer {}

impl OutputBuffer {
    pub fn new(storage: Box<dyn StorageBackend + Send>) -> Self {
        Self { storage, begin: std::ptr::null_mut(), pos: 0, cap: 0, scratch: Vec::with_capacity(256) }
    }

    fn ensure_buffer(&mut self) {
        if self.begin.is_null() {
            let slice = self.storage.allocate_buffer();
            self.begin = slice.as_mut_ptr();
            self.cap = slice.len();
            self.pos = 0;
        }
    }

    fn submit_current(&mut self) -> Result<(), xtr_io::StorageError> {
        if self.pos > 0 {
            self.storage.submit_buffer(self.pos)?;
        }
        self.begin = std::ptr::null_mut();
        self.pos = 0;
        self.cap = 0;
        Ok(())
    }

    /// Appends raw bytes, submitting and re-allocating buffers as needed
    /// when the current one fills.
    pub fn append(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            self.ensure_buffer();
            let remaining = self.cap - self.pos;
            let take = remaining.min(bytes.len());
            if take > 0 {
                // SAFETY: `begin..begin+cap` is the slice last handed out by
                // `storage.allocate_buffer()`; `pos + take <= cap`.
                unsafe {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.begin.add(self.pos), take);
                }
                self.pos += take;
                bytes = &bytes[take..];
            }
            if !bytes.is_empty() {
                if let Err(e) = self.submit_current() {
                    tracing::warn!(error = %e, "dropping output: storage submit failed");
                    return;
                }
            }
        }
    }

    /// Builds a line into the reusable scratch buffer via `render`, then
    /// appends it in one shot. Keeps line assembly (timestamp, style,
    /// user text) off the hot copy path into the storage buffer itself.
    pub fn render_line(&mut self, render: impl FnOnce(&mut Vec<u8>)) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        render(&mut scratch);
        self.append(&scratch);
        scratch.clear();
        self.scratch = scratch;
    }

    /// Submits any partially-filled buffer and blocks until the storage
    /// back-end has written everything out.
    pub fn flush(&mut self) -> Result<(), xtr_io::StorageError> {
        self.submit_current()?;
        self.storage.flush()
    }

    pub fn sync(&mut self) {
        self.storage.sync();
    }

    pub fn reopen(&mut self) -> Result<(), xtr_io::StorageError> {
        self.storage.reopen()
    }
}
