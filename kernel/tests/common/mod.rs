//! In-memory fakes for the external collaborators (spec §1/§6): block
//! device, filesystem, physical page allocator, and page-table hardware
//! abstraction. Used by the integration tests to drive the scheduler and
//! VM subsystems end-to-end on the host target.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use nucleon_kernel::collaborators::{
    BlockDevice, FileHandle, FileSystem, PageAllocator, PageDirectoryId, PageTableOps,
    PallocFlags, PAGE_SIZE, SECTOR_SIZE,
};

/// A block device backed by a `Vec` of sectors, used as the swap backing
/// store in VM tests.
pub struct MemoryBlockDevice {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl MemoryBlockDevice {
    pub fn new(sector_count: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sector_count]),
        }
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn sector_count(&self) -> u64 {
        self.sectors.lock().unwrap().len() as u64
    }
    fn read(&self, sector: u64, buf: &mut [u8; SECTOR_SIZE]) {
        buf.copy_from_slice(&self.sectors.lock().unwrap()[sector as usize]);
    }
    fn write(&self, sector: u64, buf: &[u8; SECTOR_SIZE]) {
        self.sectors.lock().unwrap()[sector as usize] = *buf;
    }
}

/// A filesystem backed by shared in-memory buffers. `reopen` hands out a
/// fresh handle aliasing the same buffer, matching the real contract that
/// a reopened handle is independent of the original's lifetime but
/// refers to the same underlying file.
#[derive(Default)]
pub struct InMemoryFs {
    files: Mutex<BTreeMap<FileHandle, Arc<Mutex<Vec<u8>>>>>,
    next_handle: Mutex<u64>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file with the given contents and returns its handle.
    pub fn create(&self, contents: Vec<u8>) -> FileHandle {
        let mut next = self.next_handle.lock().unwrap();
        let handle = *next;
        *next += 1;
        self.files
            .lock()
            .unwrap()
            .insert(handle, Arc::new(Mutex::new(contents)));
        handle
    }
}

impl FileSystem for InMemoryFs {
    fn open(&self, _path: &str) -> Option<FileHandle> {
        None
    }

    fn close(&self, file: FileHandle) {
        self.files.lock().unwrap().remove(&file);
    }

    fn read(&self, file: FileHandle, buf: &mut [u8], offset: u64) -> usize {
        let files = self.files.lock().unwrap();
        let Some(data) = files.get(&file) else { return 0 };
        let data = data.lock().unwrap();
        let offset = offset as usize;
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    fn write(&self, file: FileHandle, buf: &[u8], offset: u64) -> usize {
        let files = self.files.lock().unwrap();
        let Some(data) = files.get(&file) else { return 0 };
        let mut data = data.lock().unwrap();
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        buf.len()
    }

    fn length(&self, file: FileHandle) -> u64 {
        self.files
            .lock()
            .unwrap()
            .get(&file)
            .map(|d| d.lock().unwrap().len() as u64)
            .unwrap_or(0)
    }

    fn reopen(&self, file: FileHandle) -> FileHandle {
        let mut files = self.files.lock().unwrap();
        let Some(buf) = files.get(&file).cloned() else { return file };
        let mut next = self.next_handle.lock().unwrap();
        let handle = *next;
        *next += 1;
        files.insert(handle, buf);
        handle
    }
}

/// A fixed pool of real heap-backed pages. Unlike `vm::frame`'s internal
/// `FixedPool` test fake, the addresses returned here are genuine
/// `Box::leak`'d `[u8; PAGE_SIZE]` buffers, so `Spt::load`'s raw-pointer
/// fill is safe to actually run against them.
pub struct LeakedPagePool {
    free: Mutex<Vec<usize>>,
}

impl LeakedPagePool {
    pub fn new(capacity: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let page: &'static mut [u8; PAGE_SIZE] = Box::leak(Box::new([0u8; PAGE_SIZE]));
            free.push(page.as_mut_ptr() as usize);
        }
        Self {
            free: Mutex::new(free),
        }
    }
}

impl PageAllocator for LeakedPagePool {
    fn get(&self, flags: PallocFlags) -> Option<usize> {
        let kaddr = self.free.lock().unwrap().pop()?;
        if flags.contains(PallocFlags::ZERO) {
            let buf = unsafe { std::slice::from_raw_parts_mut(kaddr as *mut u8, PAGE_SIZE) };
            buf.fill(0);
        }
        Some(kaddr)
    }

    fn free(&self, kaddr: usize) {
        self.free.lock().unwrap().push(kaddr);
    }
}

#[derive(Clone, Copy, Default)]
struct PteEntry {
    kaddr: usize,
    writable: bool,
    accessed: bool,
    dirty: bool,
}

/// A page-table fake with real per-page accessed/dirty tracking, keyed
/// by `(pd, vpage)`, so clock eviction and demand-loading behave exactly
/// as the real page-table hardware abstraction would.
#[derive(Default)]
pub struct TrackingPageTable {
    entries: Mutex<BTreeMap<(PageDirectoryId, usize), PteEntry>>,
}

impl TrackingPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a hardware access to `vpage`: sets the accessed bit,
    /// and the dirty bit too if `write` is true.
    pub fn touch(&self, pd: PageDirectoryId, vpage: usize, write: bool) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&(pd, vpage)) {
            entry.accessed = true;
            if write {
                entry.dirty = true;
            }
        }
    }
}

impl PageTableOps for TrackingPageTable {
    fn install(&self, pd: PageDirectoryId, vpage: usize, kaddr: usize, writable: bool) -> bool {
        self.entries.lock().unwrap().insert(
            (pd, vpage),
            PteEntry {
                kaddr,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        true
    }

    fn lookup(&self, pd: PageDirectoryId, vpage: usize) -> Option<usize> {
        self.entries.lock().unwrap().get(&(pd, vpage)).map(|e| e.kaddr)
    }

    fn clear(&self, pd: PageDirectoryId, vpage: usize) {
        self.entries.lock().unwrap().remove(&(pd, vpage));
    }

    fn is_accessed(&self, pd: PageDirectoryId, vpage: usize) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(&(pd, vpage))
            .map(|e| e.accessed)
            .unwrap_or(false)
    }

    fn is_dirty(&self, pd: PageDirectoryId, vpage: usize) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(&(pd, vpage))
            .map(|e| e.dirty)
            .unwrap_or(false)
    }

    fn set_accessed(&self, pd: PageDirectoryId, vpage: usize, value: bool) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&(pd, vpage)) {
            entry.accessed = value;
        }
    }

    fn set_dirty(&self, pd: PageDirectoryId, vpage: usize, value: bool) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&(pd, vpage)) {
            entry.dirty = value;
        }
    }
}
