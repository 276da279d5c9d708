/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Page lists: how a bulk buffer is described to the VideoCore.
//!
//! A page list is a small header followed by one word per run of physically contiguous
//! pages. Each word holds the page aligned bus address of the run with the number of
//! extra pages packed into the low 12 bits.
//!
//! Reads whose start or end is not cache line aligned borrow a fragment buffer: the
//! VideoCore puts the partial lines there and they are copied into place on completion,
//! so stale cache lines around the buffer never overwrite received data.

use {
    super::fragments::FragmentPool,
    crate::{
        arch::cache,
        mm::{self, AllocError, PAGE_SIZE},
        platform::rpi3::BcmHost,
        runtime::Runtime,
        sched::Yield,
    },
    core::{mem::size_of, ptr::NonNull},
    snafu::{ResultExt, Snafu},
    static_assertions::const_assert_eq,
};

/// The VideoCore writes into the buffer.
pub const PAGELIST_READ: u16 = 1;
/// The VideoCore reads from the buffer.
pub const PAGELIST_WRITE: u16 = 0;
/// Base type of a read with fragments, the fragment index is added to it.
pub const PAGELIST_READ_WITH_FRAGMENTS: u16 = 2;

/// Extra pages a single run word can describe.
pub const MAX_RUN_EXTRA_PAGES: usize = PAGE_SIZE - 1;

/// Page list header as laid out in memory shared with the VideoCore.
#[repr(C)]
#[derive(Debug)]
struct PageListHeader {
    length: u32,
    kind: u16,
    offset: u16,
}

const_assert_eq!(size_of::<PageListHeader>(), 8);

/// Transfer direction as seen from the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Device reads the buffer.
    Write,
    /// Device writes the buffer.
    Read,
}

impl Direction {
    const fn pagelist_type(self) -> u16 {
        match self {
            Direction::Write => PAGELIST_WRITE,
            Direction::Read => PAGELIST_READ,
        }
    }
}

/// Run of physically contiguous pages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageRun {
    /// Page aligned bus address of the first page.
    pub base: u32,
    /// Pages in the run, 1 to 4096.
    pub pages: u16,
}

impl PageRun {
    /// Wire form: base with `pages - 1` in the low bits.
    pub const fn encode(self) -> u32 {
        self.base | (self.pages as u32 - 1)
    }

    pub const fn decode(word: u32) -> Self {
        let mask = (PAGE_SIZE - 1) as u32;
        Self {
            base: word & !mask,
            pages: ((word & mask) + 1) as u16,
        }
    }
}

/// CPU address to VideoCore bus address.
pub trait AddressTranslation {
    fn bus_address(&self, addr: usize) -> u32;
}

/// Identity mapped memory seen through the uncached GPU alias.
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectMap;

impl AddressTranslation for DirectMap {
    fn bus_address(&self, addr: usize) -> u32 {
        BcmHost::phys2bus(addr)
    }
}

#[derive(Debug, Snafu)]
pub enum PageListError {
    #[snafu(display("no memory for a page list of {} pages", pages))]
    NoMemory { pages: usize, source: AllocError },
    #[snafu(display("bulk of {} bytes is too large", length))]
    TooLarge { length: usize },
}

/// A page list built for one bulk, alive until the bulk completes.
#[derive(Debug)]
pub struct PageList {
    descriptor: NonNull<PageListHeader>,
    bus_address: u32,
    buffer: usize,
    length: usize,
    offset: usize,
    pages: usize,
    runs: usize,
    direction: Direction,
    fragment: Option<usize>,
}

// Descriptor memory belongs to this page list until it is freed.
unsafe impl Send for PageList {}

impl PageList {
    /// Bus address of the descriptor, what the VideoCore gets in the bulk message.
    pub fn bus_address(&self) -> u32 {
        self.bus_address
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Offset of the buffer into its first page.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pages covered by the buffer.
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Fragment index for misaligned reads.
    pub fn fragment(&self) -> Option<usize> {
        self.fragment
    }

    /// Type field as the VideoCore sees it.
    pub fn kind(&self) -> u16 {
        unsafe { self.descriptor.as_ref().kind }
    }

    fn words(&self) -> *mut u32 {
        unsafe { self.descriptor.as_ptr().add(1) as *mut u32 }
    }

    /// Runs as written to the descriptor.
    pub fn runs(&self) -> impl Iterator<Item = PageRun> + '_ {
        let words = self.words();
        (0..self.runs).map(move |i| PageRun::decode(unsafe { words.add(i).read_volatile() }))
    }

    fn descriptor_size(pages: usize) -> usize {
        size_of::<PageListHeader>() + pages * size_of::<u32>()
    }
}

/// Builds and frees page lists for the bulk path.
pub struct PageListBuilder<'a> {
    runtime: &'a Runtime,
    fragments: &'a FragmentPool,
    translation: &'a dyn AddressTranslation,
    sched: &'a dyn Yield,
}

impl<'a> PageListBuilder<'a> {
    pub fn new(
        runtime: &'a Runtime,
        fragments: &'a FragmentPool,
        translation: &'a dyn AddressTranslation,
        sched: &'a dyn Yield,
    ) -> Self {
        Self {
            runtime,
            fragments,
            translation,
            sched,
        }
    }

    /// Describe `length` bytes at `buffer` for a transfer in `direction`.
    ///
    /// Cache lines of the buffer and of the descriptor are written back and invalidated
    /// before the page list is returned, so it can go to the VideoCore as is.
    pub fn create(
        &self,
        buffer: usize,
        length: usize,
        direction: Direction,
    ) -> Result<PageList, PageListError> {
        if u32::try_from(length).is_err() {
            return Err(PageListError::TooLarge { length });
        }
        let offset = mm::page_offset(buffer);
        // An empty transfer still names the page it starts in.
        let pages = ((offset + length + PAGE_SIZE - 1) / PAGE_SIZE).max(1);

        let descriptor = self
            .runtime
            .allocate(PageList::descriptor_size(pages))
            .context(NoMemorySnafu { pages })?
            .cast::<PageListHeader>();
        let words = unsafe { descriptor.as_ptr().add(1) as *mut u32 };

        let first_page = mm::align_down(buffer, PAGE_SIZE);
        let mut remaining = length;
        let mut in_page = offset;
        let mut run: Option<PageRun> = None;
        let mut runs = 0;

        for page in 0..pages {
            let page_addr = first_page + page * PAGE_SIZE;
            let bytes = (PAGE_SIZE - in_page).min(remaining);
            cache::clean_and_invalidate_range(page_addr + in_page, bytes);
            remaining -= bytes;
            in_page = 0;

            let bus = self.translation.bus_address(page_addr);
            run = match run {
                Some(current)
                    if bus == current.base.wrapping_add(current.pages as u32 * PAGE_SIZE as u32)
                        && (current.pages as usize) <= MAX_RUN_EXTRA_PAGES =>
                {
                    Some(PageRun {
                        base: current.base,
                        pages: current.pages + 1,
                    })
                }
                Some(current) => {
                    unsafe { words.add(runs).write_volatile(current.encode()) };
                    runs += 1;
                    Some(PageRun { base: bus, pages: 1 })
                }
                None => Some(PageRun { base: bus, pages: 1 }),
            };
        }
        if let Some(last) = run {
            unsafe { words.add(runs).write_volatile(last.encode()) };
            runs += 1;
        }

        let cache_line = self.fragments.cache_line();
        let misaligned = !mm::is_aligned(offset, cache_line)
            || !mm::is_aligned(offset + length, cache_line);
        let fragment = if direction == Direction::Read && misaligned {
            Some(self.fragments.acquire(self.sched))
        } else {
            None
        };
        let kind = match fragment {
            Some(index) => PAGELIST_READ_WITH_FRAGMENTS + index as u16,
            None => direction.pagelist_type(),
        };

        unsafe {
            descriptor.as_ptr().write_volatile(PageListHeader {
                length: length as u32,
                kind,
                offset: offset as u16,
            })
        };
        cache::clean_and_invalidate_range(
            descriptor.as_ptr() as usize,
            PageList::descriptor_size(pages),
        );

        Ok(PageList {
            descriptor,
            bus_address: self.translation.bus_address(descriptor.as_ptr() as usize),
            buffer,
            length,
            offset,
            pages,
            runs,
            direction,
            fragment,
        })
    }

    /// Finish with `pagelist` after `actual` bytes were transferred.
    ///
    /// A read copies the partial head and tail lines out of its fragment, limited to
    /// what was actually received, and returns the fragment. A negative `actual` marks
    /// an aborted transfer: nothing is copied but the fragment is still returned.
    pub fn free(&self, pagelist: PageList, actual: i32) {
        if pagelist.direction == Direction::Read {
            let received = usize::try_from(actual).unwrap_or(0).min(pagelist.length);
            cache::clean_and_invalidate_range(pagelist.buffer, received);
        }

        if let Some(index) = pagelist.fragment {
            if let Ok(actual) = usize::try_from(actual) {
                self.copy_fragment(&pagelist, index, actual);
            }
            self.fragments.release(index, self.sched);
        }

        self.runtime.free(pagelist.descriptor.cast());
    }

    fn copy_fragment(&self, pagelist: &PageList, index: usize, actual: usize) {
        let cache_line = self.fragments.cache_line();
        let fragment = self.fragments.fragment(index) as *const u8;
        let head = (cache_line - (pagelist.offset & (cache_line - 1))) & (cache_line - 1);
        let tail = (pagelist.offset + actual) & (cache_line - 1);

        if head != 0 {
            let count = head.min(actual);
            unsafe {
                core::ptr::copy_nonoverlapping(fragment, pagelist.buffer as *mut u8, count)
            };
        }
        if head < actual && tail != 0 {
            let page_base = pagelist.buffer - pagelist.offset;
            let target = page_base + mm::align_down(pagelist.offset + actual, cache_line);
            unsafe {
                core::ptr::copy_nonoverlapping(
                    fragment.add(cache_line),
                    target as *mut u8,
                    tail,
                )
            };
        }
    }
}
