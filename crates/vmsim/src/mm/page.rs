/// Virtual page bookkeeping and address arithmetic.
///
/// A page lives in exactly one process's page table for its whole lifetime;
/// the flag bits and frame back-link below are mutated only by the MMU
/// translation loop.

use bitflags::bitflags;

/// Virtual address type
pub type VirtAddr = u32;

/// Physical address type
pub type PhysAddr = u32;

/// Width of both virtual and physical addresses, in bits
pub const ADDRESS_BITS: u32 = 20;

bitflags! {
    /// Page state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// Page currently occupies a physical frame
        const PRESENT = 1 << 0;
        /// Page was touched since the replacement scan last cleared it
        const REFERENCED = 1 << 1;
        /// Page was written to; eviction must write it back first
        const DIRTY = 1 << 2;
    }
}

/// One page-table entry
#[derive(Debug, Clone)]
pub struct Page {
    /// Page identifier (index in the owning page table)
    pub id: u32,
    /// State bits
    pub flags: PageFlags,
    /// Backing frame, valid only while PRESENT is set
    pub frame_id: Option<u32>,
}

impl Page {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            flags: PageFlags::empty(),
            frame_id: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.flags.contains(PageFlags::PRESENT)
    }

    pub fn is_referenced(&self) -> bool {
        self.flags.contains(PageFlags::REFERENCED)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PageFlags::DIRTY)
    }

    pub fn set_referenced(&mut self) {
        self.flags.insert(PageFlags::REFERENCED);
    }

    pub fn set_dirty(&mut self) {
        self.flags.insert(PageFlags::DIRTY);
    }

    pub fn clear_referenced(&mut self) {
        self.flags.remove(PageFlags::REFERENCED);
    }

    pub fn clear_dirty(&mut self) {
        self.flags.remove(PageFlags::DIRTY);
    }

    /// Attach the page to a frame: present and referenced, frame recorded.
    pub fn assign_frame(&mut self, frame: u32) {
        self.frame_id = Some(frame);
        self.flags = PageFlags::PRESENT | PageFlags::REFERENCED;
    }

    /// Detach the page from its frame. All flag bits are cleared and the
    /// frame back-link is reset; the previous frame id is returned.
    pub fn evict(&mut self) -> Option<u32> {
        self.flags = PageFlags::empty();
        self.frame_id.take()
    }
}

/// Address-split constants derived from the frame size.
#[derive(Debug, Clone, Copy)]
pub struct AddressLayout {
    /// Frame/page size in bytes (power of two)
    pub page_size: u32,
    /// log2(page_size)
    pub offset_bits: u32,
    /// ADDRESS_BITS - offset_bits
    pub page_bits: u32,
    /// AND-mask extracting the offset from a virtual address
    pub offset_mask: u32,
}

impl AddressLayout {
    pub fn new(page_size: u32) -> Self {
        debug_assert!(page_size.is_power_of_two());
        debug_assert!(page_size <= 1 << ADDRESS_BITS);
        let offset_bits = page_size.trailing_zeros();
        Self {
            page_size,
            offset_bits,
            page_bits: ADDRESS_BITS - offset_bits,
            offset_mask: page_size - 1,
        }
    }

    /// Extract the virtual page number from an address
    #[inline]
    pub fn page_of(&self, va: VirtAddr) -> u32 {
        va >> self.offset_bits
    }

    /// Extract the in-page offset from an address
    #[inline]
    pub fn offset_of(&self, va: VirtAddr) -> u32 {
        va & self.offset_mask
    }

    /// Largest page table a process may allocate
    pub fn max_page_count(&self) -> u32 {
        1 << self.page_bits
    }
}
