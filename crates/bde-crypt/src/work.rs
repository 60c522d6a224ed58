/// One pending request over a run of logical sectors.
///
/// The buffers are borrowed from the caller for the duration of one call:
/// - `data`: plaintext, `length` bytes (empty for delete requests)
/// - `sp`: encrypted data as it goes to / comes from the media, `length` bytes
/// - `ksp`: the key sector; this run's subkeys start at `ko`
pub struct Work<'a> {
    /// Logical byte offset of the first sector
    pub offset: u64,
    /// Length in bytes, a multiple of the sector size
    pub length: usize,
    pub data: &'a mut [u8],
    pub sp: &'a mut [u8],
    pub ksp: &'a mut [u8],
    pub ko: usize,
}

impl<'a> Work<'a> {
    /// A read or write request covering `data`.
    pub fn new(
        offset: u64,
        data: &'a mut [u8],
        sp: &'a mut [u8],
        ksp: &'a mut [u8],
        ko: usize,
    ) -> Self {
        Self {
            offset,
            length: data.len(),
            data,
            sp,
            ksp,
            ko,
        }
    }

    /// A delete request: no plaintext, `sp` receives the wipe pattern.
    pub fn delete(offset: u64, sp: &'a mut [u8], ksp: &'a mut [u8], ko: usize) -> Self {
        Self {
            offset,
            length: sp.len(),
            data: &mut [],
            sp,
            ksp,
            ko,
        }
    }

    /// Number of sectors covered.
    pub fn sectors(&self, sectorsize: u64) -> usize {
        self.length / sectorsize as usize
    }
}
