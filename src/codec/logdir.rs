//! Log directory (log address 0x00).

use super::{expect_len, le16, put16, SECTOR_SIZE};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirectory {
    pub version: u16,
    /// Sector counts for log addresses 1..=255.
    sectors:     [u16; 255],
}

impl Default for LogDirectory {
    fn default() -> Self {
        Self { version: 1, sectors: [0; 255] }
    }
}

impl LogDirectory {
    /// Decode the directory. The SMART directory stores one byte per log,
    /// the GP directory a full word.
    pub fn from_page(buf: &[u8], gp: bool) -> Result<Self> {
        expect_len(buf, "log directory", SECTOR_SIZE)?;
        let mut sectors = [0u16; 255];
        for (i, s) in sectors.iter_mut().enumerate() {
            let off = 2 + i * 2;
            *s = if gp { le16(buf, off) } else { buf[off] as u16 };
        }
        Ok(Self { version: le16(buf, 0), sectors })
    }

    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.version);
        for (i, s) in self.sectors.iter().enumerate() {
            put16(&mut page, 2 + i * 2, *s);
        }
        page
    }

    pub fn sectors(&self, address: u8) -> u16 {
        match address {
            0 => 1,
            a => self.sectors[a as usize - 1],
        }
    }

    pub fn set_sectors(&mut self, address: u8, n: u16) {
        if address > 0 {
            self.sectors[address as usize - 1] = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_counts_by_address() {
        let mut dir = LogDirectory::default();
        dir.set_sectors(0x03, 0x0102);
        dir.set_sectors(0x07, 2);
        let page = dir.to_page();

        let gp = LogDirectory::from_page(&page, true).unwrap();
        assert_eq!(gp.sectors(0x03), 0x0102);
        assert_eq!(gp.sectors(0x07), 2);
        assert_eq!(gp.sectors(0x00), 1);

        let smart = LogDirectory::from_page(&page, false).unwrap();
        assert_eq!(smart.sectors(0x03), 0x02);
    }
}
