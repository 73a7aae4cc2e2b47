//! SCT status (log 0xe0) and SCT temperature history table (log 0xe1).

use super::{expect_len, le16, le32, le64, put16, put32, SECTOR_SIZE};
use crate::error::Result;

/// Temperature byte meaning "no reading".
pub const TEMP_UNKNOWN: i8 = -128;
pub const MAX_HISTORY: usize = 478;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SctStatus {
    pub format_version:    u16,
    pub sct_version:       u16,
    pub sct_spec:          u16,
    pub status_flags:      u32,
    pub device_state:      u8,
    pub ext_status_code:   u16,
    pub action_code:       u16,
    pub function_code:     u16,
    pub lba_current:       u64,
    pub hda_temp:          i8,
    pub min_temp:          i8,
    pub max_temp:          i8,
    pub life_min_temp:     i8,
    pub life_max_temp:     i8,
    pub max_op_limit:      i8,
    pub over_limit_count:  u32,
    pub under_limit_count: u32,
    pub smart_status:      u16,
    pub min_erc_time:      u16,
    pub vendor_specific:   [u8; 32],
}

impl Default for SctStatus {
    fn default() -> Self {
        Self {
            format_version:    3,
            sct_version:       0,
            sct_spec:          1,
            status_flags:      0,
            device_state:      0,
            ext_status_code:   0,
            action_code:       0,
            function_code:     0,
            lba_current:       0,
            hda_temp:          TEMP_UNKNOWN,
            min_temp:          TEMP_UNKNOWN,
            max_temp:          TEMP_UNKNOWN,
            life_min_temp:     TEMP_UNKNOWN,
            life_max_temp:     TEMP_UNKNOWN,
            max_op_limit:      0,
            over_limit_count:  0,
            under_limit_count: 0,
            smart_status:      0,
            min_erc_time:      0,
            vendor_specific:   [0; 32],
        }
    }
}

impl SctStatus {
    pub fn from_page(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "SCT status", SECTOR_SIZE)?;
        let mut vendor_specific = [0u8; 32];
        vendor_specific.copy_from_slice(&buf[480..512]);
        Ok(Self {
            format_version:    le16(buf, 0),
            sct_version:       le16(buf, 2),
            sct_spec:          le16(buf, 4),
            status_flags:      le32(buf, 6),
            device_state:      buf[10],
            ext_status_code:   le16(buf, 14),
            action_code:       le16(buf, 16),
            function_code:     le16(buf, 18),
            lba_current:       le64(buf, 40),
            hda_temp:          buf[200] as i8,
            min_temp:          buf[201] as i8,
            max_temp:          buf[202] as i8,
            life_min_temp:     buf[203] as i8,
            life_max_temp:     buf[204] as i8,
            max_op_limit:      buf[205] as i8,
            over_limit_count:  le32(buf, 206),
            under_limit_count: le32(buf, 210),
            smart_status:      le16(buf, 214),
            min_erc_time:      le16(buf, 216),
            vendor_specific,
        })
    }

    /// The SCT status page carries no checksum.
    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.format_version);
        put16(&mut page, 2, self.sct_version);
        put16(&mut page, 4, self.sct_spec);
        put32(&mut page, 6, self.status_flags);
        page[10] = self.device_state;
        put16(&mut page, 14, self.ext_status_code);
        put16(&mut page, 16, self.action_code);
        put16(&mut page, 18, self.function_code);
        page[40..48].copy_from_slice(&self.lba_current.to_le_bytes());
        page[200] = self.hda_temp as u8;
        page[201] = self.min_temp as u8;
        page[202] = self.max_temp as u8;
        page[203] = self.life_min_temp as u8;
        page[204] = self.life_max_temp as u8;
        page[205] = self.max_op_limit as u8;
        put32(&mut page, 206, self.over_limit_count);
        put32(&mut page, 210, self.under_limit_count);
        put16(&mut page, 214, self.smart_status);
        put16(&mut page, 216, self.min_erc_time);
        page[480..512].copy_from_slice(&self.vendor_specific);
        page
    }

    /// Early format 2 drives leave the newer statistics fields zero.
    pub fn is_old_format_2(&self) -> bool {
        self.min_temp == 0 && self.life_min_temp == 0 && self.under_limit_count == 0 && self.over_limit_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SctTempHistory {
    pub format_version:  u16,
    pub sampling_period: u16,
    /// Minutes between two history entries.
    pub interval:        u16,
    pub max_op_limit:    i8,
    pub over_limit:      i8,
    pub min_op_limit:    i8,
    pub under_limit:     i8,
    pub size:            u16,
    /// Zero-based slot of the newest sample.
    pub index:           u16,
    pub samples:         Vec<i8>,
}

impl SctTempHistory {
    pub fn from_page(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "SCT temperature history", SECTOR_SIZE)?;
        Ok(Self {
            format_version:  le16(buf, 0),
            sampling_period: le16(buf, 2),
            interval:        le16(buf, 4),
            max_op_limit:    buf[6] as i8,
            over_limit:      buf[7] as i8,
            min_op_limit:    buf[8] as i8,
            under_limit:     buf[9] as i8,
            size:            le16(buf, 30),
            index:           le16(buf, 32),
            samples:         buf[34..34 + MAX_HISTORY].iter().map(|b| *b as i8).collect(),
        })
    }

    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.format_version);
        put16(&mut page, 2, self.sampling_period);
        put16(&mut page, 4, self.interval);
        page[6] = self.max_op_limit as u8;
        page[7] = self.over_limit as u8;
        page[8] = self.min_op_limit as u8;
        page[9] = self.under_limit as u8;
        put16(&mut page, 30, self.size);
        put16(&mut page, 32, self.index);
        for (dst, s) in page[34..34 + MAX_HISTORY].iter_mut().zip(&self.samples) {
            *dst = *s as u8;
        }
        page
    }

    /// Size and index are within the 478-slot table.
    pub fn is_valid(&self) -> bool {
        self.size > 0 && self.size as usize <= MAX_HISTORY && self.index < self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_temperatures_are_signed() {
        let mut sts = SctStatus::default();
        sts.hda_temp = 38;
        sts.min_temp = -5;
        sts.max_temp = 41;
        sts.life_min_temp = 20;
        sts.life_max_temp = 55;
        sts.over_limit_count = 3;
        sts.smart_status = 0xc24f;
        let page = sts.to_page();
        assert_eq!(page[201], 0xfb);
        let back = SctStatus::from_page(&page).unwrap();
        assert_eq!(back, sts);
        assert!(!back.is_old_format_2());
    }

    #[test]
    fn history_validity() {
        let mut h = SctTempHistory {
            format_version:  2,
            sampling_period: 1,
            interval:        10,
            max_op_limit:    60,
            over_limit:      70,
            min_op_limit:    0,
            under_limit:     -5,
            size:            128,
            index:           5,
            samples:         vec![30; MAX_HISTORY],
        };
        let back = SctTempHistory::from_page(&h.to_page()).unwrap();
        assert_eq!(back, h);
        assert!(back.is_valid());
        h.index = 128;
        assert!(!h.is_valid());
        h.size = 0;
        assert!(!h.is_valid());
    }
}
