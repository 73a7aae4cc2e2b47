//! ATA command names, error register descriptions and timestamp rendering
//! for error log entries.

/// Name of an ATA command. Commands with subcommands in the features
/// register are resolved further.
pub fn command_name(command: u8, features: u8) -> &'static str {
    match command {
        0x00 => match features {
            0x00 => "NOP [Abort queued commands]",
            0x01 => "NOP [Don't abort queued commands] [OBS-ACS-2]",
            _ => "NOP [Reserved subcommand] [OBS-ACS-2]",
        },
        0x92 => match features {
            0x01 => "DOWNLOAD MICROCODE [Temporary] [OBS-8]",
            0x03 => "DOWNLOAD MICROCODE [Save with offsets]",
            0x07 => "DOWNLOAD MICROCODE [Save]",
            0x0e => "DOWNLOAD MICROCODE [Save for future use]",
            0x0f => "DOWNLOAD MICROCODE [Activate]",
            _ => "DOWNLOAD MICROCODE [Reserved subcommand]",
        },
        0xb0 => smart_subcommand(features),
        0xb1 => match features {
            0xc0 => "DEVICE CONFIGURATION RESTORE [OBS-ACS-3]",
            0xc1 => "DEVICE CONFIGURATION FREEZE LOCK [OBS-ACS-3]",
            0xc2 => "DEVICE CONFIGURATION IDENTIFY [OBS-ACS-3]",
            0xc3 => "DEVICE CONFIGURATION SET [OBS-ACS-3]",
            _ => "DEVICE CONFIGURATION [Reserved subcommand] [OBS-ACS-3]",
        },
        0xef => set_features_subcommand(features),
        0xf9 => match features {
            0x00 => "SET MAX ADDRESS [OBS-6]",
            0x01 => "SET MAX SET PASSWORD [OBS-ACS-3]",
            0x02 => "SET MAX LOCK [OBS-ACS-3]",
            0x03 => "SET MAX UNLOCK [OBS-ACS-3]",
            0x04 => "SET MAX FREEZE LOCK [OBS-ACS-3]",
            _ => "SET MAX [Reserved subcommand] [OBS-ACS-3]",
        },
        c => base_command_name(c),
    }
}

fn smart_subcommand(features: u8) -> &'static str {
    match features {
        0xd0 => "SMART READ DATA",
        0xd1 => "SMART READ ATTRIBUTE THRESHOLDS [OBS-4]",
        0xd2 => "SMART ENABLE/DISABLE ATTRIBUTE AUTOSAVE",
        0xd3 => "SMART SAVE ATTRIBUTE VALUES [OBS-6]",
        0xd4 => "SMART EXECUTE OFF-LINE IMMEDIATE",
        0xd5 => "SMART READ LOG",
        0xd6 => "SMART WRITE LOG",
        0xd7 => "SMART WRITE ATTRIBUTE THRESHOLDS [NS, OBS-4]",
        0xd8 => "SMART ENABLE OPERATIONS",
        0xd9 => "SMART DISABLE OPERATIONS",
        0xda => "SMART RETURN STATUS",
        0xdb => "SMART EN/DISABLE AUTO OFFLINE [NS (SFF-8035i)]",
        0xe0..=0xff => "SMART [Vendor specific subcommand]",
        _ => "SMART [Reserved subcommand]",
    }
}

fn set_features_subcommand(features: u8) -> &'static str {
    match features {
        0x01 => "SET FEATURES [Enable 8-bit PIO] [OBS-3]",
        0x02 => "SET FEATURES [Enable write cache]",
        0x03 => "SET FEATURES [Set transfer mode]",
        0x04 => "SET FEATURES [Enable auto DR] [OBS-4]",
        0x05 => "SET FEATURES [Enable APM]",
        0x06 => "SET FEATURES [Enable Pwr-Up In Standby]",
        0x07 => "SET FEATURES [Set device spin-up]",
        0x09 => "SET FEATURES [Reserved (address offset)] [OPS-ACS-3]",
        0x0a => "SET FEATURES [Enable CFA power mode 1]",
        0x10 => "SET FEATURES [Enable SATA feature]",
        0x20 => "SET FEATURES [Set Time-ltd R/W WCT]",
        0x21 => "SET FEATURES [Set Time-ltd R/W EH]",
        0x31 => "SET FEATURES [Disable Media Status Notf] [OBS-8]",
        0x33 => "SET FEATURES [Disable retry] [OBS-4]",
        0x41 => "SET FEATURES [Enable Free-fall Control]",
        0x42 => "SET FEATURES [Enable AAM] [OBS-ACS-2]",
        0x43 => "SET FEATURES [Set Max Host I/F S Times]",
        0x44 => "SET FEATURES [Length of VS data] [OBS-4]",
        0x4a => "SET FEATURES [Ext. Power Conditions]",
        0x54 => "SET FEATURES [Set cache segs] [OBS-4]",
        0x55 => "SET FEATURES [Disable read look-ahead]",
        0x5d => "SET FEATURES [Enable release interrupt] [OBS-ACS-2]",
        0x5e => "SET FEATURES [Enable SERVICE interrupt] [OBS-ACS-2]",
        0x66 => "SET FEATURES [Disable revert defaults]",
        0x69 => "SET FEATURES [LPS Error Reporting Control]",
        0x77 => "SET FEATURES [Disable ECC] [OBS-4]",
        0x81 => "SET FEATURES [Disable 8-bit PIO] [OBS-3]",
        0x82 => "SET FEATURES [Disable write cache]",
        0x84 => "SET FEATURES [Disable auto DR] [OBS-4]",
        0x85 => "SET FEATURES [Disable APM]",
        0x86 => "SET FEATURES [Disable Pwr-Up In Standby]",
        0x88 => "SET FEATURES [Disable ECC] [OBS-4]",
        0x89 => "SET FEATURES [Reserved (address offset)]",
        0x8a => "SET FEATURES [Disable CFA power mode 1]",
        0x90 => "SET FEATURES [Disable SATA feature]",
        0x95 => "SET FEATURES [Enable Media Status Notf] [OBS-8]",
        0x99 => "SET FEATURES [Enable retries] [OBS-4]",
        0x9a => "SET FEATURES [Set max avg curr] [OBS-4]",
        0xaa => "SET FEATURES [Enable read look-ahead]",
        0xab => "SET FEATURES [Set max prefetch] [OBS-4]",
        0xbb => "SET FEATURES [4 bytes VS data] [OBS-4]",
        0xc1 => "SET FEATURES [Disable Free-fall Control]",
        0xc2 => "SET FEATURES [Disable AAM] [OBS-ACS-2]",
        0xc3 => "SET FEATURES [Sense Data Reporting]",
        0xcc => "SET FEATURES [Enable revert to defaults]",
        0xdd => "SET FEATURES [Disable release interrupt] [OBS-ACS-2]",
        0xde => "SET FEATURES [Disable SERVICE interrupt] [OBS-ACS-2]",
        0xe0 => "SET FEATURES [Vendor specific] [OBS-7]",
        0xf0..=0xff => "SET FEATURES [Reserved for CFA]",
        _ => "SET FEATURES [Reserved subcommand]",
    }
}

const RESERVED: &str = "[RESERVED]";
const VENDOR: &str = "[VENDOR SPECIFIC]";

fn base_command_name(command: u8) -> &'static str {
    match command {
        0x03 => "CFA REQUEST EXTENDED ERROR",
        0x06 => "DATA SET MANAGEMENT",
        0x08 => "DEVICE RESET",
        0x0b => "REQUEST SENSE DATA EXT",
        0x10 => "RECALIBRATE [OBS-4]",
        0x11..=0x1f => "RECALIBRATE [RET-4]",
        0x20 => "READ SECTOR(S)",
        0x21 => "READ SECTOR(S) [OBS-5]",
        0x22 => "READ LONG [OBS-4]",
        0x23 => "READ LONG (w/o retry) [OBS-4]",
        0x24 => "READ SECTOR(S) EXT",
        0x25 => "READ DMA EXT",
        0x26 => "READ DMA QUEUED EXT [OBS-ACS-2]",
        0x27 => "READ NATIVE MAX ADDRESS EXT [OBS-ACS-3]",
        0x29 => "READ MULTIPLE EXT",
        0x2a => "READ STREAM DMA",
        0x2b => "READ STREAM",
        0x2f => "READ LOG EXT",
        0x30 => "WRITE SECTOR(S)",
        0x31 => "WRITE SECTOR(S) (w/o retry) [OBS-5]",
        0x32 => "WRITE LONG [OBS-4]",
        0x33 => "WRITE LONG (w/o retry) [OBS-4]",
        0x34 => "WRITE SECTORS(S) EXT",
        0x35 => "WRITE DMA EXT",
        0x36 => "WRITE DMA QUEUED EXT [OBS-ACS-2]",
        0x37 => "SET NATIVE MAX ADDRESS EXT [OBS-ACS-3]",
        0x38 => "CFA WRITE SECTORS WITHOUT ERASE",
        0x39 => "WRITE MULTIPLE EXT",
        0x3a => "WRITE STREAM DMA",
        0x3b => "WRITE STREAM",
        0x3c => "WRITE VERIFY [OBS-4]",
        0x3d => "WRITE DMA FUA EXT",
        0x3e => "WRITE DMA QUEUED FUA EXT [OBS-ACS-2]",
        0x3f => "WRITE LOG EXT",
        0x40 => "READ VERIFY SECTOR(S)",
        0x41 => "READ VERIFY SECTOR(S) (w/o retry) [OBS-5]",
        0x42 => "READ VERIFY SECTOR(S) EXT",
        0x45 => "WRITE UNCORRECTABLE EXT",
        0x47 => "READ LOG DMA EXT",
        0x50 => "FORMAT TRACK [OBS-4]",
        0x51 => "CONFIGURE STREAM",
        0x57 => "WRITE LOG DMA EXT",
        0x5b => "TRUSTED NON-DATA",
        0x5c => "TRUSTED RECEIVE",
        0x5d => "TRUSTED RECEIVE DMA",
        0x5e => "TRUSTED SEND",
        0x5f => "TRUSTED SEND DMA",
        0x60 => "READ FPDMA QUEUED",
        0x61 => "WRITE FPDMA QUEUED",
        0x62 | 0x66 | 0x67 => "[RESERVED FOR SERIAL ATA]",
        0x63 => "NCQ QUEUE MANAGEMENT",
        0x64 => "SEND FPDMA QUEUED",
        0x65 => "RECEIVE FPDMA QUEUED",
        0x70 => "SEEK [OBS-7]",
        0x71..=0x76 | 0x79..=0x7f => "SEEK [RET-4]",
        0x77 => "SET DATE & TIME EXT",
        0x78 => "ACCESSIBLE MAX ADDRESS CONFIGURATION",
        0x87 => "CFA TRANSLATE SECTOR [VS IF NO CFA]",
        0x80..=0x8f => VENDOR,
        0x90 => "EXECUTE DEVICE DIAGNOSTIC",
        0x91 => "INITIALIZE DEVICE PARAMETERS [OBS-6]",
        0x93 => "DOWNLOAD MICROCODE DMA",
        0x94 => "STANDBY IMMEDIATE [RET-4]",
        0x95 => "IDLE IMMEDIATE [RET-4]",
        0x96 => "STANDBY [RET-4]",
        0x97 => "IDLE [RET-4]",
        0x98 => "CHECK POWER MODE [RET-4]",
        0x99 => "SLEEP [RET-4]",
        0x9a => VENDOR,
        0xa0 => "PACKET",
        0xa1 => "IDENTIFY PACKET DEVICE",
        0xa2 => "SERVICE [OBS-ACS-2]",
        0xb4 => "SANITIZE DEVICE",
        0xb6 => "NV CACHE [OBS-ACS-3]",
        0xb7..=0xbb => "[RESERVED FOR COMPACTFLASH ASSOCIATION]",
        0xc0 => "CFA ERASE SECTORS [VS IF NO CFA]",
        0xc1..=0xc3 => VENDOR,
        0xc4 => "READ MULTIPLE",
        0xc5 => "WRITE MULTIPLE",
        0xc6 => "SET MULTIPLE MODE",
        0xc7 => "READ DMA QUEUED [OBS-ACS-2]",
        0xc8 => "READ DMA",
        0xc9 => "READ DMA (w/o retry) [OBS-5]",
        0xca => "WRITE DMA",
        0xcb => "WRITE DMA (w/o retry) [OBS-5]",
        0xcc => "WRITE DMA QUEUED [OBS-ACS-2]",
        0xcd => "CFA WRITE MULTIPLE WITHOUT ERASE",
        0xce => "WRITE MULTIPLE FUA EXT",
        0xd1 => "CHECK MEDIA CARD TYPE [OBS-ACS-2]",
        0xd2..=0xd4 => "[RESERVED FOR MEDIA CARD PASS THROUGH]",
        0xda => "GET MEDIA STATUS [OBS-8]",
        0xdb => "ACKNOWLEDGE MEDIA CHANGE [RET-4]",
        0xdc => "BOOT POST-BOOT [RET-4]",
        0xdd => "BOOT PRE-BOOT [RET-4]",
        0xde => "MEDIA LOCK [OBS-8]",
        0xdf => "MEDIA UNLOCK [OBS-8]",
        0xe0 => "STANDBY IMMEDIATE",
        0xe1 => "IDLE IMMEDIATE",
        0xe2 => "STANDBY",
        0xe3 => "IDLE",
        0xe4 => "READ BUFFER",
        0xe5 => "CHECK POWER MODE",
        0xe6 => "SLEEP",
        0xe7 => "FLUSH CACHE",
        0xe8 => "WRITE BUFFER",
        0xe9 => "READ BUFFER DMA",
        0xea => "FLUSH CACHE EXT",
        0xeb => "WRITE BUFFER DMA",
        0xec => "IDENTIFY DEVICE",
        0xed => "MEDIA EJECT [OBS-8]",
        0xee => "IDENTIFY DEVICE DMA [OBS-4]",
        0xf0 | 0xf7 | 0xfa..=0xff => VENDOR,
        0xf1 => "SECURITY SET PASSWORD",
        0xf2 => "SECURITY UNLOCK",
        0xf3 => "SECURITY ERASE PREPARE",
        0xf4 => "SECURITY ERASE UNIT",
        0xf5 => "SECURITY FREEZE LOCK",
        0xf6 => "SECURITY DISABLE PASSWORD",
        0xf8 => "READ NATIVE MAX ADDRESS [OBS-ACS-3]",
        _ => RESERVED,
    }
}

// ── Status / error register descriptions ─────────────────────────────

const ABRT:  &str = "ABRT";
const AMNF:  &str = "AMNF";
const CCTO:  &str = "CCTO";
const EOM:   &str = "EOM";
const ICRC:  &str = "ICRC";
const IDNF:  &str = "IDNF";
const ILI:   &str = "ILI";
const MC:    &str = "MC";
const MCR:   &str = "MCR";
const NM:    &str = "NM";
const OBS:   &str = "obs";
const TK0NF: &str = "TK0NF";
const UNC:   &str = "UNC";
const WP:    &str = "WP";

/// Which error register bits a command defines, and whether the failing
/// LBA and transfer length are meaningful for it.
#[derive(Default)]
struct ErrorBits {
    names:   [Option<&'static str>; 8],
    lba:     bool,
    sectors: bool,
}

impl ErrorBits {
    fn new(bits: &[(usize, &'static str)]) -> Self {
        let mut names = [None; 8];
        for (bit, name) in bits {
            names[*bit] = Some(*name);
        }
        Self { names, ..Self::default() }
    }

    fn with_lba(mut self) -> Self {
        self.lba = true;
        self
    }

    fn with_sectors(mut self, yes: bool) -> Self {
        self.sectors = yes;
        self
    }
}

fn error_bits(command: u8, features: u8) -> Option<ErrorBits> {
    let bits = match command {
        0x10 => ErrorBits::new(&[(2, ABRT), (1, TK0NF)]),
        0x20 | 0x21 | 0x24 | 0xc4 | 0x29 => {
            ErrorBits::new(&[(6, UNC), (5, MC), (4, IDNF), (3, MCR), (2, ABRT), (1, NM), (0, AMNF)]).with_lba()
        }
        0x22 | 0x23 => ErrorBits::new(&[(4, IDNF), (2, ABRT), (0, AMNF)]).with_lba(),
        0x2a | 0x2b => {
            let mut b = ErrorBits::new(&[(6, UNC), (5, MC), (4, IDNF), (3, MCR), (2, ABRT), (1, NM), (0, CCTO)]);
            if command == 0x2a {
                b.names[7] = Some(ICRC);
            }
            b.with_lba().with_sectors(true)
        }
        0x3a | 0x3b => {
            let mut b = ErrorBits::new(&[(6, WP), (5, MC), (4, IDNF), (3, MCR), (2, ABRT), (1, NM), (0, CCTO)]);
            if command == 0x3a {
                b.names[7] = Some(ICRC);
            }
            b.with_lba().with_sectors(true)
        }
        0x25 | 0x26 | 0xc7 | 0xc8 | 0xc9 | 0x60 => ErrorBits::new(&[
            (7, ICRC),
            (6, UNC),
            (5, MC),
            (4, IDNF),
            (3, MCR),
            (2, ABRT),
            (1, NM),
            (0, AMNF),
        ])
        .with_lba()
        .with_sectors(command == 0x25 || command == 0xc8),
        0x30 | 0x31 | 0x34 | 0xc5 | 0x39 | 0xce => {
            ErrorBits::new(&[(6, WP), (5, MC), (4, IDNF), (3, MCR), (2, ABRT), (1, NM)]).with_lba()
        }
        0x32 | 0x33 => ErrorBits::new(&[(4, IDNF), (2, ABRT)]).with_lba(),
        0x3c => ErrorBits::new(&[(6, UNC), (4, IDNF), (2, ABRT), (0, AMNF)]).with_lba(),
        0x40 | 0x41 | 0x42 => {
            ErrorBits::new(&[(6, UNC), (5, MC), (4, IDNF), (3, MCR), (2, ABRT), (1, NM), (0, AMNF)]).with_lba()
        }
        0xa0 => ErrorBits::new(&[
            (7, "Sense key (bit 3)"),
            (6, "Sense key (bit 2)"),
            (5, "Sense key (bit 1)"),
            (4, "Sense key (bit 0)"),
            (2, ABRT),
            (1, EOM),
            (0, ILI),
        ]),
        0xa1 | 0xef | 0x00 | 0xc6 | 0xe4 | 0xe8 => ErrorBits::new(&[(2, ABRT)]),
        0x2f => ErrorBits::new(&[(6, UNC), (4, IDNF), (2, ABRT), (0, OBS)]),
        0x3f => ErrorBits::new(&[(4, IDNF), (2, ABRT), (0, OBS)]),
        0xb0 => match features {
            0xd0 | 0xd1 | 0xd5 => ErrorBits::new(&[(6, UNC), (4, IDNF), (2, ABRT), (0, OBS)]),
            0xd6 => ErrorBits::new(&[(4, IDNF), (2, ABRT), (0, OBS)]),
            0xd2 | 0xd3 | 0xd8 | 0xd9 | 0xda | 0xdb => ErrorBits::new(&[(2, ABRT)]),
            0xd4 => ErrorBits::new(&[(4, IDNF), (2, ABRT)]),
            _ => return None,
        },
        0xb1 if features == 0xc0 => ErrorBits::new(&[(2, ABRT)]),
        0xca | 0xcb | 0x35 | 0x3d | 0xcc | 0x36 | 0x3e | 0x61 => ErrorBits::new(&[
            (7, ICRC),
            (6, WP),
            (5, MC),
            (4, IDNF),
            (3, MCR),
            (2, ABRT),
            (1, NM),
            (0, AMNF),
        ])
        .with_lba()
        .with_sectors(command == 0x35),
        _ => return None,
    };
    Some(bits)
}

/// Failing address as the log recorded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailingLba {
    Lba28(u32),
    Lba48(u64),
}

/// Register snapshot needed to describe one error.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext {
    pub command:      u8,
    pub features:     u8,
    pub status:       u8,
    pub error:        u8,
    pub sector_count: u16,
    pub lba:          FailingLba,
}

/// Human description of the status and error registers, e.g.
/// `Error: UNC 8 sectors at LBA = 0x0012abcd = 1223629`. Empty for
/// commands whose error bits are unknown.
pub fn describe_error(ctx: &ErrorContext) -> String {
    let Some(bits) = error_bits(ctx.command, ctx.features) else {
        return String::new();
    };

    let mut s = String::new();
    if ctx.status & 0x20 != 0 {
        s.push_str("Device Fault");
        if ctx.status & 0x01 != 0 {
            s.push_str("; ");
        }
    }
    if ctx.status & 0x01 != 0 {
        s.push_str("Error: ");
        let names: Vec<&str> = (0..8)
            .rev()
            .filter(|bit| ctx.error & (1 << bit) != 0)
            .filter_map(|bit| bits.names[bit])
            .collect();
        s.push_str(&names.join(", "));
    }

    if bits.lba {
        if bits.sectors && ctx.sector_count != 0 {
            s.push_str(&format!(" {} sectors", ctx.sector_count));
        }
        match ctx.lba {
            FailingLba::Lba28(lba) => s.push_str(&format!(" at LBA = 0x{:08x} = {}", lba, lba)),
            FailingLba::Lba48(lba) => s.push_str(&format!(" at LBA = 0x{:08x} = {}", lba, lba)),
        }
    }
    s
}

/// Device state at the time of an error (low nibble of the state byte).
pub fn error_state_name(state: u8) -> &'static str {
    match state & 0x0f {
        0x0 => "in an unknown state",
        0x1 => "sleeping",
        0x2 => "in standby mode",
        0x3 => "active or idle",
        0x4 => "doing SMART Offline or Self-test",
        s if s < 0x0b => "in a reserved state",
        _ => "in a vendor specific state",
    }
}

/// `[Dd+]HH:MM:SS.mmm` for a command timestamp in milliseconds.
pub fn format_milliseconds(ms: u32) -> String {
    let days = ms / 86_400_000;
    let rest = ms % 86_400_000;
    let hours = rest / 3_600_000;
    let minutes = rest / 60_000 % 60;
    let seconds = rest / 1000 % 60;
    let millis = rest % 1000;
    let clock = format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis);
    if days > 0 {
        format!("{}d+{}", days, clock)
    } else {
        clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_with_subcommands() {
        assert_eq!(command_name(0xb0, 0xd0), "SMART READ DATA");
        assert_eq!(command_name(0xb0, 0xe5), "SMART [Vendor specific subcommand]");
        assert_eq!(command_name(0xb0, 0x10), "SMART [Reserved subcommand]");
        assert_eq!(command_name(0xef, 0x02), "SET FEATURES [Enable write cache]");
        assert_eq!(command_name(0xef, 0xf3), "SET FEATURES [Reserved for CFA]");
        assert_eq!(command_name(0x25, 0xff), "READ DMA EXT");
        assert_eq!(command_name(0x60, 0x08), "READ FPDMA QUEUED");
        assert_eq!(command_name(0x28, 0x00), "[RESERVED]");
        assert_eq!(command_name(0x85, 0x00), "[VENDOR SPECIFIC]");
        assert_eq!(command_name(0x87, 0x00), "CFA TRANSLATE SECTOR [VS IF NO CFA]");
        assert_eq!(command_name(0x7a, 0x00), "SEEK [RET-4]");
    }

    #[test]
    fn read_dma_error_with_lba() {
        let ctx = ErrorContext {
            command:      0xc8,
            features:     0,
            status:       0x51,
            error:        0x40,
            sector_count: 8,
            lba:          FailingLba::Lba28(0x0012_abcd),
        };
        assert_eq!(describe_error(&ctx), "Error: UNC 8 sectors at LBA = 0x0012abcd = 1223629");
    }

    #[test]
    fn device_fault_and_multiple_bits() {
        let ctx = ErrorContext {
            command:      0x61,
            features:     0,
            status:       0x21,
            error:        0x84,
            sector_count: 16,
            lba:          FailingLba::Lba48(0x1_0000_0000),
        };
        assert_eq!(describe_error(&ctx), "Device Fault; Error: ICRC, ABRT at LBA = 0x100000000 = 4294967296");
    }

    #[test]
    fn unknown_command_gives_nothing() {
        let ctx = ErrorContext {
            command:      0xb0,
            features:     0x42,
            status:       0x51,
            error:        0x04,
            sector_count: 0,
            lba:          FailingLba::Lba28(0),
        };
        assert_eq!(describe_error(&ctx), "");
        let smart = ErrorContext { features: 0xd8, ..ctx };
        assert_eq!(describe_error(&smart), "Error: ABRT");
    }

    #[test]
    fn states_and_timestamps() {
        assert_eq!(error_state_name(0x13), "active or idle");
        assert_eq!(error_state_name(0x07), "in a reserved state");
        assert_eq!(error_state_name(0x0c), "in a vendor specific state");
        assert_eq!(format_milliseconds(3_723_004), "01:02:03.004");
        assert_eq!(format_milliseconds(90_061_001), "1d+01:01:01.001");
    }
}
