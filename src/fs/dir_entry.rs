use byteorder::{ByteOrder, LittleEndian};

use crate::error::FatError;

// FAT directory entry constants
pub const DIR_ENTRY_SIZE: usize = 32;
const ATTR_READ_ONLY: u8 = 0x01;
const ATTR_HIDDEN: u8 = 0x02;
const ATTR_SYSTEM: u8 = 0x04;
const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

const END_OF_DIRECTORY: u8 = 0x00;
const DELETED: u8 = 0xE5;

/// A raw 32-byte short (8.3) directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortDirEntry {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub attr: u8,
    pub nt_reserved: u8,
    pub create_time_tenths: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub cluster_high: u16,
    pub modify_time: u16,
    pub modify_date: u16,
    pub cluster_low: u16,
    pub length: u32,
}

/// How the tree walk treats a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Deleted, unused or otherwise not printable.
    Vacant,
    /// A long-filename fragment.
    LongName,
    /// The "." entry.
    SelfLink,
    /// The ".." entry.
    ParentLink,
    /// A file, subdirectory or volume label record.
    Real,
}

impl ShortDirEntry {
    pub fn parse(bytes: &[u8]) -> Result<Self, FatError> {
        if bytes.len() < DIR_ENTRY_SIZE {
            return Err(FatError::Format(format!(
                "directory record too short: {} bytes",
                bytes.len()
            )));
        }
        let mut name = [0u8; 8];
        name.copy_from_slice(&bytes[0..8]);
        let mut ext = [0u8; 3];
        ext.copy_from_slice(&bytes[8..11]);
        Ok(Self {
            name,
            ext,
            attr: bytes[11],
            nt_reserved: bytes[12],
            create_time_tenths: bytes[13],
            create_time: LittleEndian::read_u16(&bytes[14..16]),
            create_date: LittleEndian::read_u16(&bytes[16..18]),
            access_date: LittleEndian::read_u16(&bytes[18..20]),
            cluster_high: LittleEndian::read_u16(&bytes[20..22]),
            modify_time: LittleEndian::read_u16(&bytes[22..24]),
            modify_date: LittleEndian::read_u16(&bytes[24..26]),
            cluster_low: LittleEndian::read_u16(&bytes[26..28]),
            length: LittleEndian::read_u32(&bytes[28..32]),
        })
    }

    pub fn is_end_of_directory(&self) -> bool {
        self.name[0] == END_OF_DIRECTORY
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED
    }

    pub fn is_long_name(&self) -> bool {
        self.attr == ATTR_LONG_NAME
    }

    pub fn is_directory(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        !self.is_long_name() && self.attr & ATTR_VOLUME_ID != 0
    }

    pub fn start_cluster(&self) -> u32 {
        ((self.cluster_high as u32) << 16) | self.cluster_low as u32
    }

    pub fn kind(&self) -> EntryKind {
        if !self.name[0].is_ascii_graphic() && self.name[0] != b' ' {
            return EntryKind::Vacant;
        }
        if self.is_long_name() {
            return EntryKind::LongName;
        }
        match self.name {
            [b'.', b' ', ..] => EntryKind::SelfLink,
            [b'.', b'.', b' ', ..] => EntryKind::ParentLink,
            _ => EntryKind::Real,
        }
    }

    /// The 8 and 3 byte fields exactly as stored, joined by a dot.
    pub fn raw_name(&self) -> String {
        format!(
            "{}.{}",
            decode_oem_string(&self.name),
            decode_oem_string(&self.ext)
        )
    }

    /// Display name with padding removed ("README.TXT").
    pub fn short_name(&self) -> String {
        build_short_name(&self.name, &self.ext)
    }

    /// Last modification time as "YYYY-MM-DD HH:MM:SS", if set.
    pub fn modified(&self) -> Option<String> {
        let formatted = format_fat_datetime(self.modify_date, self.modify_time);
        (!formatted.is_empty()).then_some(formatted)
    }
}

/// A file or directory reached through a directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatFile {
    entry: ShortDirEntry,
}

impl FatFile {
    pub fn new(entry: ShortDirEntry) -> Self {
        Self { entry }
    }

    /// Synthesize the root directory, which has no record of its own.
    pub(crate) fn root(root_cluster: u32, size: u32) -> Self {
        let mut name = [b' '; 8];
        name[0] = b'/';
        Self {
            entry: ShortDirEntry {
                name,
                ext: [b' '; 3],
                attr: ATTR_DIRECTORY,
                nt_reserved: 0,
                create_time_tenths: 0,
                create_time: 0,
                create_date: 0,
                access_date: 0,
                cluster_high: (root_cluster >> 16) as u16,
                modify_time: 0,
                modify_date: 0,
                cluster_low: (root_cluster & 0xFFFF) as u16,
                length: size,
            },
        }
    }

    pub fn entry(&self) -> &ShortDirEntry {
        &self.entry
    }

    pub fn is_directory(&self) -> bool {
        self.entry.is_directory()
    }

    pub fn start_cluster(&self) -> u32 {
        self.entry.start_cluster()
    }

    /// Recorded byte length. Meaningless for directories.
    pub fn size(&self) -> u64 {
        self.entry.length as u64
    }

    /// Length that bounds reads: the recorded size for files, unbounded for
    /// directories.
    pub fn effective_len(&self) -> u64 {
        if self.is_directory() {
            u64::MAX
        } else {
            self.size()
        }
    }
}

/// Build a DOS 8.3 short filename from the name and extension bytes.
///
/// FAT short names use OEM codepage encoding (typically CP437). Bytes 0x80-0xFF
/// are decoded using the CP437 table rather than assuming UTF-8.
fn build_short_name(name: &[u8], ext: &[u8]) -> String {
    let name_str = decode_oem_string(name);
    let name_trimmed = name_str.trim_end();
    let ext_str = decode_oem_string(ext);
    let ext_trimmed = ext_str.trim_end();

    if ext_trimmed.is_empty() {
        name_trimmed.to_string()
    } else {
        format!("{name_trimmed}.{ext_trimmed}")
    }
}

fn decode_oem_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| cp437_to_char(b)).collect()
}

fn cp437_to_char(b: u8) -> char {
    if b < 0x80 {
        b as char
    } else {
        CP437_HIGH[b as usize - 0x80]
    }
}

/// CP437 to Unicode mapping for bytes 0x80-0xFF.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    // 0x80-0x8F
    'Ç','ü','é','â','ä','à','å','ç', 'ê','ë','è','ï','î','ì','Ä','Å',
    // 0x90-0x9F
    'É','æ','Æ','ô','ö','ò','û','ù', 'ÿ','Ö','Ü','¢','£','¥','₧','ƒ',
    // 0xA0-0xAF
    'á','í','ó','ú','ñ','Ñ','ª','º', '¿','⌐','¬','½','¼','¡','«','»',
    // 0xB0-0xBF
    '░','▒','▓','│','┤','╡','╢','╖', '╕','╣','║','╗','╝','╜','╛','┐',
    // 0xC0-0xCF
    '└','┴','┬','├','─','┼','╞','╟', '╚','╔','╩','╦','╠','═','╬','╧',
    // 0xD0-0xDF
    '╨','╤','╥','╙','╘','╒','╓','╫', '╪','┘','┌','█','▄','▌','▐','▀',
    // 0xE0-0xEF
    'α','ß','Γ','π','Σ','σ','µ','τ', 'Φ','Θ','Ω','δ','∞','φ','ε','∩',
    // 0xF0-0xFF
    '≡','±','≥','≤','⌠','⌡','÷','≈', '°','∙','·','√','ⁿ','²','■','\u{00A0}',
];

fn format_fat_datetime(date: u16, time: u16) -> String {
    if date == 0 {
        return String::new();
    }
    let day = date & 0x1F;
    let month = (date >> 5) & 0x0F;
    let year = ((date >> 9) & 0x7F) + 1980;
    let second = (time & 0x1F) * 2;
    let minute = (time >> 5) & 0x3F;
    let hour = (time >> 11) & 0x1F;
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}
