// SPDX-License-Identifier: AGPL-3.0-or-later
//! ustar archive format
//!
//! Indexes uncompressed tar containers: POSIX ustar headers with the
//! prefix field, GNU long names (`L` records) and GNU base-256 sizes.
//! Pax extended headers contribute their `path` and `size` records.
//! Entry data is served directly from the archive through bounded windows.

use chrono::DateTime;
use std::io::SeekFrom;

use vfa_core::archive::{ArchiveEntry, ArchiveFormat, Signature};
use vfa_core::backend::InputStream;
use vfa_core::stream::{BoundedWindow, RandomRead};
use vfa_core::{VfaError, VfaResult};

const BLOCK: u64 = 512;

/// Reader for tar archives
#[derive(Debug, Default, Clone, Copy)]
pub struct TarFormat;

fn padded(size: u64) -> u64 {
    size.div_ceil(BLOCK).saturating_mul(BLOCK)
}

fn field_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn parse_numeric(raw: &[u8], what: &str) -> VfaResult<u64> {
    // GNU base-256: high bit of the first byte set.
    if raw.first().is_some_and(|b| b & 0x80 != 0) {
        let mut value = u64::from(raw[0] & 0x7f);
        for &b in &raw[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(u64::from(b)))
                .ok_or_else(|| VfaError::Archive(format!("{what} field overflows")))?;
        }
        return Ok(value);
    }
    let text = field_str(raw);
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 8)
        .map_err(|_| VfaError::Archive(format!("bad {what} field {text:?}")))
}

fn checksum_ok(header: &[u8; BLOCK as usize]) -> VfaResult<bool> {
    let stored = parse_numeric(&header[148..156], "checksum")?;
    let sum: u64 = header
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { u64::from(b' ') } else { u64::from(b) })
        .sum();
    Ok(sum == stored)
}

/// `path` and `size` records of a pax extended header.
fn parse_pax(data: &[u8]) -> (Option<String>, Option<u64>) {
    let (mut path, mut size) = (None, None);
    let mut rest = data;
    while !rest.is_empty() {
        let Some(space) = rest.iter().position(|&b| b == b' ') else { break };
        let Some(len) = std::str::from_utf8(&rest[..space]).ok().and_then(|s| s.parse::<usize>().ok())
        else {
            break;
        };
        if len <= space || len > rest.len() {
            break;
        }
        let record = String::from_utf8_lossy(&rest[space + 1..len]);
        if let Some((key, value)) = record.trim_end_matches('\n').split_once('=') {
            match key {
                "path" => path = Some(value.to_string()),
                "size" => size = value.parse().ok(),
                _ => {}
            }
        }
        rest = &rest[len..];
    }
    (path, size)
}

fn read_data(archive: &mut dyn RandomRead, offset: u64, size: u64) -> VfaResult<Vec<u8>> {
    let len = usize::try_from(size)
        .map_err(|_| VfaError::Archive(format!("extended header of {size} bytes")))?;
    let mut data = vec![0u8; len];
    archive.seek(SeekFrom::Start(offset))?;
    archive.read_fully(&mut data)?;
    Ok(data)
}

impl ArchiveFormat for TarFormat {
    fn name(&self) -> &str {
        "tar"
    }

    fn extensions(&self) -> &[&str] {
        &["tar"]
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature { offset: 257, magic: b"ustar" })
    }

    fn read_index(&self, archive: &mut dyn RandomRead) -> VfaResult<Vec<ArchiveEntry>> {
        let length = archive.length()?;
        let mut entries = Vec::new();
        let mut offset = 0u64;
        let mut long_name: Option<String> = None;
        let mut pax_size: Option<u64> = None;
        let mut header = [0u8; BLOCK as usize];

        while offset.saturating_add(BLOCK) <= length {
            archive.seek(SeekFrom::Start(offset))?;
            archive.read_fully(&mut header)?;
            if header.iter().all(|&b| b == 0) {
                break;
            }
            if !checksum_ok(&header)? {
                return Err(VfaError::Archive(format!("header checksum mismatch at {offset}")));
            }

            let typeflag = header[156];
            let mut size = parse_numeric(&header[124..136], "size")?;
            let data_offset = offset + BLOCK;
            if matches!(typeflag, b'L' | b'x' | b'g') && data_offset.saturating_add(size) > length {
                return Err(VfaError::Archive(format!("truncated extended header at {offset}")));
            }

            match typeflag {
                b'L' => {
                    let data = read_data(archive, data_offset, size)?;
                    long_name = Some(field_str(&data));
                }
                b'x' => {
                    let data = read_data(archive, data_offset, size)?;
                    let (path, extended_size) = parse_pax(&data);
                    if path.is_some() {
                        long_name = path;
                    }
                    pax_size = extended_size;
                }
                b'g' => {}
                _ => {
                    if let Some(extended) = pax_size.take() {
                        size = extended;
                    }
                    let path = long_name.take().unwrap_or_else(|| {
                        let name = field_str(&header[0..100]);
                        let prefix = if &header[257..262] == b"ustar" {
                            field_str(&header[345..500])
                        } else {
                            String::new()
                        };
                        if prefix.is_empty() { name } else { format!("{prefix}/{name}") }
                    });
                    let mode = parse_numeric(&header[100..108], "mode")?;
                    let mtime = parse_numeric(&header[136..148], "mtime")?;
                    let modified = i64::try_from(mtime)
                        .ok()
                        .and_then(|secs| DateTime::from_timestamp(secs, 0));

                    let is_directory = typeflag == b'5' || path.ends_with('/');
                    let entry = match typeflag {
                        b'0' | 0 | b'7' if !is_directory => {
                            if data_offset.saturating_add(size) > length {
                                return Err(VfaError::Archive(format!("{path} is truncated")));
                            }
                            Some(ArchiveEntry::file(path, data_offset, size))
                        }
                        _ if is_directory => Some(ArchiveEntry::directory(path)),
                        // Links, devices and fifos are not exposed.
                        _ => None,
                    };
                    if let Some(mut entry) = entry {
                        entry.modified = modified;
                        entry.permissions = Some((mode & 0o777) as u16);
                        entries.push(entry);
                    }
                }
            }
            offset = data_offset.saturating_add(padded(size));
        }
        tracing::debug!("tar index: {} entries", entries.len());
        Ok(entries)
    }

    fn open_entry(&self, archive: Box<dyn RandomRead>, entry: &ArchiveEntry) -> VfaResult<InputStream> {
        Ok(Box::new(BoundedWindow::new(archive, entry.offset, entry.size)?))
    }

    fn open_random_entry(
        &self,
        archive: Box<dyn RandomRead>,
        entry: &ArchiveEntry,
    ) -> VfaResult<Box<dyn RandomRead>> {
        Ok(Box::new(BoundedWindow::new(archive, entry.offset, entry.size)?))
    }
}

/// Writes ustar archives in memory
///
/// Names longer than the header allows are emitted as GNU long-name
/// records.
#[derive(Debug, Default)]
pub struct TarBuilder {
    out: Vec<u8>,
    mtime: u64,
}

impl TarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modification time, in Unix seconds, stamped on following entries.
    pub fn mtime(mut self, secs: u64) -> Self {
        self.mtime = secs;
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.push(path, b'0', 0o644, data);
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        let path = format!("{}/", path.trim_end_matches('/'));
        self.push(&path, b'5', 0o755, &[]);
        self
    }

    /// Terminate the archive with two zero blocks.
    pub fn finish(mut self) -> Vec<u8> {
        self.out.resize(self.out.len() + 2 * BLOCK as usize, 0);
        self.out
    }

    fn push(&mut self, path: &str, typeflag: u8, mode: u64, data: &[u8]) {
        if path.len() > 100 {
            let mut name = path.as_bytes().to_vec();
            name.push(0);
            self.push_raw("././@LongLink", b'L', 0, &name);
        }
        self.push_raw(path, typeflag, mode, data);
    }

    fn push_raw(&mut self, path: &str, typeflag: u8, mode: u64, data: &[u8]) {
        let mut header = [0u8; BLOCK as usize];
        let name = path.as_bytes();
        let name = &name[..name.len().min(100)];
        header[..name.len()].copy_from_slice(name);
        write_octal(&mut header[100..108], mode);
        write_octal(&mut header[108..116], 0);
        write_octal(&mut header[116..124], 0);
        write_octal(&mut header[124..136], data.len() as u64);
        write_octal(&mut header[136..148], self.mtime);
        header[156] = typeflag;
        header[257..263].copy_from_slice(b"ustar\0");
        header[263..265].copy_from_slice(b"00");

        header[148..156].fill(b' ');
        let sum: u64 = header.iter().map(|&b| u64::from(b)).sum();
        header[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());

        self.out.extend_from_slice(&header);
        self.out.extend_from_slice(data);
        let padding = (padded(data.len() as u64) - data.len() as u64) as usize;
        self.out.resize(self.out.len() + padding, 0);
    }
}

fn write_octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let text = format!("{value:0width$o}");
    let bytes = text.as_bytes();
    let bytes = &bytes[bytes.len().saturating_sub(width)..];
    field[..bytes.len()].copy_from_slice(bytes);
    field[width] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use vfa_core::stream::MemoryRandomAccess;

    fn index(bytes: Vec<u8>) -> VfaResult<Vec<ArchiveEntry>> {
        TarFormat.read_index(&mut MemoryRandomAccess::new(bytes))
    }

    #[test]
    fn test_index_files_and_directories() {
        let bytes = TarBuilder::new()
            .mtime(1_700_000_000)
            .directory("docs")
            .file("docs/readme.txt", b"hello tar")
            .file("top.bin", &[7u8; 1000])
            .finish();
        let entries = index(bytes.clone()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].path, "docs/");
        assert_eq!(entries[1].path, "docs/readme.txt");
        assert_eq!(entries[1].size, 9);
        assert_eq!(entries[1].permissions, Some(0o644));
        assert_eq!(entries[1].modified.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(entries[2].offset % BLOCK, 0);

        let archive = Box::new(MemoryRandomAccess::new(bytes));
        let mut text = String::new();
        TarFormat.open_entry(archive, &entries[1]).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello tar");
    }

    #[test]
    fn test_long_names() {
        let long = format!("{}/leaf.txt", "d".repeat(120));
        let entries = index(TarBuilder::new().file(&long, b"x").finish()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, long);
    }

    #[test]
    fn test_prefix_field() {
        let mut bytes = TarBuilder::new().file("name.txt", b"abc").finish();
        bytes[345..351].copy_from_slice(b"prefix");
        bytes[148..156].fill(b' ');
        let sum: u64 = bytes[..512].iter().map(|&b| u64::from(b)).sum();
        bytes[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
        let entries = index(bytes).unwrap();
        assert_eq!(entries[0].path, "prefix/name.txt");
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let mut bytes = TarBuilder::new().file("a", b"abc").finish();
        bytes[0] = b'b';
        assert!(matches!(index(bytes), Err(VfaError::Archive(_))));
    }

    #[test]
    fn test_truncated_entry_rejected() {
        let mut bytes = TarBuilder::new().file("a", &[1u8; 600]).finish();
        bytes.truncate(700);
        assert!(matches!(index(bytes), Err(VfaError::Archive(_))));
    }

    #[test]
    fn test_random_entry_window() {
        let bytes = TarBuilder::new().file("a", b"0123456789").finish();
        let entries = index(bytes.clone()).unwrap();
        let mut entry = TarFormat
            .open_random_entry(Box::new(MemoryRandomAccess::new(bytes)), &entries[0])
            .unwrap();
        assert_eq!(entry.length().unwrap(), 10);
        entry.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = String::new();
        entry.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "6789");
    }

    #[test]
    fn test_pax_path() {
        let record = "31 path=pax/very/long/name.txt\n";
        assert_eq!(record.len(), 31);
        let (path, size) = parse_pax(record.as_bytes());
        assert_eq!(path.as_deref(), Some("pax/very/long/name.txt"));
        assert_eq!(size, None);
    }

    #[test]
    fn test_base256_size() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[10] = 0x01;
        field[11] = 0x02;
        assert_eq!(parse_numeric(&field, "size").unwrap(), 0x0102);
    }
}
