// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writer for the tar archives embedded in `.deb` files.

Headers use the POSIX `ustar` layout. Names are limited to the 100 byte `name`
field: the `prefix` field, GNU `@LongLink` records, and PAX extended headers
are never emitted, so an over-long path is an error rather than a silently
truncated or split name.

Entries are written in the order given. Callers are responsible for emitting
a directory before anything inside it.
*/

use {
    crate::error::{DebpkgError, Result},
    std::io::Write,
};

/// Size of header and data blocks.
pub const BLOCK_SIZE: usize = 512;

/// Maximum length of an entry name or symlink target.
pub const NAME_FIELD_SIZE: usize = 100;

const MAGIC: &[u8] = b"ustar\0";
const VERSION: &[u8] = b"00";

/// Owner name recorded for entries owned by uid/gid 0.
const ROOT_NAME: &[u8] = b"root";

/// The kind of an archive entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TarEntryType {
    Regular,
    Directory,
    Symlink,
}

impl TarEntryType {
    /// The value of the header `typeflag` field.
    pub fn type_flag(&self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::Directory => b'5',
            Self::Symlink => b'2',
        }
    }
}

/// A single record in a tar archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TarEntry {
    /// Path inside the archive. Always begins with `./`. Directories end with `/`.
    pub path: String,
    pub entry_type: TarEntryType,
    /// Permission bits. File type bits are conveyed by `entry_type`.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Declared payload size. Must equal `data.len()`.
    pub size: u64,
    /// Target of a symlink.
    pub link_name: Option<String>,
    pub data: Vec<u8>,
}

impl TarEntry {
    /// A directory entry with the conventional `0755` mode.
    pub fn directory(path: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            entry_type: TarEntryType::Directory,
            mode: 0o755,
            uid: 0,
            gid: 0,
            size: 0,
            link_name: None,
            data: vec![],
        }
    }

    /// A regular file entry.
    pub fn file(path: impl ToString, mode: u32, data: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            entry_type: TarEntryType::Regular,
            mode,
            uid: 0,
            gid: 0,
            size: data.len() as u64,
            link_name: None,
            data,
        }
    }

    /// A symbolic link entry.
    pub fn symlink(path: impl ToString, target: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            entry_type: TarEntryType::Symlink,
            mode: 0o777,
            uid: 0,
            gid: 0,
            size: 0,
            link_name: Some(target.to_string()),
            data: vec![],
        }
    }

    pub fn set_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.path.starts_with("./") {
            return Err(DebpkgError::Format(format!(
                "tar entry path must begin with ./: {}",
                self.path
            )));
        }

        if self.mode & !0o7777 != 0 {
            return Err(DebpkgError::Format(format!(
                "tar entry {} has non-permission mode bits: {:o}",
                self.path, self.mode
            )));
        }

        let expected_size = match self.entry_type {
            TarEntryType::Regular => self.data.len() as u64,
            TarEntryType::Directory | TarEntryType::Symlink => 0,
        };

        if self.size != expected_size || self.size != self.data.len() as u64 {
            return Err(DebpkgError::ChecksumMismatch {
                path: self.path.clone(),
                declared: format!("{} bytes", self.size),
                actual: format!("{} bytes", self.data.len()),
            });
        }

        match (self.entry_type, &self.link_name) {
            (TarEntryType::Symlink, None) => Err(DebpkgError::Format(format!(
                "symlink {} lacks a target",
                self.path
            ))),
            (TarEntryType::Symlink, Some(_)) => Ok(()),
            (_, Some(_)) => Err(DebpkgError::Format(format!(
                "only symlinks can have a link target: {}",
                self.path
            ))),
            (_, None) => Ok(()),
        }
    }

    /// Serialize the 512 byte header block for this entry.
    pub fn header(&self, mtime: u64) -> Result<[u8; BLOCK_SIZE]> {
        self.validate()?;

        let mut header = [0u8; BLOCK_SIZE];

        write_name(&mut header[0..100], &self.path)?;
        write_octal(&mut header[100..108], "mode", self.mode as u64)?;
        write_octal(&mut header[108..116], "uid", self.uid as u64)?;
        write_octal(&mut header[116..124], "gid", self.gid as u64)?;
        write_octal(&mut header[124..136], "size", self.size)?;
        write_octal(&mut header[136..148], "mtime", mtime)?;
        header[156] = self.entry_type.type_flag();

        if let Some(target) = &self.link_name {
            write_name(&mut header[157..257], target)?;
        }

        header[257..263].copy_from_slice(MAGIC);
        header[263..265].copy_from_slice(VERSION);

        if self.uid == 0 {
            header[265..265 + ROOT_NAME.len()].copy_from_slice(ROOT_NAME);
        }
        if self.gid == 0 {
            header[297..297 + ROOT_NAME.len()].copy_from_slice(ROOT_NAME);
        }

        write_octal(&mut header[329..337], "devmajor", 0)?;
        write_octal(&mut header[337..345], "devminor", 0)?;

        // The checksum is computed with its own field filled with spaces and
        // stored as 6 octal digits, a NUL, and a space.
        header[148..156].fill(b' ');
        let checksum = header.iter().map(|b| *b as u32).sum::<u32>();
        header[148..156].copy_from_slice(format!("{:06o}\0 ", checksum).as_bytes());

        Ok(header)
    }
}

fn write_name(field: &mut [u8], name: &str) -> Result<()> {
    let value = name.as_bytes();

    if value.len() > field.len() {
        return Err(DebpkgError::PathTooLong(name.to_string(), value.len()));
    }

    field[0..value.len()].copy_from_slice(value);

    Ok(())
}

/// Write a zero-padded octal number followed by a NUL terminator.
fn write_octal(field: &mut [u8], label: &str, value: u64) -> Result<()> {
    let digits = field.len() - 1;
    let encoded = format!("{:0width$o}", value, width = digits);

    if encoded.len() > digits {
        return Err(DebpkgError::Format(format!(
            "tar {} value {} does not fit in {} octal digits",
            label, value, digits
        )));
    }

    field[0..digits].copy_from_slice(encoded.as_bytes());
    field[digits] = 0;

    Ok(())
}

/// Write a tar archive containing `entries` to a writer.
///
/// Every entry header is computed before any bytes are written. All entries
/// share the modification time `mtime`.
pub fn write_archive<W: Write>(writer: &mut W, entries: &[TarEntry], mtime: u64) -> Result<()> {
    let headers = entries
        .iter()
        .map(|entry| entry.header(mtime))
        .collect::<Result<Vec<_>>>()?;

    let zeros = [0u8; BLOCK_SIZE];

    for (header, entry) in headers.iter().zip(entries) {
        writer.write_all(header)?;
        writer.write_all(&entry.data)?;

        let remainder = entry.data.len() % BLOCK_SIZE;
        if remainder != 0 {
            writer.write_all(&zeros[remainder..])?;
        }
    }

    // End of archive is marked by two zero blocks.
    writer.write_all(&zeros)?;
    writer.write_all(&zeros)?;

    Ok(())
}

/// Build a tar archive in memory.
pub fn build_archive(entries: &[TarEntry], mtime: u64) -> Result<Vec<u8>> {
    let mut buffer = vec![];
    write_archive(&mut buffer, entries, mtime)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{io::Read, path::Path},
    };

    fn sample_entries() -> Vec<TarEntry> {
        vec![
            TarEntry::directory("./"),
            TarEntry::directory("./etc/"),
            TarEntry::directory("./etc/sampleapp/"),
            TarEntry::file("./etc/sampleapp/sample.conf", 0o644, b"KEY1=VALUE1\n".to_vec()),
            TarEntry::file("./etc/sampleapp/run", 0o755, vec![7u8; 1000]).set_owner(1000, 1000),
            TarEntry::symlink("./etc/sampleapp/current", "sample.conf"),
        ]
    }

    #[test]
    fn header_fields() -> Result<()> {
        let entry = TarEntry::file("./usr/bin/app", 0o755, vec![1, 2, 3]);
        let header = entry.header(1700000000)?;

        assert_eq!(&header[0..14], b"./usr/bin/app\0");
        assert_eq!(&header[100..108], b"0000755\0");
        assert_eq!(&header[108..116], b"0000000\0");
        assert_eq!(&header[124..136], b"00000000003\0");
        assert_eq!(&header[136..148], format!("{:011o}\0", 1700000000u64).as_bytes());
        assert_eq!(header[156], b'0');
        assert_eq!(&header[257..265], b"ustar\x0000");
        assert_eq!(&header[265..270], b"root\0");
        assert_eq!(&header[297..302], b"root\0");

        Ok(())
    }

    #[test]
    fn checksum_computed_with_spaces() -> Result<()> {
        let header = TarEntry::directory("./opt/").header(0)?;

        assert_eq!(header[154], 0);
        assert_eq!(header[155], b' ');

        let stored = std::str::from_utf8(&header[148..154]).unwrap();
        let stored = u32::from_str_radix(stored, 8).unwrap();

        let mut copy = header;
        copy[148..156].fill(b' ');
        let expected = copy.iter().map(|b| *b as u32).sum::<u32>();

        assert_eq!(stored, expected);

        Ok(())
    }

    #[test]
    fn non_root_owner_has_no_names() -> Result<()> {
        let header = TarEntry::file("./x", 0o644, vec![])
            .set_owner(1000, 0)
            .header(0)?;

        assert_eq!(&header[108..116], b"0001750\0");
        assert_eq!(&header[265..297], &[0u8; 32]);
        assert_eq!(&header[297..301], b"root");

        Ok(())
    }

    #[test]
    fn archive_layout() -> Result<()> {
        let entries = vec![
            TarEntry::directory("./"),
            TarEntry::file("./a", 0o644, vec![1u8; 513]),
        ];
        let archive = build_archive(&entries, 0)?;

        // header + header + 2 data blocks + 2 end blocks
        assert_eq!(archive.len(), 6 * BLOCK_SIZE);
        assert!(archive[4 * BLOCK_SIZE..].iter().all(|b| *b == 0));
        assert_eq!(archive[2 * BLOCK_SIZE + 512], 1);
        assert!(archive[2 * BLOCK_SIZE + 513..4 * BLOCK_SIZE]
            .iter()
            .all(|b| *b == 0));

        Ok(())
    }

    #[test]
    fn empty_archive_is_end_marker() -> Result<()> {
        assert_eq!(build_archive(&[], 0)?, vec![0u8; 2 * BLOCK_SIZE]);

        Ok(())
    }

    #[test]
    fn long_path_rejected() {
        let path = format!("./{}", "a".repeat(99));
        assert_eq!(path.len(), 101);

        let mut buffer = vec![];
        let res = write_archive(
            &mut buffer,
            &[
                TarEntry::directory("./"),
                TarEntry::file(path, 0o644, vec![]),
            ],
            0,
        );

        assert!(matches!(res, Err(DebpkgError::PathTooLong(_, 101))));
        assert!(buffer.is_empty());

        let path = format!("./{}", "a".repeat(98));
        assert!(TarEntry::file(path, 0o644, vec![]).header(0).is_ok());
    }

    #[test]
    fn long_symlink_target_rejected() {
        let entry = TarEntry::symlink("./link", "t".repeat(101));

        assert!(matches!(
            entry.header(0),
            Err(DebpkgError::PathTooLong(_, 101))
        ));
    }

    #[test]
    fn size_mismatch_rejected() {
        let mut entry = TarEntry::file("./a", 0o644, vec![1, 2, 3]);
        entry.size = 4;

        assert!(matches!(
            entry.header(0),
            Err(DebpkgError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn relative_path_rejected() {
        assert!(matches!(
            TarEntry::file("etc/x", 0o644, vec![]).header(0),
            Err(DebpkgError::Format(_))
        ));
    }

    #[test]
    fn readable_by_tar_crate() -> Result<()> {
        let entries = sample_entries();
        let archive = build_archive(&entries, 1600000000)?;

        let mut reader = ::tar::Archive::new(std::io::Cursor::new(archive));

        let mut count = 0;
        for (entry, expected) in reader.entries()?.zip(&entries) {
            let mut entry = entry?;
            count += 1;

            assert_eq!(entry.path()?, Path::new(&expected.path));
            assert_eq!(entry.header().mode()?, expected.mode);
            assert_eq!(entry.header().size()?, expected.size);
            assert_eq!(entry.header().uid()?, expected.uid as u64);
            assert_eq!(entry.header().mtime()?, 1600000000);

            match expected.entry_type {
                TarEntryType::Directory => assert!(entry.header().entry_type().is_dir()),
                TarEntryType::Symlink => {
                    assert!(entry.header().entry_type().is_symlink());
                    assert_eq!(
                        entry.link_name()?.as_deref(),
                        Some(Path::new("sample.conf"))
                    );
                }
                TarEntryType::Regular => assert!(entry.header().entry_type().is_file()),
            }

            let mut data = vec![];
            entry.read_to_end(&mut data)?;
            assert_eq!(data, expected.data);
        }

        assert_eq!(count, entries.len());

        Ok(())
    }
}
