// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writer for the classic Unix `ar` archive format.

`.deb` files are `ar` archives holding exactly three members. Only the common
format is supported: member names must fit in the 16 byte name field. There is
no support for the GNU or BSD long name extensions, nor for symbol tables.

Each member is a 60 byte header followed by the member data. Data of odd length
is followed by a single `\n` pad byte, which is not counted in the header's
size field.
*/

use {
    crate::error::{DebpkgError, Result},
    std::io::Write,
};

/// Global archive header.
pub const MAGIC: &[u8] = b"!<arch>\n";

/// Size of a member header in bytes.
pub const HEADER_SIZE: usize = 60;

/// Terminator of every member header.
pub const HEADER_END: &[u8] = b"`\n";

/// Longest member name the format can hold.
pub const MAX_NAME_LENGTH: usize = 16;

/// Default mode for members: a regular file with `0644` permissions.
pub const DEFAULT_MODE: u32 = 0o100644;

/// A named blob of data to store in an `ar` archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArMember {
    name: String,
    mtime: u64,
    uid: u32,
    gid: u32,
    mode: u32,
    data: Vec<u8>,
}

impl ArMember {
    /// Construct a member owned by root with default mode and a zero mtime.
    pub fn new(name: impl ToString, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            mtime: 0,
            uid: 0,
            gid: 0,
            mode: DEFAULT_MODE,
            data: data.into(),
        }
    }

    /// Set the modification time, in seconds since the UNIX epoch.
    pub fn set_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Set the numeric owner of the member.
    pub fn set_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Set the mode of the member.
    ///
    /// This is the full `st_mode` value, including file type bits.
    pub fn set_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Exact length of the member data, excluding any pad byte.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Serialize the 60 byte header for this member.
    pub fn header(&self) -> Result<[u8; HEADER_SIZE]> {
        validate_name(&self.name)?;

        let mut header = [b' '; HEADER_SIZE];

        write_field(&mut header[0..16], "name", &self.name)?;
        write_field(&mut header[16..28], "mtime", &self.mtime.to_string())?;
        write_field(&mut header[28..34], "uid", &self.uid.to_string())?;
        write_field(&mut header[34..40], "gid", &self.gid.to_string())?;
        write_field(&mut header[40..48], "mode", &format!("{:o}", self.mode))?;
        write_field(&mut header[48..58], "size", &self.data.len().to_string())?;
        header[58..60].copy_from_slice(HEADER_END);

        Ok(header)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DebpkgError::Format("member name is empty".into()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(DebpkgError::Format(format!(
            "member name {} is {} bytes; maximum is {}",
            name,
            name.len(),
            MAX_NAME_LENGTH
        )));
    }

    if !name.bytes().all(|b| b.is_ascii_graphic() && b != b'/') {
        return Err(DebpkgError::Format(format!(
            "member name {:?} contains characters not allowed in ar names",
            name
        )));
    }

    Ok(())
}

/// Write a left-justified, space padded value into a header field.
fn write_field(field: &mut [u8], label: &str, value: &str) -> Result<()> {
    let value = value.as_bytes();

    if value.len() > field.len() {
        return Err(DebpkgError::Format(format!(
            "{} value {} does not fit in {} byte field",
            label,
            String::from_utf8_lossy(value),
            field.len()
        )));
    }

    field[0..value.len()].copy_from_slice(value);
    field[value.len()..].fill(b' ');

    Ok(())
}

/// Write an `ar` archive containing `members`, in order, to a writer.
///
/// All member headers are validated before anything is written, so a bad
/// member never results in a partially written archive.
pub fn write_archive<W: Write>(writer: &mut W, members: &[ArMember]) -> Result<()> {
    let headers = members
        .iter()
        .map(|member| member.header())
        .collect::<Result<Vec<_>>>()?;

    writer.write_all(MAGIC)?;

    for (header, member) in headers.iter().zip(members) {
        writer.write_all(header)?;
        writer.write_all(&member.data)?;

        if member.data.len() % 2 == 1 {
            writer.write_all(b"\n")?;
        }
    }

    Ok(())
}

/// Build an `ar` archive in memory.
pub fn build_archive(members: &[ArMember]) -> Result<Vec<u8>> {
    let capacity = MAGIC.len()
        + members
            .iter()
            .map(|m| HEADER_SIZE + m.size() + m.size() % 2)
            .sum::<usize>();

    let mut buffer = Vec::with_capacity(capacity);
    write_archive(&mut buffer, members)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Read};

    #[test]
    fn header_layout() -> Result<()> {
        let member = ArMember::new("debian-binary", b"2.0\n".to_vec()).set_mtime(1234567890);

        assert_eq!(
            &member.header()?[..],
            &b"debian-binary   1234567890  0     0     100644  4         `\n"[..]
        );

        Ok(())
    }

    #[test]
    fn odd_member_padded() -> Result<()> {
        let archive = build_archive(&[
            ArMember::new("a", b"abc".to_vec()),
            ArMember::new("b", b"de".to_vec()),
        ])?;

        assert!(archive.starts_with(MAGIC));
        assert_eq!(archive.len(), 8 + 60 + 4 + 60 + 2);
        assert_eq!(&archive[8 + 48..8 + 58], b"3         ");
        assert_eq!(&archive[8 + 60..8 + 64], b"abc\n");
        assert_eq!(&archive[8 + 64..8 + 65], b"b");

        Ok(())
    }

    #[test]
    fn empty_archive() -> Result<()> {
        assert_eq!(build_archive(&[])?, MAGIC);

        Ok(())
    }

    #[test]
    fn long_name_rejected_before_writing() {
        let mut buffer = vec![];

        let res = write_archive(
            &mut buffer,
            &[
                ArMember::new("debian-binary", b"2.0\n".to_vec()),
                ArMember::new("a".repeat(20), vec![]),
            ],
        );

        assert!(matches!(res, Err(DebpkgError::Format(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn bad_names_rejected() {
        for name in ["", "has space", "slash/", "tab\t"] {
            assert!(
                matches!(ArMember::new(name, vec![]).header(), Err(DebpkgError::Format(_))),
                "{:?} rejected",
                name
            );
        }

        assert!(ArMember::new("a".repeat(16), vec![]).header().is_ok());
    }

    #[test]
    fn oversized_fields_rejected() {
        let member = ArMember::new("x", vec![]).set_owner(1_000_000, 0);
        assert!(matches!(member.header(), Err(DebpkgError::Format(_))));

        let member = ArMember::new("x", vec![]).set_mtime(10u64.pow(12));
        assert!(matches!(member.header(), Err(DebpkgError::Format(_))));
    }

    #[test]
    fn readable_by_ar_crate() -> Result<()> {
        let members = vec![
            ArMember::new("debian-binary", b"2.0\n".to_vec()).set_mtime(42),
            ArMember::new("control.tar.gz", vec![1u8; 333]).set_mtime(42),
            ArMember::new("data.tar.gz", vec![2u8; 1024]).set_mtime(42),
        ];

        let archive = build_archive(&members)?;

        let mut reader = ::ar::Archive::new(std::io::Cursor::new(archive));

        for expected in &members {
            let mut entry = reader.next_entry().expect("entry present")?;

            assert_eq!(entry.header().identifier(), expected.name().as_bytes());
            assert_eq!(entry.header().size(), expected.size() as u64);
            assert_eq!(entry.header().mtime(), 42);
            assert_eq!(entry.header().mode(), DEFAULT_MODE);

            let mut data = vec![];
            entry.read_to_end(&mut data)?;
            assert_eq!(data, expected.data());
        }

        assert!(reader.next_entry().is_none());

        Ok(())
    }
}
