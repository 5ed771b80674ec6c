// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Compression of the tar members of `.deb` files. */

use {
    crate::error::{DebpkgError, Result},
    std::{io::Read, str::FromStr},
};

/// Compression format to apply to `control.tar` and `data.tar`.
///
/// Not all compression formats are supported by all Linux distributions.
/// Gzip is understood by every `dpkg` in the wild.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebCompression {
    /// Do not compress contents of `.deb` files.
    Uncompressed,
    /// Compress as `.gz` files.
    Gzip,
    /// Compress as `.xz` files using a specified compression level.
    Xz(u32),
    /// Compress as `.zst` files using a specified compression level.
    Zstandard(i32),
}

impl Default for DebCompression {
    fn default() -> Self {
        Self::Gzip
    }
}

impl FromStr for DebCompression {
    type Err = DebpkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "uncompressed" => Ok(Self::Uncompressed),
            "gzip" | "gz" => Ok(Self::Gzip),
            "xz" => Ok(Self::Xz(6)),
            "zstd" | "zst" => Ok(Self::Zstandard(3)),
            _ => Err(DebpkgError::Format(format!("unknown compression format: {}", s))),
        }
    }
}

impl DebCompression {
    /// Obtain the filename extension for this compression format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Uncompressed => "",
            Self::Gzip => ".gz",
            Self::Xz(_) => ".xz",
            Self::Zstandard(_) => ".zst",
        }
    }

    /// Compress input data from a reader.
    ///
    /// Output is a pure function of the input: the gzip header carries no
    /// file name and a zero modification time.
    pub fn compress(&self, reader: &mut impl Read) -> Result<Vec<u8>> {
        let mut buffer = vec![];

        match self {
            Self::Uncompressed => {
                std::io::copy(reader, &mut buffer)?;
            }
            Self::Gzip => {
                let header = libflate::gzip::HeaderBuilder::new()
                    .modification_time(0)
                    .finish();

                let mut encoder = libflate::gzip::Encoder::with_options(
                    &mut buffer,
                    libflate::gzip::EncodeOptions::new().header(header),
                )?;
                std::io::copy(reader, &mut encoder)?;
                encoder.finish().into_result()?;
            }
            Self::Xz(level) => {
                let mut encoder = xz2::write::XzEncoder::new(buffer, *level);
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
            Self::Zstandard(level) => {
                let mut encoder = zstd::Encoder::new(buffer, *level)?;
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
        }

        Ok(buffer)
    }
}
