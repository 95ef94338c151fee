// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Minimal streaming codec for the Unix `ar` archive format.

Debian `.deb` files are `ar` archives using the common variant: 16 byte
space-padded member names (conventionally slash-terminated), decimal sizes,
and a `\n` pad byte after odd-sized payloads.

This is a deliberate reimplementation rather than a dependency: the popular
third-party readers for this format are known to crash on malformed inputs
that show up in the wild, and the subset Debian needs is small. The reader
is streaming and never buffers a whole archive.
*/

use {
    crate::error::{PpaError, Result},
    std::io::{Read, Write},
};

/// Global archive magic.
pub const GLOBAL_MAGIC: &[u8; 8] = b"!<arch>\n";

/// Size of a per-entry header.
const HEADER_SIZE: usize = 60;

/// Parsed per-entry header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArHeader {
    name: String,
    mtime: u64,
    size: u64,
    mode: u32,
}

impl ArHeader {
    /// Construct a header for writing.
    pub fn new(name: impl ToString, mtime: u64, mode: u32) -> Self {
        Self {
            name: name.to_string(),
            mtime,
            size: 0,
            mode,
        }
    }

    /// Member name with trailing spaces and at most one trailing `/` removed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modification time in seconds since the epoch.
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Size of the member data in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Member mode bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }
}

fn header_field(buf: &[u8]) -> &str {
    // Header fields are ASCII padded with spaces. Interpret lossily so a
    // stray high byte surfaces as a parse error rather than a panic.
    std::str::from_utf8(buf).unwrap_or("").trim_matches(' ')
}

/// A streaming reader of `ar` archives.
///
/// The reader tracks how many bytes of the current member are unread plus
/// the pending pad byte; advancing to the next entry consumes both, so
/// callers are free to read as much or as little of each member as they
/// want.
#[derive(Debug)]
pub struct ArReader<R: Read> {
    inner: R,
    /// Bytes left unread in the current entry.
    remaining: u64,
    /// Pad byte after the current entry (0 or 1).
    pad: u64,
}

impl<R: Read> ArReader<R> {
    /// Construct a reader, validating the global archive magic.
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        inner.read_exact(&mut magic).map_err(|e| {
            PpaError::MalformedArchive(format!("reading ar global header: {}", e))
        })?;
        if &magic != GLOBAL_MAGIC {
            return Err(PpaError::MalformedArchive("not an ar archive".into()));
        }

        Ok(Self {
            inner,
            remaining: 0,
            pad: 0,
        })
    }

    /// Advance to the next entry, returning its header.
    ///
    /// Resolves to `None` at a clean end of archive. Unread data from the
    /// previous entry is skipped.
    pub fn next_entry(&mut self) -> Result<Option<ArHeader>> {
        let skip = self.remaining + self.pad;
        if skip > 0 {
            let copied = std::io::copy(&mut (&mut self.inner).take(skip), &mut std::io::sink())?;
            if copied < skip {
                return Err(PpaError::MalformedArchive(
                    "truncated ar entry data".into(),
                ));
            }
        }
        self.remaining = 0;
        self.pad = 0;

        let mut buf = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(PpaError::MalformedArchive(
                        "truncated ar entry header".into(),
                    ))
                };
            }
            filled += n;
        }

        // Trailer bytes at offsets 58-59.
        if buf[58] != b'`' || buf[59] != b'\n' {
            return Err(PpaError::MalformedArchive(
                "invalid ar entry header trailer".into(),
            ));
        }

        let mut name = header_field(&buf[0..16]);
        if let Some(stripped) = name.strip_suffix('/') {
            name = stripped;
        }

        let size = header_field(&buf[48..58])
            .parse::<u64>()
            .map_err(|e| PpaError::ParseError(format!("parsing ar entry size: {}", e)))?;

        let mtime_field = header_field(&buf[16..28]);
        let mtime = if mtime_field.is_empty() {
            0
        } else {
            mtime_field.parse::<u64>().unwrap_or(0)
        };

        let mode_field = header_field(&buf[40..48]);
        let mode = if mode_field.is_empty() {
            0
        } else {
            u32::from_str_radix(mode_field, 8)
                .map_err(|e| PpaError::ParseError(format!("parsing ar entry mode: {}", e)))?
        };

        self.remaining = size;
        self.pad = size % 2;

        Ok(Some(ArHeader {
            name: name.to_string(),
            mtime,
            size,
            mode,
        }))
    }
}

impl<R: Read> Read for ArReader<R> {
    /// Read from the current entry's data, stopping at the entry boundary.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let limit = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n as u64;

        Ok(n)
    }
}

/// A writer of `ar` archives.
pub struct ArWriter<W: Write> {
    inner: W,
}

impl<W: Write> ArWriter<W> {
    /// Construct a writer, emitting the global archive magic.
    pub fn new(mut inner: W) -> std::io::Result<Self> {
        inner.write_all(GLOBAL_MAGIC)?;

        Ok(Self { inner })
    }

    /// Write a complete entry: header, data, and pad byte if needed.
    pub fn append(&mut self, header: &ArHeader, data: &[u8]) -> std::io::Result<()> {
        let mut buf = [b' '; HEADER_SIZE];

        let write_field = |buf: &mut [u8; HEADER_SIZE], offset: usize, width: usize, s: &str| {
            let bytes = s.as_bytes();
            let len = std::cmp::min(bytes.len(), width);
            buf[offset..offset + len].copy_from_slice(&bytes[..len]);
        };

        write_field(&mut buf, 0, 16, &header.name);
        write_field(&mut buf, 16, 12, &format!("{}", header.mtime));
        write_field(&mut buf, 28, 6, "0");
        write_field(&mut buf, 34, 6, "0");
        write_field(&mut buf, 40, 8, &format!("{:o}", header.mode));
        write_field(&mut buf, 48, 10, &format!("{}", data.len()));
        buf[58] = b'`';
        buf[59] = b'\n';

        self.inner.write_all(&buf)?;
        self.inner.write_all(data)?;
        if data.len() % 2 == 1 {
            self.inner.write_all(b"\n")?;
        }

        Ok(())
    }

    /// Consume the writer, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
