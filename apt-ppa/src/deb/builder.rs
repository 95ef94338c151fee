// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create `.deb` package files and their components. */

use {
    crate::{
        ar::{ArHeader, ArWriter},
        control::ControlParagraph,
        error::Result,
    },
    flate2::{write::GzEncoder, Compression},
    std::{
        io::{Read, Write},
        time::SystemTime,
    },
};

/// A filesystem entry to include in a `.deb` data archive.
///
/// Exactly one of regular file (has a body), directory, or symlink applies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DebEntry {
    /// Absolute POSIX path inside the installed image (e.g. `/opt/Postman/Postman`).
    pub path: String,
    /// File content. `None` for directories and symlinks.
    pub body: Option<Vec<u8>>,
    /// Permission bits (e.g. `0o755`).
    pub mode: u32,
    /// Marks directory entries.
    pub is_dir: bool,
    /// Set for symlinks.
    pub link_target: Option<String>,
}

impl DebEntry {
    /// Construct a regular file entry.
    pub fn file(path: impl ToString, body: Vec<u8>, mode: u32) -> Self {
        Self {
            path: path.to_string(),
            body: Some(body),
            mode,
            is_dir: false,
            link_target: None,
        }
    }

    /// Construct a directory entry.
    pub fn dir(path: impl ToString, mode: u32) -> Self {
        Self {
            path: path.to_string(),
            body: None,
            mode,
            is_dir: true,
            link_target: None,
        }
    }

    /// Construct a symlink entry.
    pub fn symlink(path: impl ToString, target: impl ToString, mode: u32) -> Self {
        Self {
            path: path.to_string(),
            body: None,
            mode,
            is_dir: false,
            link_target: Some(target.to_string()),
        }
    }
}

/// A builder for a `.deb` package file.
///
/// Produces an `ar` archive with exactly three members, in order:
/// `debian-binary`, `control.tar.gz`, and `data.tar.gz`.
///
/// Output is deterministic for a given control paragraph and entry set,
/// except for the `ar` member modification times; pin those with
/// [Self::set_mtime] when byte-for-byte reproducibility matters.
pub struct DebBuilder<'a> {
    control: ControlParagraph<'a>,
    entries: Vec<DebEntry>,
    mtime: Option<SystemTime>,
}

impl<'a> DebBuilder<'a> {
    /// Construct a new instance from a control paragraph.
    pub fn new(control: ControlParagraph<'a>) -> Self {
        Self {
            control,
            entries: vec![],
            mtime: None,
        }
    }

    /// Set the modification time stamped on `ar` members.
    ///
    /// If not called, the current time is used.
    pub fn set_mtime(mut self, time: Option<SystemTime>) -> Self {
        self.mtime = time;
        self
    }

    /// Register a filesystem entry to install as part of the package.
    pub fn add_entry(mut self, entry: DebEntry) -> Self {
        self.entries.push(entry);
        self
    }

    fn mtime(&self) -> u64 {
        self.mtime
            .unwrap_or_else(SystemTime::now)
            .duration_since(std::time::UNIX_EPOCH)
            .expect("times before UNIX epoch not accepted")
            .as_secs()
    }

    /// Produce the `.deb` archive bytes.
    pub fn build(&self) -> Result<Vec<u8>> {
        let control_tar = self.build_control_tar()?;
        let data_tar = self.build_data_tar()?;

        let mtime = self.mtime();
        let mut writer = ArWriter::new(Vec::new())?;

        writer.append(&ArHeader::new("debian-binary", mtime, 0o100644), b"2.0\n")?;
        writer.append(&ArHeader::new("control.tar.gz", mtime, 0o100644), &control_tar)?;
        writer.append(&ArHeader::new("data.tar.gz", mtime, 0o100644), &data_tar)?;

        Ok(writer.into_inner())
    }

    fn build_control_tar(&self) -> Result<Vec<u8>> {
        let mut control_data = Vec::new();
        self.control.write(&mut control_data)?;

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

        let mut header = new_tar_header(0o644, control_data.len() as u64);
        set_header_name(&mut builder, &mut header, "./control")?;
        header.set_cksum();
        builder.append(&header, control_data.as_slice())?;

        Ok(builder.into_inner()?.finish()?)
    }

    fn build_data_tar(&self) -> Result<Vec<u8>> {
        // Sort so parent directories precede their children.
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

        for entry in &entries {
            // Debian archives in the wild use member names beginning with
            // `./`, so `/opt/x` becomes `./opt/x`.
            let name = if entry.path.starts_with('/') {
                format!(".{}", entry.path)
            } else {
                format!("./{}", entry.path)
            };

            if entry.is_dir {
                let mut header = new_tar_header(entry.mode, 0);
                header.set_entry_type(tar::EntryType::Directory);
                set_header_name(&mut builder, &mut header, &format!("{}/", name))?;
                header.set_cksum();
                builder.append(&header, std::io::empty())?;
            } else if let Some(target) = &entry.link_target {
                let mut header = new_tar_header(entry.mode, 0);
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_link_name(target)?;
                set_header_name(&mut builder, &mut header, &name)?;
                header.set_cksum();
                builder.append(&header, std::io::empty())?;
            } else {
                let body = entry.body.as_deref().unwrap_or_default();
                let mut header = new_tar_header(entry.mode, body.len() as u64);
                set_header_name(&mut builder, &mut header, &name)?;
                header.set_cksum();
                builder.append(&header, body)?;
            }
        }

        Ok(builder.into_inner()?.finish()?)
    }
}

fn new_tar_header(mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_mode(mode);
    header.set_size(size);

    header
}

fn set_header_name(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    name: &str,
) -> Result<()> {
    // `tar::Header::set_path` normalizes a leading `./` away on anything
    // except the root directory, so the name field is written directly.
    let value_bytes = name.as_bytes();
    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Long names require a GNU `@LongLink` extension entry carrying the
        // full name, followed by the real header with a truncated name.
        let mut longlink_header = tar::Header::new_gnu();
        let longlink = b"././@LongLink";
        longlink_header.as_old_mut().name[..longlink.len()].copy_from_slice(longlink);
        longlink_header.set_mode(0o644);
        longlink_header.set_uid(0);
        longlink_header.set_gid(0);
        longlink_header.set_mtime(0);
        longlink_header.set_size(value_bytes.len() as u64 + 1);
        longlink_header.set_entry_type(tar::EntryType::new(b'L'));
        longlink_header.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&longlink_header, &mut data)?;

        let truncated = &value_bytes[..name_buffer.len()];
        name_buffer.copy_from_slice(truncated);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{ar::ArReader, deb::parse_deb_control},
        std::io::Cursor,
    };

    fn sample_control() -> ControlParagraph<'static> {
        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package".into(), "postman".into());
        control.set_field_from_string("Version".into(), "11.0.0".into());
        control.set_field_from_string("Architecture".into(), "amd64".into());
        control.set_field_from_string(
            "Description".into(),
            "API platform\n Unofficial repackaging of the upstream build.".into(),
        );

        control
    }

    #[test]
    fn member_order_and_names() -> Result<()> {
        let deb = DebBuilder::new(sample_control())
            .set_mtime(Some(std::time::UNIX_EPOCH))
            .build()?;

        let mut reader = ArReader::new(Cursor::new(deb))?;
        assert_eq!(reader.next_entry()?.unwrap().name(), "debian-binary");
        assert_eq!(reader.next_entry()?.unwrap().name(), "control.tar.gz");
        assert_eq!(reader.next_entry()?.unwrap().name(), "data.tar.gz");
        assert!(reader.next_entry()?.is_none());

        Ok(())
    }

    #[test]
    fn control_round_trips_through_parser() -> Result<()> {
        let control = sample_control();
        let deb = DebBuilder::new(control.clone())
            .add_entry(DebEntry::file("/usr/bin/postman", vec![42], 0o755))
            .build()?;

        let parsed = parse_deb_control(Cursor::new(deb))?;

        let original = control.iter_fields().collect::<Vec<_>>();
        let reparsed = parsed.iter_fields().collect::<Vec<_>>();
        assert_eq!(original, reparsed);

        Ok(())
    }

    #[test]
    fn data_tar_entries_sorted_with_types() -> Result<()> {
        let deb = DebBuilder::new(sample_control())
            .set_mtime(Some(std::time::UNIX_EPOCH))
            .add_entry(DebEntry::symlink("/usr/bin/postman", "/opt/Postman/Postman", 0o777))
            .add_entry(DebEntry::dir("/opt", 0o755))
            .add_entry(DebEntry::file("/opt/Postman/Postman", b"binary".to_vec(), 0o755))
            .add_entry(DebEntry::dir("/opt/Postman", 0o755))
            .build()?;

        let mut reader = ArReader::new(Cursor::new(deb))?;
        while let Some(header) = reader.next_entry()? {
            if header.name() != "data.tar.gz" {
                continue;
            }

            let mut gz = Vec::new();
            reader.read_to_end(&mut gz).unwrap();

            let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(Cursor::new(gz)));
            let mut seen = Vec::new();
            for entry in archive.entries()? {
                let entry = entry?;
                seen.push((
                    entry.path()?.to_string_lossy().to_string(),
                    entry.header().entry_type(),
                ));
            }

            assert_eq!(
                seen,
                vec![
                    ("./opt/".to_string(), tar::EntryType::Directory),
                    ("./opt/Postman/".to_string(), tar::EntryType::Directory),
                    ("./opt/Postman/Postman".to_string(), tar::EntryType::Regular),
                    ("./usr/bin/postman".to_string(), tar::EntryType::Symlink),
                ]
            );

            return Ok(());
        }

        panic!("data.tar.gz member not found");
    }

    #[test]
    fn long_path_uses_longlink_extension() -> Result<()> {
        let long_path = format!("/opt/{}.txt", "x".repeat(200));
        let deb = DebBuilder::new(sample_control())
            .set_mtime(Some(std::time::UNIX_EPOCH))
            .add_entry(DebEntry::file(&long_path, vec![1], 0o644))
            .build()?;

        let mut reader = ArReader::new(Cursor::new(deb))?;
        while let Some(header) = reader.next_entry()? {
            if header.name() != "data.tar.gz" {
                continue;
            }

            let mut gz = Vec::new();
            reader.read_to_end(&mut gz).unwrap();

            let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(Cursor::new(gz)));
            let entry = archive.entries()?.next().unwrap()?;
            assert_eq!(
                entry.path()?.to_string_lossy(),
                format!("./opt/{}.txt", "x".repeat(200))
            );

            return Ok(());
        }

        panic!("data.tar.gz member not found");
    }

    #[test]
    fn build_is_deterministic_with_fixed_clock() -> Result<()> {
        let build = || {
            DebBuilder::new(sample_control())
                .set_mtime(Some(std::time::UNIX_EPOCH))
                .add_entry(DebEntry::dir("/opt", 0o755))
                .add_entry(DebEntry::file("/opt/a", b"data".to_vec(), 0o644))
                .build()
        };

        assert_eq!(build()?, build()?);

        Ok(())
    }
}
