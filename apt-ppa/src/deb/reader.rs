// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `.deb` file reading functionality. */

use {
    crate::{
        ar::ArReader,
        control::{BinaryPackageControl, ControlParagraphReader},
        error::{PpaError, Result},
    },
    std::io::{BufReader, Read},
};

/// Extract the control paragraph from a `.deb` archive.
///
/// Walks the `ar` stream looking for the `control.tar*` member, decodes it
/// as needed, then parses the `control` tar member as an RFC 822 style
/// field block. Members other than `control.tar*` are skipped without
/// being read.
///
/// Only uncompressed and gzip-compressed control tars are accepted;
/// `.xz` and `.zst` yield [PpaError::UnsupportedCompression]. A control
/// file without a `Package` field yields [PpaError::InvalidControl].
pub fn parse_deb_control<R: Read>(reader: R) -> Result<BinaryPackageControl<'static>> {
    let mut archive = ArReader::new(reader)?;

    loop {
        let header = match archive.next_entry()? {
            Some(header) => header,
            None => break,
        };

        if header.name().starts_with("control.tar") {
            let name = header.name().to_string();
            return parse_control_tar(&mut archive, &name);
        }
    }

    Err(PpaError::InvalidControl(
        "control.tar not found in .deb".into(),
    ))
}

fn parse_control_tar<R: Read>(reader: R, name: &str) -> Result<BinaryPackageControl<'static>> {
    let tar_input: Box<dyn Read> = if name.ends_with(".gz") {
        Box::new(flate2::read::GzDecoder::new(reader))
    } else if name.ends_with(".xz") || name.ends_with(".zst") {
        return Err(PpaError::UnsupportedCompression(name.to_string()));
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(tar_input);

    for entry in archive.entries()? {
        let entry = entry?;

        let path = entry.path()?;
        let member = path.to_string_lossy();
        if member.strip_prefix("./").unwrap_or(&member) != "control" {
            continue;
        }

        return parse_control_file(entry);
    }

    Err(PpaError::InvalidControl(
        "control file not found in control.tar".into(),
    ))
}

fn parse_control_file<R: Read>(reader: R) -> Result<BinaryPackageControl<'static>> {
    let paragraph = ControlParagraphReader::new(BufReader::new(reader))
        .next()
        .transpose()?
        .ok_or_else(|| PpaError::InvalidControl("control file is empty".into()))?;

    let control = BinaryPackageControl::from(paragraph);

    if control.package().map(str::is_empty).unwrap_or(true) {
        return Err(PpaError::InvalidControl(
            "Package field not found in control file".into(),
        ));
    }

    Ok(control)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::ar::{ArHeader, ArWriter},
        std::io::Cursor,
    };

    fn control_tar(control_body: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("./control").unwrap();
        header.set_size(control_body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, control_body).unwrap();
        builder.into_inner().unwrap()
    }

    fn deb_with_member(member_name: &str, member_data: &[u8]) -> Vec<u8> {
        let mut writer = ArWriter::new(Vec::new()).unwrap();
        writer
            .append(&ArHeader::new("debian-binary", 0, 0o100644), b"2.0\n")
            .unwrap();
        writer
            .append(&ArHeader::new(member_name, 0, 0o100644), member_data)
            .unwrap();
        writer.into_inner()
    }

    #[test]
    fn parse_plain_control_tar() -> Result<()> {
        let tar_data = control_tar(b"Package: discord\nVersion: 0.0.1\n");
        let deb = deb_with_member("control.tar", &tar_data);

        let control = parse_deb_control(Cursor::new(deb))?;
        assert_eq!(control.package()?, "discord");
        assert_eq!(control.version()?, "0.0.1");

        Ok(())
    }

    #[test]
    fn parse_gzip_control_tar() -> Result<()> {
        let tar_data = control_tar(b"Package: zcli\nVersion: 1.0\n");
        let gz = crate::index::gzip(&tar_data)?;
        let deb = deb_with_member("control.tar.gz", &gz);

        let control = parse_deb_control(Cursor::new(deb))?;
        assert_eq!(control.package()?, "zcli");

        Ok(())
    }

    #[test]
    fn xz_control_tar_rejected() {
        let deb = deb_with_member("control.tar.xz", b"not really xz");

        assert!(matches!(
            parse_deb_control(Cursor::new(deb)).unwrap_err(),
            PpaError::UnsupportedCompression(name) if name == "control.tar.xz"
        ));
    }

    #[test]
    fn zst_control_tar_rejected() {
        let deb = deb_with_member("control.tar.zst", b"not really zstd");

        assert!(matches!(
            parse_deb_control(Cursor::new(deb)).unwrap_err(),
            PpaError::UnsupportedCompression(_)
        ));
    }

    #[test]
    fn missing_package_field_rejected() {
        let tar_data = control_tar(b"Version: 1.0\n");
        let deb = deb_with_member("control.tar", &tar_data);

        assert!(matches!(
            parse_deb_control(Cursor::new(deb)).unwrap_err(),
            PpaError::InvalidControl(_)
        ));
    }

    #[test]
    fn missing_control_tar_rejected() {
        let mut writer = ArWriter::new(Vec::new()).unwrap();
        writer
            .append(&ArHeader::new("debian-binary", 0, 0o100644), b"2.0\n")
            .unwrap();
        let deb = writer.into_inner();

        assert!(matches!(
            parse_deb_control(Cursor::new(deb)).unwrap_err(),
            PpaError::InvalidControl(_)
        ));
    }

    #[test]
    fn not_an_archive_rejected() {
        assert!(matches!(
            parse_deb_control(Cursor::new(b"garbage".to_vec())).unwrap_err(),
            PpaError::MalformedArchive(_)
        ));
    }
}
