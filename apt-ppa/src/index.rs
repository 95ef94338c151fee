// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository index rendering.

Renders the plain-text `Packages` index (one stanza per package), its gzip
companion, and the `Release` manifest with `MD5Sum`/`SHA1`/`SHA256`
sections over the indexed files.
*/

use {
    crate::{
        control::ControlParagraph,
        error::Result,
        io::{MultiContentDigest, MultiDigester},
    },
    chrono::{DateTime, Utc},
    flate2::{write::GzEncoder, Compression},
    std::io::Write,
};

/// Date format used in `Release` files (RFC 1123, UTC).
const RELEASE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// Render the `Packages` stanza describing a single package.
///
/// The stored control fields are emitted verbatim and in order, followed by
/// `Filename`, `Size`, `MD5sum`, `SHA1`, and `SHA256` lines and a
/// terminating blank line.
pub fn render_package_stanza(
    control: &ControlParagraph<'_>,
    filename: &str,
    size: u64,
    digest: &MultiContentDigest,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    control.write(&mut buf)?;
    writeln!(buf, "Filename: {}", filename)?;
    writeln!(buf, "Size: {}", size)?;
    writeln!(buf, "MD5sum: {}", digest.md5.digest_hex())?;
    writeln!(buf, "SHA1: {}", digest.sha1.digest_hex())?;
    writeln!(buf, "SHA256: {}", digest.sha256.digest_hex())?;
    writeln!(buf)?;

    Ok(buf)
}

/// Compose the repository-wide `Packages` index from per-source fragments.
///
/// Fragments are concatenated in ascending lexicographic byte order, which
/// makes the output deterministic for a given fragment set.
pub fn assemble_packages(mut fragments: Vec<Vec<u8>>) -> Vec<u8> {
    fragments.sort();
    fragments.concat()
}

/// Gzip a byte slab.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;

    Ok(encoder.finish()?)
}

/// Size and digests of an indexed repository file, as advertised in `Release`.
#[derive(Clone, Debug)]
pub struct FileHash {
    /// Repository-relative path, starting at `main/...`.
    pub path: String,
    pub size: u64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl FileHash {
    /// Compute the hash record for a file's content.
    pub fn compute(path: impl ToString, data: &[u8]) -> Self {
        let digest = MultiDigester::digest(data);

        Self {
            path: path.to_string(),
            size: data.len() as u64,
            md5: digest.md5.digest_hex(),
            sha1: digest.sha1.digest_hex(),
            sha256: digest.sha256.digest_hex(),
        }
    }
}

/// Render a `Release` manifest.
///
/// The header block is fixed apart from `Origin`, `Label`, and the `Date`
/// stamp; the hash sections list every [FileHash] under `MD5Sum:`, `SHA1:`,
/// and `SHA256:` with the single-space indent APT's parser expects.
pub fn render_release(
    origin: &str,
    label: &str,
    now: DateTime<Utc>,
    files: &[FileHash],
) -> Vec<u8> {
    let mut buf = String::new();

    buf.push_str(&format!("Origin: {}\n", origin));
    buf.push_str(&format!("Label: {}\n", label));
    buf.push_str("Suite: stable\n");
    buf.push_str("Codename: stable\n");
    buf.push_str("Architectures: amd64\n");
    buf.push_str("Components: main\n");
    buf.push_str(&format!("Date: {}\n", now.format(RELEASE_DATE_FORMAT)));

    buf.push_str("MD5Sum:\n");
    for f in files {
        buf.push_str(&format!(" {} {} {}\n", f.md5, f.size, f.path));
    }

    buf.push_str("SHA1:\n");
    for f in files {
        buf.push_str(&format!(" {} {} {}\n", f.sha1, f.size, f.path));
    }

    buf.push_str("SHA256:\n");
    for f in files {
        buf.push_str(&format!(" {} {} {}\n", f.sha256, f.size, f.path));
    }

    buf.into_bytes()
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, std::io::Read};

    fn sample_control() -> ControlParagraph<'static> {
        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package".into(), "discord".into());
        control.set_field_from_string("Version".into(), "1.2.3".into());
        control.set_field_from_string("Architecture".into(), "amd64".into());

        control
    }

    #[test]
    fn stanza_layout() -> Result<()> {
        let digest = MultiDigester::digest(b"payload");
        let stanza = render_package_stanza(
            &sample_control(),
            "pool/d/discord/discord-1.2.3.deb",
            7,
            &digest,
        )?;

        let text = String::from_utf8(stanza).unwrap();
        let expected = format!(
            "Package: discord\nVersion: 1.2.3\nArchitecture: amd64\nFilename: pool/d/discord/discord-1.2.3.deb\nSize: 7\nMD5sum: {}\nSHA1: {}\nSHA256: {}\n\n",
            digest.md5.digest_hex(),
            digest.sha1.digest_hex(),
            digest.sha256.digest_hex(),
        );
        assert_eq!(text, expected);

        Ok(())
    }

    #[test]
    fn fragments_sorted_before_concatenation() {
        let assembled = assemble_packages(vec![
            b"Package: zcli\n\n".to_vec(),
            b"Package: discord\n\n".to_vec(),
        ]);

        assert_eq!(assembled, b"Package: discord\n\nPackage: zcli\n\n");
    }

    #[test]
    fn gzip_round_trips() -> Result<()> {
        let compressed = gzip(b"Packages content")?;

        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        assert_eq!(out, b"Packages content");

        Ok(())
    }

    #[test]
    fn release_layout() {
        let files = vec![
            FileHash::compute("main/binary-amd64/Packages", b"abc"),
            FileHash::compute("main/binary-amd64/Packages.gz", b"abcd"),
        ];
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let release = String::from_utf8(render_release("ppa.example.com", "PPA", now, &files))
            .unwrap();

        assert!(release.starts_with(
            "Origin: ppa.example.com\nLabel: PPA\nSuite: stable\nCodename: stable\nArchitectures: amd64\nComponents: main\nDate: Wed, 01 May 2024 12:00:00 UTC\n"
        ));
        assert!(release.contains(
            "MD5Sum:\n 900150983cd24fb0d6963f7d28e17f72 3 main/binary-amd64/Packages\n"
        ));
        assert!(release.contains("SHA1:\n a9993e364706816aba3e25717850c26c9cd0d89d 3 main/binary-amd64/Packages\n"));
        assert!(release.contains(
            "SHA256:\n ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad 3 main/binary-amd64/Packages\n"
        ));
    }
}
