// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian control file primitives.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

A control *paragraph* is an ordered series of `Key: Value` fields. Values
may span multiple lines; continuation lines begin with a space or tab.
Field order is preserved on read and on write so that re-emitted metadata
is byte-faithful to what was parsed.
*/

use {
    crate::error::{PpaError, Result},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
        ops::Deref,
    },
};

/// A field in a control paragraph.
///
/// Multi-line values are stored with their embedded newlines and the
/// leading whitespace of each continuation line, so writing a field back
/// out reproduces the original formatting.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The value of this field, including any embedded newlines.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields. Field names are
/// case insensitive on read and case preserving on write. A paragraph can
/// only contain a single occurrence of a field; this is enforced through
/// the mutation APIs.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// If a field with the same name (case insensitive compare) already
    /// exists, the old value is replaced by the incoming value.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        self.fields
            .retain(|cf| !cf.name.eq_ignore_ascii_case(&field.name));
        self.fields.push(field);
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name.
    pub fn field(&self, name: &str) -> Option<&'_ ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field but no
    /// paragraph-terminating blank line is emitted; callers serializing
    /// multiple paragraphs must write that separator themselves.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

/// Holds parsing state for control paragraphs.
///
/// Instances are fed lines of text and emit a [ControlParagraph] when a
/// blank line (or end of input, via [Self::finish]) completes one.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph is
    /// returned. Otherwise `Ok(None)` is returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with(' ') || line.starts_with('\t');

        let current_field = self.field.take();

        // Empty lines signify the end of a paragraph. Flush any state.
        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                let para = std::mem::take(&mut self.paragraph);
                Some(para)
            });
        }

        match (current_field, is_continuation) {
            // A field is on the stack and an unindented line arrived. This
            // is the beginning of a new field; flush the current one.
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.to_string());

                Ok(None)
            }

            // No field is in progress, so this line starts a new one.
            (None, _) => {
                self.field = Some(line.to_string());

                Ok(None)
            }

            // Indented line: a value continuation of the current field.
            (Some(v), true) => {
                self.field = Some(v + line);

                Ok(None)
            }
        }
    }

    /// Finish parsing, consuming self.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let mut parts = v.splitn(2, ':');

        let name = parts.next().ok_or_else(|| {
            PpaError::ControlParseError(format!("error parsing line '{}'; missing colon", v))
        })?;
        let value = parts
            .next()
            .ok_or_else(|| {
                PpaError::ControlParseError(format!(
                    "error parsing field '{}'; could not detect value",
                    v
                ))
            })?
            .trim();

        self.paragraph
            .set_field_from_string(Cow::Owned(name.to_string()), Cow::Owned(value.to_string()));

        Ok(())
    }
}

/// A reader of [ControlParagraph] from a buffered source.
///
/// Instances can be consumed as an iterator. Each iteration attempts to
/// read a full paragraph from the underlying reader.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph<'static>>> {
        let mut parser = self.parser.take().unwrap_or_default();

        loop {
            let mut line = String::new();

            let bytes_read = self.reader.read_line(&mut line)?;

            if bytes_read != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
                // Continue reading.
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.parser.is_none() {
            None
        } else {
            match self.get_next() {
                Ok(Some(para)) => Some(Ok(para)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }
    }
}

/// A Debian binary package control paragraph.
///
/// Thin wrapper around [ControlParagraph] adding accessors for the
/// well-known binary package fields. [Deref] exposes the inner paragraph.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BinaryPackageControl<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> Deref for BinaryPackageControl<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> From<ControlParagraph<'a>> for BinaryPackageControl<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> BinaryPackageControl<'a> {
    /// Obtain a handle on the inner paragraph.
    pub fn paragraph(&self) -> &ControlParagraph<'a> {
        &self.paragraph
    }

    /// Obtain a mutable handle on the inner paragraph.
    pub fn paragraph_mut(&mut self) -> &mut ControlParagraph<'a> {
        &mut self.paragraph
    }

    fn required_field_str(&self, name: &'static str) -> Result<&str> {
        self.field_str(name)
            .ok_or_else(|| PpaError::InvalidControl(format!("{} field not found", name)))
    }

    /// The `Package` field value.
    pub fn package(&self) -> Result<&str> {
        self.required_field_str("Package")
    }

    /// The `Version` field value.
    pub fn version(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> Option<&str> {
        self.field_str("Architecture")
    }

    /// The `Maintainer` field.
    pub fn maintainer(&self) -> Option<&str> {
        self.field_str("Maintainer")
    }

    /// The `Description` field.
    pub fn description(&self) -> Option<&str> {
        self.field_str("Description")
    }

    /// The `Depends` field.
    pub fn depends(&self) -> Option<&str> {
        self.field_str("Depends")
    }

    /// The `Section` field.
    pub fn section(&self) -> Option<&str> {
        self.field_str("Section")
    }

    /// The `Priority` field.
    pub fn priority(&self) -> Option<&str> {
        self.field_str("Priority")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_set_semantics() {
        let mut p = ControlParagraph::default();

        // Same cased field name results in overwrite.
        p.set_field_from_string("foo".into(), "bar".into());
        p.set_field_from_string("foo".into(), "baz".into());
        assert_eq!(p.field_str("foo"), Some("baz"));

        // Different case also results in overwrite.
        p.set_field_from_string("FOO".into(), "bar".into());
        assert_eq!(p.field_str("foo"), Some("bar"));
        assert_eq!(p.field_str("FOO"), Some("bar"));
    }

    #[test]
    fn parse_simple_paragraph() -> Result<()> {
        let raw = "Package: discord\nVersion: 0.0.1\nArchitecture: amd64\n";

        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(raw))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(paragraphs.len(), 1);
        let p = &paragraphs[0];
        assert_eq!(p.iter_fields().count(), 3);
        assert_eq!(p.field_str("Package"), Some("discord"));
        assert_eq!(p.field_str("Version"), Some("0.0.1"));

        Ok(())
    }

    #[test]
    fn parse_continuation_lines() -> Result<()> {
        let raw = "Package: discord\nDescription: chat client\n All-in-one voice and text chat.\n\tIndented with a tab.\n";

        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(raw))
            .collect::<Result<Vec<_>>>()?;

        let p = &paragraphs[0];
        assert_eq!(
            p.field_str("Description"),
            Some("chat client\n All-in-one voice and text chat.\n\tIndented with a tab.")
        );

        Ok(())
    }

    #[test]
    fn parse_stops_at_blank_line() -> Result<()> {
        let raw = "Package: a\n\nPackage: b\n";

        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(raw))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].field_str("Package"), Some("a"));
        assert_eq!(paragraphs[1].field_str("Package"), Some("b"));

        Ok(())
    }

    #[test]
    fn write_preserves_order_and_continuations() -> Result<()> {
        let raw = "Z-Field: last\nA-Field: first\nDescription: summary\n extended line\n";

        let p = ControlParagraphReader::new(std::io::Cursor::new(raw))
            .collect::<Result<Vec<_>>>()?
            .remove(0);

        let mut out = Vec::new();
        p.write(&mut out)?;
        assert_eq!(out, raw.as_bytes());

        Ok(())
    }

    #[test]
    fn binary_control_accessors() -> Result<()> {
        let raw = "Package: zcli\nVersion: 0.9.0\nSection: utils\n";

        let p = ControlParagraphReader::new(std::io::Cursor::new(raw))
            .collect::<Result<Vec<_>>>()?
            .remove(0);
        let control = BinaryPackageControl::from(p);

        assert_eq!(control.package()?, "zcli");
        assert_eq!(control.version()?, "0.9.0");
        assert_eq!(control.section(), Some("utils"));
        assert!(control.maintainer().is_none());

        Ok(())
    }
}
