// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.
*/

use {
    crate::error::{DebpkgError, Result},
    std::{
        borrow::Cow,
        fmt::{Display, Formatter},
        io::Write,
    },
};

/// A field in a control file.
///
/// Values of multiline fields retain their continuation lines verbatim,
/// including the leading space of each continuation line.
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

    /// Construct an instance from an iterable of lines.
    ///
    /// The first line is the field value proper. Each subsequent line becomes a
    /// continuation line. Empty continuation lines are encoded as ` .`.
    pub fn from_lines(name: Cow<'a, str>, lines: impl Iterator<Item = String>) -> Self {
        let value = lines
            .enumerate()
            .map(|(i, line)| match (i, line.trim().is_empty()) {
                (0, _) => line,
                (_, true) => " .".to_string(),
                (_, false) => format!(" {}", line),
            })
            .collect::<Vec<_>>()
            .join("\n")
            .into();

        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Obtain the value as a [&str].
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_ref().as_bytes())?;
        writer.write_all(b"\n")
    }
}

impl<'a> Display for ControlField<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {}", self.name, self.value)
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
/// Paragraphs can only contain a single occurrence of a field.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Parse text holding exactly one paragraph.
    pub fn parse_single(text: &str) -> Result<ControlParagraph<'static>> {
        let mut parser = ControlFileParser::default();
        let mut paragraphs = vec![];

        for line in text.lines() {
            if let Some(paragraph) = parser.write_line(line)? {
                paragraphs.push(paragraph);
            }
        }
        if let Some(paragraph) = parser.finish()? {
            paragraphs.push(paragraph);
        }

        match paragraphs.len() {
            1 => Ok(paragraphs.remove(0)),
            0 => Err(DebpkgError::ControlParse("no paragraph found".into())),
            count => Err(DebpkgError::ControlParse(format!(
                "expected 1 paragraph; found {}",
                count
            ))),
        }
    }

    /// Whether the paragraph is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field.
    ///
    /// If a field with the same name (case insensitive compare) already exists,
    /// it is replaced in place, retaining its position.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        match self
            .fields
            .iter_mut()
            .find(|cf| cf.name.eq_ignore_ascii_case(&field.name))
        {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Set a field only if it is not already present.
    pub fn set_field_if_missing(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        if !self.has_field(&name) {
            self.fields.push(ControlField::new(name, value));
        }
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&'_ ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the value of a field that must be present.
    pub fn required_field_str(&self, name: &'static str) -> Result<&str> {
        self.field_str(name)
            .ok_or(DebpkgError::ControlRequiredFieldMissing(name))
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. No blank
    /// line terminates the paragraph.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl<'a> Display for ControlParagraph<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            write!(f, "{}", field)?;
        }

        Ok(())
    }
}

/// Holds parsing state for Debian control files.
///
/// Instances of this type are fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph will be returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with(|c: char| c == ' ' || c == '\t') && !is_empty_line;

        let current_field = self.field.take();

        // Empty lines signify the end of a paragraph.
        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_continuation) {
            (Some(field), true) => {
                self.field = Some(format!("{}\n{}", field, line));
            }
            (None, true) => {
                return Err(DebpkgError::ControlParse(format!(
                    "continuation line without a field: {:?}",
                    line
                )));
            }
            (Some(field), false) => {
                self.flush_field(field)?;
                self.field = Some(line.to_string());
            }
            (None, false) => {
                self.field = Some(line.to_string());
            }
        }

        Ok(None)
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
        let (name, value) = v.split_once(':').ok_or_else(|| {
            DebpkgError::ControlParse(format!("error parsing line '{}'; missing colon", v))
        })?;

        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(DebpkgError::ControlParse(format!(
                "invalid field name: {:?}",
                name
            )));
        }

        if self.paragraph.has_field(name) {
            return Err(DebpkgError::ControlParse(format!(
                "duplicate field: {}",
                name
            )));
        }

        self.paragraph.set_field_from_string(
            Cow::Owned(name.to_string()),
            Cow::Owned(value.trim().to_string()),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn parse_and_write_roundtrip() -> Result<()> {
        let text = indoc! {"
            Package: sample-config-pkg
            Version: 1.0.0
            Architecture: all
            Description: sample package
             This package installs certificates.
             .
             Files are placed under /opt/config/.
        "};

        let para = ControlParagraph::parse_single(text)?;

        assert_eq!(para.field_str("package"), Some("sample-config-pkg"));
        assert_eq!(
            para.field_str("Description"),
            Some("sample package\n This package installs certificates.\n .\n Files are placed under /opt/config/.")
        );

        let mut buffer = vec![];
        para.write(&mut buffer)?;
        assert_eq!(String::from_utf8_lossy(&buffer), text);
        assert_eq!(para.to_string(), text);

        Ok(())
    }

    #[test]
    fn set_field_replaces_in_place() {
        let mut para = ControlParagraph::default();
        para.set_field_from_string("Package".into(), "a".into());
        para.set_field_from_string("Installed-Size".into(), "1".into());
        para.set_field_from_string("Version".into(), "1.0".into());
        para.set_field_from_string("installed-size".into(), "7".into());

        assert_eq!(para.to_string(), "Package: a\ninstalled-size: 7\nVersion: 1.0\n");

        para.set_field_if_missing("Package".into(), "b".into());
        assert_eq!(para.field_str("Package"), Some("a"));
    }

    #[test]
    fn from_lines() {
        let field = ControlField::from_lines(
            "Description".into(),
            vec!["short".to_string(), "long one".to_string(), "".to_string(), "two".to_string()]
                .into_iter(),
        );

        assert_eq!(field.value_str(), "short\n long one\n .\n two");
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            ControlParagraph::parse_single(""),
            Err(DebpkgError::ControlParse(_))
        ));
        assert!(matches!(
            ControlParagraph::parse_single("Package: a\n\nPackage: b\n"),
            Err(DebpkgError::ControlParse(_))
        ));
        assert!(matches!(
            ControlParagraph::parse_single("Package a\n"),
            Err(DebpkgError::ControlParse(_))
        ));
        assert!(matches!(
            ControlParagraph::parse_single(" leading\n"),
            Err(DebpkgError::ControlParse(_))
        ));
        assert!(matches!(
            ControlParagraph::parse_single("Package: a\npackage: b\n"),
            Err(DebpkgError::ControlParse(_))
        ));
    }

    #[test]
    fn required_field() {
        let para = ControlParagraph::parse_single("Package: a\n").unwrap();

        assert_eq!(para.required_field_str("Package").unwrap(), "a");
        assert!(matches!(
            para.required_field_str("Version"),
            Err(DebpkgError::ControlRequiredFieldMissing("Version"))
        ));
    }
}
