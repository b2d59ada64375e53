// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Debian control file fields.
//!
//! See https://www.debian.org/doc/debian-policy/ch-controlfields.html
//! for the canonical source of truth for how control files work.

use {
    crate::{DebError, Result},
    std::collections::HashMap,
    std::io::Write,
};

/// Width used when text-wrapping folded field values.
const WRAP_WIDTH: usize = 70;

/// Schema of a control file field: name, whether it is mandatory,
/// whether its value is text-wrapped, and an optional default.
pub struct FieldSpec {
    pub name: &'static str,
    pub mandatory: bool,
    pub wrap: bool,
    pub default: Option<&'static str>,
}

const fn field(
    name: &'static str,
    mandatory: bool,
    wrap: bool,
    default: Option<&'static str>,
) -> FieldSpec {
    FieldSpec {
        name,
        mandatory,
        wrap,
        default,
    }
}

/// The control file schema, in emission order.
pub const DEBIAN_FIELDS: &[FieldSpec] = &[
    field("Package", true, false, None),
    field("Version", true, false, None),
    field("Section", false, false, Some("contrib/devel")),
    field("Priority", false, false, Some("optional")),
    field("Architecture", false, false, Some("all")),
    field("Depends", false, true, None),
    field("Recommends", false, true, None),
    field("Replaces", false, true, None),
    field("Suggests", false, true, None),
    field("Enhances", false, true, None),
    field("Conflicts", false, true, None),
    field("Breaks", false, true, None),
    field("Pre-Depends", false, true, None),
    field("Installed-Size", false, false, None),
    field("Maintainer", true, false, None),
    field("Description", true, true, None),
    field("Homepage", false, false, None),
    field("Built-Using", false, false, None),
    field("Distribution", false, false, Some("unstable")),
    field("Urgency", false, false, Some("medium")),
];

/// A control field value: a single string or a comma-joined list.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Single(String),
    List(Vec<String>),
}

impl FieldValue {
    fn is_empty(&self) -> bool {
        match self {
            Self::Single(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::List(l) => l.join(", "),
        }
    }
}

/// An ordered set of control fields following [DEBIAN_FIELDS].
#[derive(Clone, Debug, Default)]
pub struct ControlFields {
    values: HashMap<&'static str, FieldValue>,
}

impl ControlFields {
    /// Construct a field set with the schema defaults populated.
    pub fn new() -> Self {
        let mut values = HashMap::new();
        for spec in DEBIAN_FIELDS {
            if let Some(default) = spec.default {
                values.insert(spec.name, FieldValue::Single(default.to_string()));
            }
        }

        Self { values }
    }

    fn spec(name: &str) -> Result<&'static FieldSpec> {
        DEBIAN_FIELDS
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| DebError::UnknownControlField(name.to_string()))
    }

    /// Set a single-valued field. Unknown fields are rejected.
    pub fn set(&mut self, name: &str, value: impl ToString) -> Result<&mut Self> {
        let spec = Self::spec(name)?;
        self.values
            .insert(spec.name, FieldValue::Single(value.to_string()));
        Ok(self)
    }

    /// Set a list-valued field, joined with `", "` on render.
    pub fn set_list(&mut self, name: &str, values: Vec<String>) -> Result<&mut Self> {
        let spec = Self::spec(name)?;
        self.values.insert(spec.name, FieldValue::List(values));
        Ok(self)
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Render the control file body.
    ///
    /// A field is emitted iff it is mandatory or has a non-empty value.
    /// Missing mandatory fields are an error.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();

        for spec in DEBIAN_FIELDS {
            let value = self.values.get(spec.name);

            if spec.mandatory {
                let value = value
                    .filter(|v| !v.is_empty())
                    .ok_or(DebError::MissingControlField(spec.name))?;
                out.push_str(&make_control_field(spec.name, &value.render(), spec.wrap));
            } else if let Some(value) = value {
                if !value.is_empty() {
                    out.push_str(&make_control_field(spec.name, &value.render(), spec.wrap));
                }
            }
        }

        Ok(out)
    }

    /// Render the control file to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.render()?.as_bytes())?;
        Ok(())
    }
}

/// Render a single control field line.
///
/// Embedded newlines become continuation lines (a leading space on each
/// following line). Wrapped fields are re-flowed to [WRAP_WIDTH]
/// without breaking words or hyphens.
pub fn make_control_field(name: &str, value: &str, wrap: bool) -> String {
    let mut result = format!("{}: ", name);

    if wrap {
        result.push_str(&value.split('\n').collect::<Vec<_>>().join(" "));
        result = fill(&result, WRAP_WIDTH);
    } else {
        result.push_str(value);
    }

    format!("{}\n", result.replace('\n', "\n "))
}

/// Greedy text fill that never splits a word.
fn fill(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ControlFields {
        let mut fields = ControlFields::new();
        fields.set("Package", "fizzbuzz").unwrap();
        fields.set("Version", "1").unwrap();
        fields.set("Maintainer", "x").unwrap();
        fields.set("Description", "y").unwrap();
        fields
    }

    #[test]
    fn test_mandatory_and_defaults() -> Result<()> {
        let rendered = minimal().render()?;

        assert!(rendered.contains("Package: fizzbuzz\n"));
        assert!(rendered.contains("Version: 1\n"));
        assert!(rendered.contains("Section: contrib/devel\n"));
        assert!(rendered.contains("Priority: optional\n"));
        assert!(rendered.contains("Architecture: all\n"));
        assert!(rendered.contains("Distribution: unstable\n"));
        assert!(rendered.contains("Urgency: medium\n"));

        // Optional fields with no value do not appear.
        assert!(!rendered.contains("Homepage:"));
        assert!(!rendered.contains("Depends:"));

        Ok(())
    }

    #[test]
    fn test_field_order_follows_schema() -> Result<()> {
        let rendered = minimal().render()?;
        let package = rendered.find("Package:").unwrap();
        let version = rendered.find("Version:").unwrap();
        let maintainer = rendered.find("Maintainer:").unwrap();
        assert!(package < version && version < maintainer);

        Ok(())
    }

    #[test]
    fn test_missing_mandatory_field() {
        let mut fields = ControlFields::new();
        fields.set("Package", "p").unwrap();

        assert!(matches!(
            fields.render(),
            Err(DebError::MissingControlField("Version"))
        ));
    }

    #[test]
    fn test_list_field_join() -> Result<()> {
        let mut fields = minimal();
        fields.set_list(
            "Depends",
            vec!["libc6 (>= 2.2.1)".to_string(), "python3".to_string()],
        )?;

        assert!(fields
            .render()?
            .contains("Depends: libc6 (>= 2.2.1), python3\n"));

        Ok(())
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut fields = ControlFields::new();
        assert!(matches!(
            fields.set("X-Unknown", "v"),
            Err(DebError::UnknownControlField(_))
        ));
    }

    #[test]
    fn test_multiline_continuation() {
        let rendered = make_control_field("Description", "summary\nlonger detail", false);
        assert_eq!(rendered, "Description: summary\n longer detail\n");
    }

    #[test]
    fn test_wrap_does_not_break_words() {
        let long_word = "a".repeat(100);
        let rendered = make_control_field("Description", &long_word, true);
        assert_eq!(rendered, format!("Description: {}\n", long_word));

        let many = (0..20).map(|i| format!("word{}", i)).collect::<Vec<_>>();
        let rendered = make_control_field("Description", &many.join(" "), true);
        for line in rendered.lines() {
            assert!(line.len() <= WRAP_WIDTH);
        }
        // Continuation lines carry the leading space.
        assert!(rendered.lines().skip(1).all(|l| l.starts_with(' ')));
    }
}
