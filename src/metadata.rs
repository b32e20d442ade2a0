//! Sectioned key/value text record used for the `metadata` file.
//!
//! The layout follows the key-file convention readers of the format expect:
//!
//! ```text
//! [global]
//! sigrok version=0.1.0
//!
//! [device 1]
//! capturefile=logic-1
//! total probes=3
//! samplerate=1 MHz
//! total analog=1
//! probe1=D0
//! analog4=A0
//! unitsize=1
//! ```
//!
//! Sections and keys keep insertion order. Setting an existing key replaces
//! its value in place.

use std::fmt::Write as _;

/// Ordered collection of sections, each an ordered list of key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl KeyFile {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string value, creating the section if needed
    pub fn set_string(&mut self, section: &str, key: &str, value: &str) {
        let section = self.section_mut(section);
        match section.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => section.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Set an integer value
    pub fn set_integer<T: std::fmt::Display>(&mut self, section: &str, key: &str, value: T) {
        self.set_string(section, key, &value.to_string());
    }

    /// Look up a value
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Keys of a section in insertion order
    pub fn keys(&self, section: &str) -> Vec<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)
            .map(|s| s.entries.iter().map(|(k, _)| k.as_str()).collect())
            .unwrap_or_default()
    }

    /// Serialize to text
    pub fn to_data(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in &section.entries {
                let _ = writeln!(out, "{key}={}", escape_value(value));
            }
        }
        out
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let pos = match self.sections.iter().position(|s| s.name == name) {
            Some(pos) => pos,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos]
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    // spaces and tabs are only escaped before the first non-whitespace character
    let mut leading = true;
    for c in value.chars() {
        match c {
            ' ' if leading => out.push_str("\\s"),
            '\t' if leading => out.push_str("\\t"),
            ' ' | '\t' => out.push(c),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => {
                out.push_str("\\\\");
                leading = false;
            }
            c => {
                out.push(c);
                leading = false;
            }
        }
    }
    out
}
