//! Field name sanitization for MongoDB compatibility.
//!
//! MongoDB restricts field names from containing certain characters like dots and
//! dollar signs, which are used in its query syntax. Stored documents have their keys
//! escaped on the way in and restored on the way out. Values are never touched, so
//! filters on string values keep working.

use bson::{Bson, Document};

/// Escapes and restores document keys to handle MongoDB field name restrictions.
///
/// MongoDB does not allow field names (document keys) to contain:
/// - Dots (`.`) - used for nested field access in queries
/// - Dollar signs (`$`) - used for operators in queries
/// - Null bytes (`\0`) - field name terminators
pub(crate) struct ValueSanitizer;

impl ValueSanitizer {
    /// Character replacements for sanitization
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Recursively escapes the keys of a document and of every nested document.
    pub(crate) fn sanitize_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(k, v)| (Self::sanitize_string(k), Self::sanitize_value(v)))
            .collect()
    }

    fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            _ => value.clone(),
        }
    }

    /// Sanitizes a string by replacing problematic characters with safe escaped versions.
    pub(crate) fn sanitize_string(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Recursively restores the keys of a document, reverting [`Self::sanitize_document`].
    pub(crate) fn restore_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(k, v)| (Self::restore_string(k), Self::restore_value(v)))
            .collect()
    }

    fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            _ => value.clone(),
        }
    }

    /// Restores a string by reverting sanitization escapes.
    pub(crate) fn restore_string(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn keys_are_escaped_and_values_kept() {
        let document = doc! { "a.b": "x.y", "nested": { "$k": 1 }, "list": [{ "c.d": 2 }] };
        let sanitized = ValueSanitizer::sanitize_document(&document);

        assert_eq!(
            sanitized,
            doc! {
                "a__dot__b": "x.y",
                "nested": { "__dollar__k": 1 },
                "list": [{ "c__dot__d": 2 }],
            }
        );
        assert_eq!(ValueSanitizer::restore_document(&sanitized), document);
    }
}
