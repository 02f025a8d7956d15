//! JSON-Patch (RFC 6902) over BSON documents.
//!
//! Paths are JSON Pointers (RFC 6901). The document root cannot be replaced and the `_id`
//! field can never be the target of a patch.

use bson::{Bson, Document};
use thiserror::Error;

/// Errors raised while parsing or applying patch operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    /// The operation document is not a valid patch operation.
    #[error("Malformed patch operation: {0}")]
    Malformed(String),
    /// The path is not a valid JSON Pointer.
    #[error("Invalid pointer: {0}")]
    InvalidPointer(String),
    /// The path does not resolve to a location in the document.
    #[error("Path not found: {0}")]
    PathNotFound(String),
    /// A `test` operation did not match.
    #[error("Test failed at {0}")]
    TestFailed(String),
    /// The path targets a field that cannot be modified.
    #[error("Field cannot be modified: {0}")]
    ImmutableField(String),
}

/// A single JSON-Patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOperation {
    Add { path: String, value: Bson },
    Remove { path: String },
    Replace { path: String, value: Bson },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Bson },
}

impl PatchOperation {
    /// The pointer this operation writes to or checks.
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Move { path, .. }
            | PatchOperation::Copy { path, .. }
            | PatchOperation::Test { path, .. } => path,
        }
    }
}

impl TryFrom<&Document> for PatchOperation {
    type Error = PatchError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let op = document
            .get_str("op")
            .map_err(|_| PatchError::Malformed("missing op".into()))?;
        let string = |name: &str| {
            document
                .get_str(name)
                .map(str::to_string)
                .map_err(|_| PatchError::Malformed(format!("{op} requires a string {name}")))
        };
        let value = || {
            document
                .get("value")
                .cloned()
                .ok_or_else(|| PatchError::Malformed(format!("{op} requires a value")))
        };

        match op {
            "add" => Ok(PatchOperation::Add { path: string("path")?, value: value()? }),
            "remove" => Ok(PatchOperation::Remove { path: string("path")? }),
            "replace" => Ok(PatchOperation::Replace { path: string("path")?, value: value()? }),
            "move" => Ok(PatchOperation::Move { from: string("from")?, path: string("path")? }),
            "copy" => Ok(PatchOperation::Copy { from: string("from")?, path: string("path")? }),
            "test" => Ok(PatchOperation::Test { path: string("path")?, value: value()? }),
            other => Err(PatchError::Malformed(format!("unknown op {other}"))),
        }
    }
}

/// Parses a sequence of patch operations from an array of documents.
pub fn parse_patches(value: &Bson) -> Result<Vec<PatchOperation>, PatchError> {
    match value {
        Bson::Array(operations) => operations
            .iter()
            .map(|operation| match operation {
                Bson::Document(document) => PatchOperation::try_from(document),
                other => Err(PatchError::Malformed(format!("expected a document, got {other}"))),
            })
            .collect(),
        Bson::Document(document) => Ok(vec![PatchOperation::try_from(document)?]),
        other => Err(PatchError::Malformed(format!("expected an array, got {other}"))),
    }
}

/// Applies `patches` in order to a copy of `document`.
///
/// Either every operation applies and the patched copy is returned, or the first failure is
/// returned and `document` is left as it was.
pub fn apply_patches(
    document: &Document,
    patches: &[PatchOperation],
) -> Result<Document, PatchError> {
    let mut root = Bson::Document(document.clone());

    for patch in patches {
        apply_patch(&mut root, patch)?;
    }

    match root {
        Bson::Document(document) => Ok(document),
        other => Err(PatchError::Malformed(format!("patched root is not a document: {other}"))),
    }
}

fn apply_patch(root: &mut Bson, patch: &PatchOperation) -> Result<(), PatchError> {
    match patch {
        PatchOperation::Add { path, value } => {
            let tokens = writable_pointer(path)?;
            add(root, &tokens, value.clone(), path)
        }
        PatchOperation::Remove { path } => {
            let tokens = writable_pointer(path)?;
            remove(root, &tokens, path).map(drop)
        }
        PatchOperation::Replace { path, value } => {
            let tokens = writable_pointer(path)?;
            let target = resolve_mut(root, &tokens, path)?;
            *target = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            let from_tokens = writable_pointer(from)?;
            let tokens = writable_pointer(path)?;
            if tokens.len() > from_tokens.len() && tokens.starts_with(&from_tokens) {
                return Err(PatchError::InvalidPointer(format!("cannot move {from} into {path}")));
            }
            let value = remove(root, &from_tokens, from)?;
            add(root, &tokens, value, path)
        }
        PatchOperation::Copy { from, path } => {
            let value = resolve_mut(root, &parse_pointer(from)?, from)?.clone();
            let tokens = writable_pointer(path)?;
            add(root, &tokens, value, path)
        }
        PatchOperation::Test { path, value } => {
            let actual = resolve_mut(root, &parse_pointer(path)?, path)?;
            if values_equal(actual, value) {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.clone()))
            }
        }
    }
}

fn parse_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }

    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    };

    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Parses a pointer that is about to be written through.
fn writable_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    let tokens = parse_pointer(pointer)?;

    match tokens.first().map(String::as_str) {
        None => Err(PatchError::InvalidPointer("the document root cannot be modified".into())),
        Some("_id") => Err(PatchError::ImmutableField("_id".into())),
        Some(_) => Ok(tokens),
    }
}

fn resolve_mut<'a>(
    root: &'a mut Bson,
    tokens: &[String],
    pointer: &str,
) -> Result<&'a mut Bson, PatchError> {
    let mut current = root;

    for token in tokens {
        current = match current {
            Bson::Document(document) => document
                .get_mut(token)
                .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?,
            Bson::Array(values) => {
                let index = array_index(token, values.len(), pointer)?;
                values
                    .get_mut(index)
                    .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?
            }
            _ => return Err(PatchError::PathNotFound(pointer.to_string())),
        };
    }

    Ok(current)
}

fn array_index(token: &str, len: usize, pointer: &str) -> Result<usize, PatchError> {
    let well_formed = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));

    if !well_formed {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    }

    token
        .parse::<usize>()
        .ok()
        .filter(|index| *index <= len)
        .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))
}

fn add(root: &mut Bson, tokens: &[String], value: Bson, pointer: &str) -> Result<(), PatchError> {
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    };

    match resolve_mut(root, parents, pointer)? {
        Bson::Document(document) => {
            document.insert(last.clone(), value);
            Ok(())
        }
        Bson::Array(values) if last == "-" => {
            values.push(value);
            Ok(())
        }
        Bson::Array(values) => {
            let index = array_index(last, values.len(), pointer)?;
            values.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(pointer.to_string())),
    }
}

fn remove(root: &mut Bson, tokens: &[String], pointer: &str) -> Result<Bson, PatchError> {
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    };

    match resolve_mut(root, parents, pointer)? {
        Bson::Document(document) => document
            .remove(last)
            .ok_or_else(|| PatchError::PathNotFound(pointer.to_string())),
        Bson::Array(values) => {
            let index = array_index(last, values.len(), pointer)?;
            if index < values.len() {
                Ok(values.remove(index))
            } else {
                Err(PatchError::PathNotFound(pointer.to_string()))
            }
        }
        _ => Err(PatchError::PathNotFound(pointer.to_string())),
    }
}

/// Equality where numbers compare by value regardless of their BSON width.
fn values_equal(left: &Bson, right: &Bson) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => match (left, right) {
            (Bson::Array(l), Bson::Array(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(l, r)| values_equal(l, r))
            }
            (Bson::Document(l), Bson::Document(r)) => {
                l.len() == r.len()
                    && l.iter().all(|(key, value)| {
                        r.get(key).is_some_and(|other| values_equal(value, other))
                    })
            }
            _ => left == right,
        },
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
