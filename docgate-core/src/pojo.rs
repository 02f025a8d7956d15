//! Conversion of store documents into plain data handed to callers.
//!
//! Plain data carries every stored field plus an `id` alias of `_id`, so clients that expect
//! either spelling see the same identifier. The alias always mirrors `_id`; a stored field named
//! `id` is shadowed by it.

use bson::{Bson, Document};

/// Field holding the store identifier.
pub const ID_FIELD: &str = "_id";
/// Alias of [`ID_FIELD`] added to plain data.
pub const ID_ALIAS: &str = "id";

/// Converts a value into its plain-data form.
pub trait ToPojo {
    type Output;

    fn to_pojo(&self) -> Self::Output;
}

impl ToPojo for Document {
    type Output = Document;

    fn to_pojo(&self) -> Document {
        to_pojo(self)
    }
}

impl ToPojo for [Document] {
    type Output = Vec<Document>;

    fn to_pojo(&self) -> Vec<Document> {
        self.iter().map(to_pojo).collect()
    }
}

impl<T: ToPojo> ToPojo for Option<T> {
    type Output = Option<T::Output>;

    fn to_pojo(&self) -> Self::Output {
        self.as_ref().map(ToPojo::to_pojo)
    }
}

/// Returns a copy of `document` with the `id` alias set from `_id`.
///
/// A document without `_id` is copied unchanged.
pub fn to_pojo(document: &Document) -> Document {
    let mut plain = document.clone();

    if let Some(id) = document.get(ID_FIELD) {
        plain.insert(ID_ALIAS, pojo_id(id));
    }

    plain
}

fn pojo_id(id: &Bson) -> Bson {
    match id {
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        other => other.clone(),
    }
}
