mod document;

use proc_macro::TokenStream;

/// Derive macro for implementing the `Document` trait.
///
/// # Usage
///
/// ```ignore
/// use eduhub::Document;
///
/// #[derive(Clone, Serialize, Deserialize, Document)]
/// #[document(collection = "users")]
/// #[serde(rename_all = "camelCase")]
/// struct User {
///     #[document(id)]
///     pub user_id: String,
///     pub email: String,
/// }
/// ```
///
/// The stored key of the id field (`Document::ID_FIELD`) follows the
/// struct's serde naming: a field-level `#[serde(rename = "...")]` wins,
/// then a struct-level `#[serde(rename_all = "...")]`, then the field name.
///
/// Defaults when attributes are omitted:
/// - collection: snake_case struct name + "s"
/// - id: the field named `id`
#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    document::derive_document(input)
}
