use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Field, Fields, LitStr, Token};

pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let collection = extract_collection(input)?;
    let id_field = extract_id_field(input)?;
    let id_ident = id_field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(id_field, "id field must be named"))?;
    let id_key = stored_key(input, id_field)?;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics eduhub::Document for #name #ty_generics #where_clause {
            const COLLECTION: &'static str = #collection;
            const ID_FIELD: &'static str = #id_key;

            fn id(&self) -> &str {
                &self.#id_ident
            }
        }
    })
}

fn extract_collection(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("document") {
            continue;
        }

        let mut collection = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported document attribute, expected `collection`"))
            }
        })?;

        if let Some(c) = collection {
            return Ok(c);
        }
    }

    Ok(format!("{}s", to_snake_case(&input.ident.to_string())))
}

fn extract_id_field(input: &DeriveInput) -> syn::Result<&Field> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Document derive requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Document derive requires a struct with named fields",
            ))
        }
    };

    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("document") {
                continue;
            }
            let mut is_id = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported document field attribute, expected `id`"))
                }
            })?;
            if is_id {
                return Ok(field);
            }
        }
    }

    fields
        .iter()
        .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "id"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                input,
                "Document derive: no field marked with #[document(id)] and no field named `id`",
            )
        })
}

/// Key under which serde stores the field.
fn stored_key(input: &DeriveInput, field: &Field) -> syn::Result<String> {
    if let Some(renamed) = serde_value(&field.attrs, "rename")? {
        return Ok(renamed);
    }

    let raw = field
        .ident
        .as_ref()
        .map(|ident| ident.to_string().trim_start_matches("r#").to_string())
        .unwrap_or_default();

    match serde_value(&input.attrs, "rename_all")?.as_deref() {
        None | Some("snake_case") => Ok(raw),
        Some("camelCase") => Ok(to_camel_case(&raw)),
        Some("lowercase") => Ok(raw.to_lowercase()),
        Some(other) => Err(syn::Error::new_spanned(
            &input.ident,
            format!("Document derive: unsupported serde rename_all = \"{}\"", other),
        )),
    }
}

fn serde_value(attrs: &[Attribute], key: &str) -> syn::Result<Option<String>> {
    let mut found = None;
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) && meta.input.peek(Token![=]) {
                let value: LitStr = meta.value()?.parse()?;
                found = Some(value.value());
            } else if meta.input.peek(Token![=]) {
                let _: syn::Expr = meta.value()?.parse()?;
            } else if meta.input.peek(syn::token::Paren) {
                let _content;
                syn::parenthesized!(_content in meta.input);
            }
            Ok(())
        })?;
    }
    Ok(found)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

fn to_camel_case(s: &str) -> String {
    let mut result = String::new();
    let mut upper_next = false;
    for ch in s.chars() {
        if ch == '_' {
            upper_next = !result.is_empty();
        } else if upper_next {
            result.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_pluralises_struct_names() {
        assert_eq!(to_snake_case("CourseView"), "course_view");
        assert_eq!(to_snake_case("User"), "user");
    }

    #[test]
    fn camel_case_from_field_names() {
        assert_eq!(to_camel_case("user_id"), "userId");
        assert_eq!(to_camel_case("id"), "id");
        assert_eq!(to_camel_case("max_points_total"), "maxPointsTotal");
    }

    #[test]
    fn stored_key_honours_rename_all() {
        let input: DeriveInput = syn::parse_quote! {
            #[serde(rename_all = "camelCase", deny_unknown_fields)]
            struct Lesson {
                #[document(id)]
                lesson_id: String,
            }
        };
        let field = extract_id_field(&input).unwrap();
        assert_eq!(stored_key(&input, field).unwrap(), "lessonId");
    }

    #[test]
    fn stored_key_prefers_field_rename() {
        let input: DeriveInput = syn::parse_quote! {
            #[serde(rename_all = "camelCase")]
            struct Submission {
                #[document(id)]
                #[serde(rename = "submissionKey", default)]
                submission_id: String,
            }
        };
        let field = extract_id_field(&input).unwrap();
        assert_eq!(stored_key(&input, field).unwrap(), "submissionKey");
    }

    #[test]
    fn falls_back_to_field_named_id() {
        let input: DeriveInput = syn::parse_quote! {
            struct Tag {
                id: String,
                label: String,
            }
        };
        assert_eq!(extract_collection(&input).unwrap(), "tags");
        let field = extract_id_field(&input).unwrap();
        assert_eq!(stored_key(&input, field).unwrap(), "id");
    }
}
