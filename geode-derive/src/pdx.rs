//! Derive macro implementation for `PdxSerializable`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, Lit};

/// How a Rust field type maps onto a PDX field.
enum Mapping {
    /// Copied scalar: `write_x(name, self.f)` / `read_x(name)`.
    Scalar(&'static str),
    /// Nullable on the wire: `write_x(name, Some(&self.f))`, read defaults on null.
    Required(&'static str),
    /// Nullable on the wire and in Rust: `Option<T>`.
    Optional(&'static str),
    /// Dynamic [`Value`] written with `write_object`.
    Object,
    /// Nested `PdxSerializable`.
    Nested,
    /// Nested `PdxSerializable` that may be absent.
    OptionalNested,
}

fn base_method(ty: &str) -> Option<(&'static str, bool)> {
    // (method suffix, passes by value)
    let m = match ty {
        "bool" => ("boolean", true),
        "i8" => ("byte", true),
        "i16" => ("short", true),
        "i32" => ("int", true),
        "i64" => ("long", true),
        "f32" => ("float", true),
        "f64" => ("double", true),
        "char" => ("char", true),
        "String" => ("string", false),
        "DateTime<Utc>" | "chrono::DateTime<chrono::Utc>" => ("date", false),
        "Vec<bool>" => ("boolean_array", false),
        "Vec<char>" => ("char_array", false),
        "Vec<u8>" => ("byte_array", false),
        "Vec<i16>" => ("short_array", false),
        "Vec<i32>" => ("int_array", false),
        "Vec<i64>" => ("long_array", false),
        "Vec<f32>" => ("float_array", false),
        "Vec<f64>" => ("double_array", false),
        "Vec<String>" => ("string_array", false),
        "Vec<Value>" | "Vec<geode_core::Value>" => ("object_array", false),
        "Vec<Vec<u8>>" => ("array_of_byte_arrays", false),
        _ => return None,
    };
    Some(m)
}

/// Returns `None` for types with no PDX encoding, such as `Option<i32>`:
/// primitive PDX fields are never null.
fn classify(ty: &str) -> Option<Mapping> {
    if ty == "Value" || ty == "geode_core::Value" {
        return Some(Mapping::Object);
    }
    if let Some(inner) = ty.strip_prefix("Option<").and_then(|s| s.strip_suffix('>')) {
        return match base_method(inner) {
            Some((_, true)) => None,
            Some((method, false)) => Some(Mapping::Optional(method)),
            None => Some(Mapping::OptionalNested),
        };
    }
    let mapping = match base_method(ty) {
        Some((method, true)) => Mapping::Scalar(method),
        Some((method, false)) => Mapping::Required(method),
        None => Mapping::Nested,
    };
    Some(mapping)
}

pub fn derive_pdx_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let class_name =
        parse_str_attr(&input.attrs, "class_name").unwrap_or_else(|| name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "PdxSerializable only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "PdxSerializable can only be derived for structs",
            ))
        }
    };

    let mut write_stmts = Vec::new();
    let mut read_stmts = Vec::new();

    for field in fields {
        let field_ident = match field.ident.as_ref() {
            Some(ident) => ident,
            None => continue,
        };

        if has_flag_attr(&field.attrs, "skip") {
            read_stmts.push(quote! { #field_ident: ::core::default::Default::default() });
            continue;
        }

        let wire_name = parse_str_attr(&field.attrs, "field_name")
            .unwrap_or_else(|| field_ident.to_string());
        let field_ty = &field.ty;
        let ty_str = quote!(#field_ty).to_string().replace(' ', "");

        let mapping = classify(&ty_str).ok_or_else(|| {
            syn::Error::new_spanned(
                field_ty,
                format!(
                    "`{}` has no PDX encoding; primitive PDX fields cannot be null",
                    ty_str
                ),
            )
        })?;
        let (write, read) = field_code(field_ident, &wire_name, field_ty, mapping);
        write_stmts.push(write);
        if has_flag_attr(&field.attrs, "identity") {
            write_stmts.push(quote! { writer.mark_identity_field(#wire_name)?; });
        }
        read_stmts.push(read);
    }

    Ok(quote! {
        impl #impl_generics geode_core::PdxSerializable for #name #ty_generics #where_clause {
            const CLASS_NAME: &'static str = #class_name;

            fn to_data(&self, writer: &mut dyn geode_core::PdxWriter) -> geode_core::Result<()> {
                #[allow(unused_imports)]
                use geode_core::PdxWriterExt as _;
                #(#write_stmts)*
                Ok(())
            }

            fn from_data(reader: &mut dyn geode_core::PdxReader) -> geode_core::Result<Self> {
                #[allow(unused_imports)]
                use geode_core::PdxReaderExt as _;
                Ok(Self {
                    #(#read_stmts,)*
                })
            }
        }
    })
}

fn field_code(
    ident: &Ident,
    wire_name: &str,
    ty: &syn::Type,
    mapping: Mapping,
) -> (TokenStream2, TokenStream2) {
    let method =
        |prefix: &str, suffix: &str| Ident::new(&format!("{}_{}", prefix, suffix), ident.span());
    match mapping {
        Mapping::Scalar(suffix) => {
            let (w, r) = (method("write", suffix), method("read", suffix));
            (
                quote! { writer.#w(#wire_name, self.#ident)?; },
                quote! { #ident: reader.#r(#wire_name)? },
            )
        }
        Mapping::Required(suffix) => {
            let (w, r) = (method("write", suffix), method("read", suffix));
            let arg = if suffix == "date" {
                quote! { Some(self.#ident) }
            } else {
                quote! { Some(&self.#ident[..]) }
            };
            (
                quote! { writer.#w(#wire_name, #arg)?; },
                quote! { #ident: reader.#r(#wire_name)?.unwrap_or_default() },
            )
        }
        Mapping::Optional(suffix) => {
            let (w, r) = (method("write", suffix), method("read", suffix));
            let arg = if suffix == "date" {
                quote! { self.#ident }
            } else {
                quote! { self.#ident.as_deref() }
            };
            (
                quote! { writer.#w(#wire_name, #arg)?; },
                quote! { #ident: reader.#r(#wire_name)? },
            )
        }
        Mapping::Object => (
            quote! { writer.write_object(#wire_name, &self.#ident)?; },
            quote! { #ident: reader.read_object(#wire_name)? },
        ),
        Mapping::Nested => (
            quote! { writer.write_pdx(#wire_name, Some(&self.#ident))?; },
            quote! {
                #ident: reader.read_pdx::<#ty>(#wire_name)?.ok_or_else(|| {
                    geode_core::GeodeError::Serialization(
                        ::std::format!("required PDX field {} is null", #wire_name),
                    )
                })?
            },
        ),
        Mapping::OptionalNested => (
            quote! { writer.write_pdx(#wire_name, self.#ident.as_ref())?; },
            quote! { #ident: reader.read_pdx(#wire_name)? },
        ),
    }
}

fn parse_str_attr(attrs: &[syn::Attribute], key: &str) -> Option<String> {
    for attr in attrs {
        if !attr.path().is_ident("pdx") {
            continue;
        }
        let mut result = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                let value = meta.value()?;
                let lit: Lit = value.parse()?;
                if let Lit::Str(s) = lit {
                    result = Some(s.value());
                }
            } else if meta.input.peek(syn::Token![=]) {
                // Consume the value of keys we are not looking for.
                let _: Lit = meta.value()?.parse()?;
            }
            Ok(())
        });
        if result.is_some() {
            return result;
        }
    }
    None
}

fn has_flag_attr(attrs: &[syn::Attribute], flag: &str) -> bool {
    for attr in attrs {
        if !attr.path().is_ident("pdx") {
            continue;
        }
        let mut found = false;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(flag) {
                found = true;
            } else if meta.input.peek(syn::Token![=]) {
                let _: Lit = meta.value()?.parse()?;
            }
            Ok(())
        });
        if found {
            return true;
        }
    }
    false
}
