//! Derive macro for ORM records.
//!
//! This crate provides `#[derive(Record)]`, which implements
//! `oxide_sql_core::Record` for a struct with named fields: a static
//! descriptor listing every mapped field with its column tag, kind and
//! codec, plus accessors addressed by field path.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr,
    PathArguments, Type,
};

/// Derives `Record` for a struct.
///
/// # Struct attributes
///
/// - `#[orm(table = "name")]` - Fixes the table name instead of mapping
///   the struct name
/// - `#[orm(hooks)]` - The struct implements `Hooks` itself; otherwise an
///   empty implementation is generated
///
/// # Field attributes
///
/// - `#[orm("tag")]` - Column tag, e.g. `#[orm("pk autoincr")]`,
///   `#[orm("'user_name' varchar(64) notnull unique")]`
/// - `#[orm(tag = "...", conversion)]` - The field type implements
///   `Conversion` and is stored through it
/// - `#[orm(tag = "...", cascade)]` - The field is `Option<T>` of another
///   record and is stored as that record's primary key
/// - `#[orm("-")]` or `#[orm(skip)]` - The field is not mapped
///
/// A tag containing `json` stores the field as JSON text; a tag containing
/// `extends` flattens a nested record into this one.
#[proc_macro_derive(Record, attributes(orm))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_record_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Codec {
    Primitive,
    Json,
    Conversion,
    Related,
    Embedded,
}

struct FieldInfo {
    ident: Ident,
    ty: Type,
    tag: String,
    codec: Codec,
    /// `T` of a cascade field's `Option<T>`.
    related: Option<Type>,
}

#[derive(Default)]
struct FieldAttrs {
    tag: String,
    skip: bool,
    conversion: bool,
    cascade: bool,
}

#[derive(Default)]
struct StructAttrs {
    table: Option<String>,
    hooks: bool,
}

fn derive_record_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record derive does not support generic structs",
        ));
    }
    let attrs = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record derive only supports structs",
            ));
        }
    };

    let mut infos = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let field_attrs = parse_field_attrs(&field.attrs)?;
        if field_attrs.skip || field_attrs.tag.trim() == "-" {
            continue;
        }
        let codec = if field_attrs.cascade {
            Codec::Related
        } else if field_attrs.conversion {
            Codec::Conversion
        } else if has_token(&field_attrs.tag, &["extends"]) {
            Codec::Embedded
        } else if has_token(&field_attrs.tag, &["json", "jsonb"]) {
            Codec::Json
        } else {
            Codec::Primitive
        };
        let related = if codec == Codec::Related {
            match option_inner(&field.ty) {
                Some(inner) => Some(inner.clone()),
                None => {
                    return Err(syn::Error::new_spanned(
                        &field.ty,
                        "cascade fields must be `Option<T>` where `T: Record`",
                    ));
                }
            }
        } else {
            None
        };
        infos.push(FieldInfo {
            ident,
            ty: field.ty.clone(),
            tag: field_attrs.tag,
            codec,
            related,
        });
    }

    let type_name = name.to_string();
    let table_name = match &attrs.table {
        Some(table) => quote! { Some(#table) },
        None => quote! { None },
    };
    let descriptors: Vec<TokenStream2> = infos.iter().map(field_descriptor).collect();
    let get_arms = infos.iter().filter_map(get_arm);
    let set_arms = infos.iter().filter_map(set_arm);
    let zero_arms = infos.iter().filter_map(zero_arm);
    let related_arms = infos.iter().filter_map(related_arm);

    let embedded: Vec<&FieldInfo> = infos.iter().filter(|f| f.codec == Codec::Embedded).collect();
    let embedded_get = embedded.iter().map(|f| {
        let ident = &f.ident;
        let prefix = format!("{ident}.");
        quote! {
            if let Some(rest) = path.strip_prefix(#prefix) {
                return ::oxide_sql_core::Record::get_field(&self.#ident, rest, cx);
            }
        }
    });
    let embedded_set = embedded.iter().map(|f| {
        let ident = &f.ident;
        let prefix = format!("{ident}.");
        quote! {
            if let Some(rest) = path.strip_prefix(#prefix) {
                return ::oxide_sql_core::Record::set_field(&mut self.#ident, rest, value, cx);
            }
        }
    });
    let embedded_zero = embedded.iter().map(|f| {
        let ident = &f.ident;
        let prefix = format!("{ident}.");
        quote! {
            if let Some(rest) = path.strip_prefix(#prefix) {
                return ::oxide_sql_core::Record::is_zero_field(&self.#ident, rest);
            }
        }
    });
    let embedded_related = embedded.iter().map(|f| {
        let ident = &f.ident;
        let prefix = format!("{ident}.");
        quote! {
            if let Some(rest) = path.strip_prefix(#prefix) {
                return ::oxide_sql_core::Record::set_related(&mut self.#ident, rest, values, cx);
            }
        }
    });

    let hooks_impl = if attrs.hooks {
        quote! {}
    } else {
        quote! {
            #[automatically_derived]
            impl ::oxide_sql_core::Hooks for #name {}
        }
    };

    Ok(quote! {
        #hooks_impl

        #[automatically_derived]
        impl ::oxide_sql_core::Record for #name {
            fn descriptor() -> &'static ::oxide_sql_core::RecordDescriptor {
                static DESCRIPTOR: ::oxide_sql_core::RecordDescriptor =
                    ::oxide_sql_core::RecordDescriptor {
                        type_name: #type_name,
                        table_name: #table_name,
                        fields: &[#(#descriptors),*],
                        type_id: ::std::any::TypeId::of::<#name>,
                        hook_table_name: || {
                            ::oxide_sql_core::Hooks::table_name(
                                &<#name as ::std::default::Default>::default(),
                            )
                        },
                    };
                &DESCRIPTOR
            }

            fn get_field(
                &self,
                path: &str,
                cx: &::oxide_sql_core::ConvertContext,
            ) -> ::std::result::Result<::oxide_sql_core::SqlValue, ::oxide_sql_core::ConvertError> {
                match path {
                    #(#get_arms,)*
                    _ => {
                        #(#embedded_get)*
                        Err(::oxide_sql_core::ConvertError::UnknownField(path.to_string()))
                    }
                }
            }

            fn set_field(
                &mut self,
                path: &str,
                value: ::oxide_sql_core::SqlValue,
                cx: &::oxide_sql_core::ConvertContext,
            ) -> ::std::result::Result<(), ::oxide_sql_core::ConvertError> {
                match path {
                    #(#set_arms,)*
                    _ => {
                        #(#embedded_set)*
                        let _ = (value, cx);
                        Err(::oxide_sql_core::ConvertError::UnknownField(path.to_string()))
                    }
                }
            }

            fn is_zero_field(&self, path: &str) -> bool {
                match path {
                    #(#zero_arms,)*
                    _ => {
                        #(#embedded_zero)*
                        true
                    }
                }
            }

            fn set_related(
                &mut self,
                path: &str,
                values: &[(::std::string::String, ::oxide_sql_core::SqlValue)],
                cx: &::oxide_sql_core::ConvertContext,
            ) -> ::std::result::Result<(), ::oxide_sql_core::ConvertError> {
                match path {
                    #(#related_arms,)*
                    _ => {
                        #(#embedded_related)*
                        let _ = (values, cx);
                        Err(::oxide_sql_core::ConvertError::UnknownField(path.to_string()))
                    }
                }
            }
        }
    })
}

fn field_descriptor(info: &FieldInfo) -> TokenStream2 {
    let name = info.ident.to_string();
    let tag = &info.tag;
    let ty = &info.ty;
    let nullable = option_inner(ty).is_some();
    let none = quote! { None };
    let (kind, nullable, codec, embedded, related) = match info.codec {
        Codec::Primitive => (
            quote! { <#ty as ::oxide_sql_core::FieldType>::KIND },
            quote! { <#ty as ::oxide_sql_core::FieldType>::NULLABLE },
            quote! { Primitive },
            none.clone(),
            none,
        ),
        Codec::Json => (
            quote! { ::oxide_sql_core::FieldKind::Json },
            quote! { #nullable },
            quote! { Json },
            none.clone(),
            none,
        ),
        Codec::Conversion => (
            quote! { ::oxide_sql_core::FieldKind::Custom },
            quote! { #nullable },
            quote! { Conversion },
            none.clone(),
            none,
        ),
        Codec::Related => {
            let target = info.related.as_ref().unwrap_or(ty);
            (
                quote! { ::oxide_sql_core::FieldKind::Related },
                quote! { true },
                quote! { Related },
                none,
                quote! { Some(<#target as ::oxide_sql_core::Record>::descriptor) },
            )
        }
        Codec::Embedded => (
            quote! { ::oxide_sql_core::FieldKind::Embedded },
            quote! { false },
            quote! { Embedded },
            quote! { Some(<#ty as ::oxide_sql_core::Record>::descriptor) },
            none,
        ),
    };
    quote! {
        ::oxide_sql_core::FieldDescriptor {
            name: #name,
            tag: #tag,
            kind: #kind,
            nullable: #nullable,
            codec: ::oxide_sql_core::ColumnCodec::#codec,
            embedded: #embedded,
            related: #related,
        }
    }
}

fn get_arm(info: &FieldInfo) -> Option<TokenStream2> {
    let ident = &info.ident;
    let path = ident.to_string();
    let body = match info.codec {
        Codec::Primitive => quote! { ::oxide_sql_core::FieldType::to_sql(&self.#ident, cx) },
        Codec::Json => quote! { ::oxide_sql_core::record::json_encode(&self.#ident) },
        Codec::Conversion => {
            quote! { ::oxide_sql_core::record::conversion_encode(&self.#ident) }
        }
        Codec::Related => {
            quote! { ::oxide_sql_core::record::related_encode(&self.#ident, path, cx) }
        }
        Codec::Embedded => return None,
    };
    Some(quote! { #path => #body })
}

fn set_arm(info: &FieldInfo) -> Option<TokenStream2> {
    let ident = &info.ident;
    let path = ident.to_string();
    let body = match info.codec {
        Codec::Primitive => quote! {
            self.#ident = ::oxide_sql_core::FieldType::from_sql(value, cx)?;
        },
        Codec::Json => quote! {
            self.#ident = ::oxide_sql_core::record::json_decode(value)?;
        },
        Codec::Conversion => quote! {
            if let Some(decoded) = ::oxide_sql_core::record::conversion_decode(value)? {
                self.#ident = decoded;
            }
        },
        Codec::Related => quote! {
            self.#ident = ::oxide_sql_core::record::related_decode(value, path, cx)?;
        },
        Codec::Embedded => return None,
    };
    Some(quote! { #path => { #body Ok(()) } })
}

fn zero_arm(info: &FieldInfo) -> Option<TokenStream2> {
    let ident = &info.ident;
    let path = ident.to_string();
    let body = match info.codec {
        Codec::Primitive => quote! { ::oxide_sql_core::FieldType::is_zero(&self.#ident) },
        Codec::Json => quote! { ::oxide_sql_core::record::json_is_zero(&self.#ident) },
        Codec::Conversion => quote! { ::oxide_sql_core::Conversion::is_zero(&self.#ident) },
        Codec::Related => quote! { self.#ident.is_none() },
        Codec::Embedded => return None,
    };
    Some(quote! { #path => #body })
}

fn related_arm(info: &FieldInfo) -> Option<TokenStream2> {
    if info.codec != Codec::Related {
        return None;
    }
    let ident = &info.ident;
    let path = ident.to_string();
    Some(quote! {
        #path => {
            self.#ident = Some(::oxide_sql_core::record::related_assign(values, cx)?);
            Ok(())
        }
    })
}

fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<StructAttrs> {
    let mut result = StructAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                result.table = Some(value.value());
            } else if meta.path.is_ident("hooks") {
                result.hooks = true;
            } else {
                return Err(meta.error("expected `table = \"...\"` or `hooks`"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        // Shorthand: #[orm("pk autoincr")]
        if let Ok(tag) = attr.parse_args::<LitStr>() {
            result.tag = tag.value();
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let value: LitStr = meta.value()?.parse()?;
                result.tag = value.value();
            } else if meta.path.is_ident("skip") {
                result.skip = true;
            } else if meta.path.is_ident("conversion") {
                result.conversion = true;
            } else if meta.path.is_ident("cascade") {
                result.cascade = true;
            } else {
                return Err(meta.error(
                    "expected `tag = \"...\"`, `skip`, `conversion` or `cascade`",
                ));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

/// Whether a tag contains one of `keywords` as a bare or parameterized token.
fn has_token(tag: &str, keywords: &[&str]) -> bool {
    tag.split_whitespace().any(|token| {
        let head = token.split('(').next().unwrap_or(token);
        keywords.iter().any(|k| head.eq_ignore_ascii_case(k))
    })
}

/// `T` of an `Option<T>` field type.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}
