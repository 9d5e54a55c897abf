//! Derive macro for the `Codec` trait of the `gencodec` crate.
//!
//! `#[derive(Codec)]` generates the `Encode`, `Decode` and `Codec` impls of
//! a type: the type codec the engine dispatches to.
//!
//! # Supported Types
//!
//! - Structs with named fields, tuple structs and unit structs, encoded as
//!   `START`, `slot value` pairs for every non-zero field, `END`
//! - Enums, encoded as a two element list of the variant index and a
//!   struct-shaped payload of the variant's fields
//!
//! Every field type must implement `Default`: fields missing from the wire
//! are left at their default.
//!
//! # Type Attributes
//!
//! - `#[codec(name = "...")]`: the stable name; defaults to the module path
//!   and the type's identifier
//! - `#[codec(removed(2, 4))]`: retired slots, never assigned again; data
//!   found in them is skipped
//!
//! # Field Attributes
//!
//! - `#[codec(slot = N)]`: pins the field's slot
//! - `#[codec(skip)]`: leaves the field out of the wire entirely
//!
//! Fields without an explicit slot take the lowest free slot in declaration
//! order, so renaming a field keeps its slot while reordering does not.
//!
//! ```ignore
//! use gencodec::Codec;
//!
//! #[derive(Default, Codec)]
//! #[codec(removed(1))]
//! struct Person {
//!     name: String,   // slot 0
//!     email: String,  // slot 2
//! }
//! ```

use std::collections::BTreeSet;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    Data, DataEnum, DeriveInput, Fields, Ident, LitInt, LitStr, Member, Token,
    Type, parse::Parse, parse_macro_input,
};

/// Derive macro for `Codec`, `Encode` and `Decode`.
///
/// # Example
///
/// ```ignore
/// use gencodec::Codec;
///
/// #[derive(Default, Codec)]
/// #[codec(name = "shapes::Color")]
/// enum Color {
///     #[default]
///     Black,
///     Rgb(u8, u8, u8),
///     Named { name: String },
/// }
/// ```
#[proc_macro_derive(Codec, attributes(codec))]
pub fn derive_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

#[derive(Default)]
struct TypeAttrs {
    name: Option<LitStr>,
    removed: Vec<u32>,
}

fn type_attrs(input: &DeriveInput) -> syn::Result<TypeAttrs> {
    let mut attrs = TypeAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("codec") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                attrs.name = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("removed") {
                let content;
                syn::parenthesized!(content in meta.input);
                let slots =
                    content.parse_terminated(LitInt::parse, Token![,])?;
                for slot in slots {
                    attrs.removed.push(slot.base10_parse()?);
                }
                Ok(())
            } else {
                Err(meta.error("unknown codec attribute"))
            }
        })?;
    }

    Ok(attrs)
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    slot: Option<(u32, Span)>,
}

fn field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("codec") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else if meta.path.is_ident("slot") {
                let lit: LitInt = meta.value()?.parse()?;
                attrs.slot = Some((lit.base10_parse()?, lit.span()));
                Ok(())
            } else {
                Err(meta.error("unknown codec attribute"))
            }
        })?;
    }

    if attrs.skip && attrs.slot.is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "a skipped field cannot have a slot",
        ));
    }

    Ok(attrs)
}

/// A field that is part of the wire format.
struct SlotField<'a> {
    slot: u32,
    name: String,
    member: Member,
    ty: &'a Type,
    binding: Ident,
}

/// All fields of a struct or variant, in declaration order.
struct FieldSet<'a> {
    all: Vec<(Member, &'a Type, Ident, bool)>,
    encoded: Vec<SlotField<'a>>,
}

fn member_name(member: &Member) -> String {
    match member {
        Member::Named(ident) => ident.to_string(),
        Member::Unnamed(index) => index.index.to_string(),
    }
}

fn assign_slots<'a>(
    fields: &'a Fields,
    removed: &[u32],
) -> syn::Result<FieldSet<'a>> {
    let mut all = Vec::new();
    let mut pending = Vec::new();
    let mut taken = BTreeSet::new();

    for (index, (member, field)) in fields.members().zip(fields).enumerate() {
        let attrs = field_attrs(field)?;
        let binding = format_ident!("__field_{}", index);
        all.push((member.clone(), &field.ty, binding.clone(), attrs.skip));

        if attrs.skip {
            continue;
        }

        if let Some((slot, span)) = attrs.slot {
            if removed.contains(&slot) {
                return Err(syn::Error::new(
                    span,
                    format!("slot {slot} is marked as removed"),
                ));
            }
            if !taken.insert(slot) {
                return Err(syn::Error::new(
                    span,
                    format!("slot {slot} is used twice"),
                ));
            }
        }
        pending.push((attrs.slot.map(|(slot, _)| slot), member, field, binding));
    }

    let mut next = 0;
    let mut encoded = Vec::with_capacity(pending.len());
    for (slot, member, field, binding) in pending {
        let slot = match slot {
            Some(slot) => slot,
            None => {
                while taken.contains(&next) || removed.contains(&next) {
                    next += 1;
                }
                taken.insert(next);
                next
            }
        };

        encoded.push(SlotField {
            slot,
            name: member_name(&member),
            member,
            ty: &field.ty,
            binding,
        });
    }

    Ok(FieldSet { all, encoded })
}

/// `START`, the decode of each known slot, skips for removed ones, `END`.
fn decode_fields(
    fields: &[SlotField<'_>],
    removed: &[u32],
    type_name: &str,
    assign: impl Fn(&SlotField<'_>) -> TokenStream2,
) -> TokenStream2 {
    let arms = fields.iter().map(|field| {
        let slot = u64::from(field.slot);
        let assign = assign(field);
        quote! { #slot => { #assign } }
    });

    let removed_arm = if removed.is_empty() {
        quote! {}
    } else {
        let slots = removed.iter().map(|slot| u64::from(*slot));
        quote! { #(#slots)|* => decoder.removed_field()?, }
    };

    quote! {
        decoder.start_struct()?;
        while let ::core::option::Option::Some(slot) = decoder.next_field()? {
            match slot {
                #(#arms)*
                #removed_arm
                slot => decoder.unknown_field(#type_name, slot)?,
            }
        }
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let attrs = type_attrs(input)?;
    let name = &input.ident;

    let type_name = attrs
        .name
        .as_ref()
        .map_or_else(|| name.to_string(), LitStr::value);

    let base_name = match &attrs.name {
        Some(lit) => quote! { #lit },
        None => {
            let ident = name.to_string();
            quote! { ::core::concat!(::core::module_path!(), "::", #ident) }
        }
    };

    let params: Vec<&Ident> =
        input.generics.type_params().map(|param| &param.ident).collect();

    let stable_name = if params.is_empty() {
        quote! { ::std::string::String::from(#base_name) }
    } else {
        quote! {
            let params: ::std::vec::Vec<::std::string::String> = ::std::vec![
                #(<#params as ::gencodec::Codec>::stable_name()),*
            ];
            ::std::format!("{}<{}>", #base_name, params.join(", "))
        }
    };

    let (encode_body, decode_body, codec_items, field_types) = match &input.data
    {
        Data::Struct(data) => {
            let set = assign_slots(&data.fields, &attrs.removed)?;
            expand_struct(&data.fields, &set, &attrs.removed, &type_name)
        }
        Data::Enum(data) => {
            if !attrs.removed.is_empty() {
                return Err(syn::Error::new_spanned(
                    name,
                    "removed slots are only supported on structs",
                ));
            }
            expand_enum(data, &type_name)?
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Codec cannot be derived for unions",
            ));
        }
    };

    let bounded = |bound: TokenStream2| {
        let mut generics = input.generics.clone();
        let where_clause = generics.make_where_clause();
        for param in &params {
            where_clause.predicates.push(syn::parse_quote!(#param: #bound));
        }
        generics
    };

    let (_, ty_generics, _) = input.generics.split_for_impl();

    let encode_generics = bounded(quote! { ::gencodec::Encode });
    let (encode_impl, _, encode_where) = encode_generics.split_for_impl();

    let decode_generics = bounded(quote! {
        ::gencodec::Decode + ::core::default::Default
    });
    let (decode_impl, _, decode_where) = decode_generics.split_for_impl();

    let codec_generics = bounded(quote! {
        ::gencodec::Codec + ::core::default::Default
    });
    let (codec_impl, _, codec_where) = codec_generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        #[allow(clippy::trait_duplication_in_bounds)]
        impl #encode_impl ::gencodec::Encode for #name #ty_generics #encode_where {
            fn encode(
                &self,
                encoder: &mut ::gencodec::Encoder<'_>,
            ) -> ::gencodec::Result<()> {
                #encode_body
                ::core::result::Result::Ok(())
            }
        }

        #[automatically_derived]
        #[allow(clippy::trait_duplication_in_bounds)]
        impl #decode_impl ::gencodec::Decode for #name #ty_generics #decode_where {
            #decode_body
        }

        #[automatically_derived]
        #[allow(clippy::trait_duplication_in_bounds)]
        impl #codec_impl ::gencodec::Codec for #name #ty_generics #codec_where {
            #codec_items

            fn stable_name() -> ::std::string::String {
                #stable_name
            }

            #[allow(unused_variables)]
            fn register_dependencies(
                registry: &mut ::gencodec::RegistryBuilder,
            ) {
                #(registry.register::<#field_types>();)*
            }
        }
    })
}

type Expansion<'a> = (TokenStream2, TokenStream2, TokenStream2, Vec<&'a Type>);

fn expand_struct<'a>(
    fields: &Fields,
    set: &FieldSet<'a>,
    removed: &[u32],
    type_name: &str,
) -> Expansion<'a> {
    let encodes = set.encoded.iter().map(|field| {
        let slot = u64::from(field.slot);
        let member = &field.member;
        quote! {
            encoder.encode_field(#slot, &self.#member)?;
        }
    });
    let encode_body = quote! {
        encoder.start_struct()?;
        #(#encodes)*
        encoder.end_struct();
    };

    let defaults = set.all.iter().map(|(member, ty, _, _)| {
        quote! { #member: <#ty as ::core::default::Default>::default() }
    });
    let construct = match fields {
        Fields::Unit => quote! { Self },
        _ => quote! { Self { #(#defaults),* } },
    };

    let decode_loop = decode_fields(&set.encoded, removed, type_name, |field| {
        let member = &field.member;
        quote! { self.#member = ::gencodec::Decode::decode(decoder)?; }
    });

    let decode_body = quote! {
        fn decode(
            decoder: &mut ::gencodec::Decoder<'_>,
        ) -> ::gencodec::Result<Self> {
            let mut value = #construct;
            ::gencodec::Decode::decode_in_place(&mut value, decoder)?;
            ::core::result::Result::Ok(value)
        }

        fn decode_in_place(
            &mut self,
            decoder: &mut ::gencodec::Decoder<'_>,
        ) -> ::gencodec::Result<()> {
            #decode_loop
            ::core::result::Result::Ok(())
        }
    };

    let field_infos = set.encoded.iter().map(|field| {
        let slot = field.slot;
        let name = &field.name;
        let ty = field.ty;
        quote! { ::gencodec::Field::of::<#ty>(#slot, #name) }
    });
    let codec_items = quote! {
        const SHAPE: ::gencodec::Shape = ::gencodec::Shape::Struct;

        fn fields() -> ::std::vec::Vec<::gencodec::Field> {
            ::std::vec![#(#field_infos),*]
        }
    };

    let field_types = set.encoded.iter().map(|field| field.ty).collect();
    (encode_body, decode_body, codec_items, field_types)
}

fn expand_enum<'a>(
    data: &'a DataEnum,
    type_name: &str,
) -> syn::Result<Expansion<'a>> {
    let mut encode_arms = Vec::new();
    let mut decode_arms = Vec::new();
    let mut field_types = Vec::new();

    for (index, variant) in data.variants.iter().enumerate() {
        let ident = &variant.ident;
        let index = index as u64;
        let set = assign_slots(&variant.fields, &[])?;

        let bindings = set.all.iter().map(|(member, _, binding, skip)| {
            if *skip {
                quote! { #member: _ }
            } else {
                quote! { #member: #binding }
            }
        });
        let encodes = set.encoded.iter().map(|field| {
            let slot = u64::from(field.slot);
            let binding = &field.binding;
            quote! { encoder.encode_field(#slot, #binding)?; }
        });
        encode_arms.push(quote! {
            Self::#ident { #(#bindings),* } => {
                encoder.start_list(2);
                encoder.encode_uint(#index);
                encoder.start_struct()?;
                #(#encodes)*
                encoder.end_struct();
            }
        });

        let locals = set.all.iter().map(|(_, ty, binding, _)| {
            quote! {
                let mut #binding = <#ty as ::core::default::Default>::default();
            }
        });
        let decode_loop =
            decode_fields(&set.encoded, &[], type_name, |field| {
                let binding = &field.binding;
                quote! { #binding = ::gencodec::Decode::decode(decoder)?; }
            });
        let constructs = set.all.iter().map(|(member, _, binding, _)| {
            quote! { #member: #binding }
        });
        decode_arms.push(quote! {
            #index => {
                #(#locals)*
                #decode_loop
                ::core::result::Result::Ok(Self::#ident { #(#constructs),* })
            }
        });

        field_types.extend(set.encoded.iter().map(|field| field.ty));
    }

    let encode_body = quote! {
        match self {
            #(#encode_arms)*
        }
    };

    let decode_body = quote! {
        #[allow(unused_mut)]
        fn decode(
            decoder: &mut ::gencodec::Decoder<'_>,
        ) -> ::gencodec::Result<Self> {
            decoder.expect_list(2)?;
            let variant = decoder.decode_uint()?;
            match variant {
                #(#decode_arms)*
                _ => ::core::result::Result::Err(::gencodec::Error::OutOfRange {
                    value: ::core::primitive::i128::from(variant),
                    target: #type_name,
                }),
            }
        }
    };

    let dependencies = field_types.iter();
    let codec_items = quote! {
        const SHAPE: ::gencodec::Shape = ::gencodec::Shape::Variant;

        fn dependencies() -> ::std::vec::Vec<::gencodec::TypeKey> {
            ::std::vec![#(::gencodec::TypeKey::of::<#dependencies>()),*]
        }
    };

    Ok((encode_body, decode_body, codec_items, field_types))
}
