use std::collections::BTreeSet;

use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut seen_keys = BTreeSet::new();
    let mut lens_defs = Vec::new();
    let mut fields_methods = Vec::new();
    let mut key_exprs = Vec::new();
    let mut apply_arms = Vec::new();
    let mut raw_arms = Vec::new();
    let mut unset_checks = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let rust_name = field_ident.unraw().to_string();
        let field_name = match rename_attr(&field.attrs) {
            Ok(rename) => rename.unwrap_or_else(|| rust_name.clone()),
            Err(error) => return error.to_compile_error().into(),
        };
        if !seen_keys.insert(field_name.clone()) {
            return syn::Error::new_spanned(
                field_ident,
                format!("duplicate form field key `{field_name}`"),
            )
            .to_compile_error()
            .into();
        }

        let field_ty = field.ty;
        let lens_ident = format_ident!("{model_ident}{}Lens", to_pascal_case(&rust_name));

        lens_defs.push(quote! {
            #[derive(Clone, Copy, Debug, Default)]
            pub struct #lens_ident;

            impl #calmform::form::FieldLens<#model_ident> for #lens_ident {
                type Value = #field_ty;

                fn key(self) -> #calmform::form::FieldKey {
                    #calmform::form::FieldKey::new(#field_name)
                }

                fn get<'a>(self, model: &'a #model_ident) -> &'a Self::Value {
                    &model.#field_ident
                }

                fn set(self, model: &mut #model_ident, value: Self::Value) {
                    model.#field_ident = value;
                }
            }
        });

        fields_methods.push(quote! {
            pub const fn #field_ident(&self) -> #lens_ident {
                #lens_ident
            }
        });

        key_exprs.push(quote! {
            #calmform::form::FieldKey::new(#field_name)
        });

        apply_arms.push(quote! {
            #field_name => match <#field_ty as #calmform::form::FieldValue>::from_raw(raw) {
                ::core::option::Option::Some(value) if self.#field_ident == value => {
                    #calmform::form::FieldWrite::Unchanged(#calmform::form::FieldKey::new(#field_name))
                }
                ::core::option::Option::Some(value) => {
                    self.#field_ident = value;
                    #calmform::form::FieldWrite::Applied(#calmform::form::FieldKey::new(#field_name))
                }
                ::core::option::Option::None => {
                    #calmform::form::FieldWrite::Rejected(#calmform::form::FieldKey::new(#field_name))
                }
            },
        });

        raw_arms.push(quote! {
            #field_name => ::core::option::Option::Some(
                <#field_ty as #calmform::form::FieldValue>::to_raw(&self.#field_ident)
            ),
        });

        unset_checks.push(quote! {
            && <#field_ty as #calmform::form::FieldValue>::is_unset(&self.#field_ident)
        });
    }

    quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #calmform::form::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn field_keys() -> &'static [#calmform::form::FieldKey] {
                const KEYS: &[#calmform::form::FieldKey] = &[#(#key_exprs),*];
                KEYS
            }

            #[allow(unused_variables)]
            fn apply_raw(
                &mut self,
                name: &str,
                raw: #calmform::form::RawValue,
            ) -> #calmform::form::FieldWrite {
                match name {
                    #(#apply_arms)*
                    _ => #calmform::form::FieldWrite::UnknownField,
                }
            }

            #[allow(unused_variables)]
            fn raw_value(&self, name: &str) -> ::core::option::Option<#calmform::form::RawValue> {
                match name {
                    #(#raw_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn is_empty(&self) -> bool {
                true #(#unset_checks)*
            }
        }

        #(#lens_defs)*
    }
    .into()
}

fn rename_attr(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs {
        if !attr.path().is_ident("form") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename = \"...\"`"))
            }
        })?;
    }
    Ok(rename)
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}

fn to_pascal_case(input: &str) -> String {
    let mut out = String::new();
    for segment in input.split('_') {
        if segment.is_empty() {
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
