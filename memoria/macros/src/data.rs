// Copyright 2019 The Druid Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Adapted for use in memoria.
use crate::CRATE;
use proc_macro2::{Ident, Literal, Span, TokenStream, TokenTree};
use quote::{quote, quote_spanned};
use syn::{spanned::Spanned, Data, DataEnum, DataStruct, Error, ExprPath};

const DATA_ATTR_PATH: &str = "data";
const IGNORE_ATTR_PATH: &str = "ignore";
const SAME_FN_ATTR_PATH: &str = "same_fn";

/// The fields of a struct or an enum variant.
struct Fields {
    kind: FieldKind,
    fields: Vec<Field>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Named,
    Unnamed,
    Unit,
}

enum FieldIdent {
    Named(Ident),
    Unnamed(usize),
}

struct Field {
    ident: FieldIdent,
    /// `true` if this field does not take part in the comparison.
    ignore: bool,
    same_fn: Option<ExprPath>,
}

impl Fields {
    fn parse_ast(fields: &syn::Fields) -> Result<Self, Error> {
        let kind = match fields {
            syn::Fields::Named(_) => FieldKind::Named,
            syn::Fields::Unnamed(_) => FieldKind::Unnamed,
            syn::Fields::Unit => FieldKind::Unit,
        };

        let fields = fields
            .iter()
            .enumerate()
            .map(|(i, field)| Field::parse_ast(field, i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Fields { kind, fields })
    }

    fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    fn compared(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.ignore)
    }
}

impl Field {
    fn parse_ast(field: &syn::Field, index: usize) -> Result<Self, Error> {
        let ident = match field.ident.as_ref() {
            Some(ident) => FieldIdent::Named(ident.clone()),
            None => FieldIdent::Unnamed(index),
        };

        let mut ignore = false;
        let mut same_fn = None;

        for attr in field.attrs.iter() {
            if !attr.path().is_ident(DATA_ATTR_PATH) {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(IGNORE_ATTR_PATH) {
                    if ignore {
                        return Err(meta.error("duplicate attribute"));
                    }
                    ignore = true;
                    Ok(())
                } else if meta.path.is_ident(SAME_FN_ATTR_PATH) {
                    if same_fn.is_some() {
                        return Err(meta.error("duplicate attribute"));
                    }
                    let lit: syn::LitStr = meta.value()?.parse()?;
                    same_fn = Some(lit.parse::<ExprPath>()?);
                    Ok(())
                } else {
                    Err(meta.error("unknown attribute, expected `ignore` or `same_fn = \"...\"`"))
                }
            })?;
        }

        Ok(Field { ident, ignore, same_fn })
    }

    /// The tokens to be used as the function for 'same'.
    fn same_fn_path_tokens(&self) -> TokenStream {
        match self.same_fn {
            Some(ref f) => quote!(#f),
            None => {
                let span = Span::call_site();
                quote_spanned!(span=> ::#CRATE::Data::same)
            }
        }
    }

    fn ident_tokens(&self) -> TokenTree {
        match self.ident {
            FieldIdent::Named(ref ident) => ident.clone().into(),
            FieldIdent::Unnamed(num) => Literal::usize_unsuffixed(num).into(),
        }
    }

    /// Field name without the raw identifier prefix, for building binding names.
    fn ident_string(&self) -> String {
        match self.ident {
            FieldIdent::Named(ref ident) => ident.to_string().trim_start_matches("r#").to_owned(),
            FieldIdent::Unnamed(num) => num.to_string(),
        }
    }

    fn binding(&self, side: &str) -> Ident {
        Ident::new(&format!("__{}_{}", side, self.ident_string()), Span::call_site())
    }
}

pub(crate) fn derive_data_impl(input: syn::DeriveInput) -> Result<TokenStream, Error> {
    match &input.data {
        Data::Struct(s) => derive_struct(&input, s),
        Data::Enum(e) => derive_enum(&input, e),
        Data::Union(u) => Err(Error::new(
            u.union_token.span(),
            "Data implementations cannot be derived from unions",
        )),
    }
}

fn derive_struct(input: &syn::DeriveInput, s: &DataStruct) -> Result<TokenStream, Error> {
    let ident = &input.ident;
    let impl_generics = generics_bounds(&input.generics);
    let (_, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = Fields::parse_ast(&s.fields)?;

    let same_fns: Vec<_> = fields.compared().map(Field::same_fn_path_tokens).collect();
    let idents: Vec<_> = fields.compared().map(Field::ident_tokens).collect();
    let body = if same_fns.is_empty() {
        quote!(true)
    } else {
        quote!( #( #same_fns(&self.#idents, &other.#idents) )&&* )
    };

    Ok(quote! {
        impl<#impl_generics> ::#CRATE::Data for #ident #ty_generics #where_clause {
            fn same(&self, other: &Self) -> bool {
                #body
            }
        }
    })
}

fn is_c_style_enum(s: &DataEnum) -> bool {
    s.variants.iter().all(|variant| variant.fields.is_empty())
}

fn derive_enum(input: &syn::DeriveInput, s: &DataEnum) -> Result<TokenStream, Error> {
    let ident = &input.ident;
    let impl_generics = generics_bounds(&input.generics);
    let (_, ty_generics, where_clause) = input.generics.split_for_impl();

    if is_c_style_enum(s) {
        return Ok(quote! {
            impl<#impl_generics> ::#CRATE::Data for #ident #ty_generics #where_clause {
                fn same(&self, other: &Self) -> bool { self == other }
            }
        });
    }

    let cases = s
        .variants
        .iter()
        .map(|variant| {
            let fields = Fields::parse_ast(&variant.fields)?;
            let variant = &variant.ident;

            // the `same()` calls to the right of the match arm
            let tests: Vec<_> = fields
                .compared()
                .map(|field| {
                    let same_fn = field.same_fn_path_tokens();
                    let left = field.binding("self");
                    let right = field.binding("other");
                    quote!( #same_fn(#left, #right) )
                })
                .collect();
            let test = if tests.is_empty() {
                quote!(true)
            } else {
                quote!( #( #tests )&&* )
            };

            let lefts: Vec<_> = fields.iter().map(|field| field.binding("self")).collect();
            let rights: Vec<_> = fields.iter().map(|field| field.binding("other")).collect();

            let arm = match fields.kind {
                FieldKind::Named => {
                    let names: Vec<_> = fields.iter().map(Field::ident_tokens).collect();
                    quote! {
                        (#ident::#variant { #( #names: #lefts ),* }, #ident::#variant { #( #names: #rights ),* }) => {
                            #test
                        }
                    }
                }
                FieldKind::Unit => quote! {
                    (#ident::#variant, #ident::#variant) => { true }
                },
                FieldKind::Unnamed => quote! {
                    (#ident::#variant( #( #lefts ),* ), #ident::#variant( #( #rights ),* )) => {
                        #test
                    }
                },
            };
            Ok(arm)
        })
        .collect::<Result<Vec<TokenStream>, Error>>()?;

    Ok(quote! {
        impl<#impl_generics> ::#CRATE::Data for #ident #ty_generics #where_clause {
            #[allow(unreachable_patterns)]
            fn same(&self, other: &Self) -> bool {
                match (self, other) {
                    #( #cases )*
                    _ => false,
                }
            }
        }
    })
}

fn generics_bounds(generics: &syn::Generics) -> TokenStream {
    let res = generics.params.iter().map(|gp| {
        use syn::GenericParam::*;
        match gp {
            Type(ty) => {
                let ident = &ty.ident;
                let bounds = &ty.bounds;
                if bounds.is_empty() {
                    quote_spanned!(ty.span()=> #ident : ::#CRATE::Data)
                } else {
                    quote_spanned!(ty.span()=> #ident : #bounds + ::#CRATE::Data)
                }
            }
            Lifetime(lf) => quote!(#lf),
            Const(cst) => quote!(#cst),
        }
    });

    quote!( #( #res, )* )
}
