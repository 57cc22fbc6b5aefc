extern crate proc_macro;
use proc_macro2::Span;
use quote::{ToTokens, TokenStreamExt};

mod data;

//--------------------------------------------------------------------------------------------------
struct CrateName;
const CRATE: CrateName = CrateName;

impl ToTokens for CrateName {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        tokens.append(syn::Ident::new("memoria", Span::call_site()))
    }
}

//--------------------------------------------------------------------------------------------------

/// Derives `memoria::Data` by comparing fields with `Data::same`.
///
/// # Field attributes
///
/// - `#[data(ignore)]`: the field does not take part in the comparison.
/// - `#[data(same_fn = "path::to::fn")]`: compares the field with `fn(&T, &T) -> bool` instead.
///
/// # Examples
///```ignore
/// #[derive(Clone, Data)]
/// struct Filters {
///     min_age: u32,
///     only_active: bool,
///     #[data(ignore)]
///     last_edited_by: String,
/// }
///```
#[proc_macro_derive(Data, attributes(data))]
pub fn derive_data(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    data::derive_data_impl(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
