use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, punctuated::Punctuated, spanned::Spanned, token::Comma, Data, DeriveInput,
    Field, Fields, Ident,
};

/// Implements `crate::output::TableRow` for a struct with named fields.
///
/// Every field becomes a column rendered through `Display`, the field marked
/// with `#[name_column]` is what the `names` output format prints.
#[proc_macro_derive(TableRow, attributes(name_column))]
pub fn derive_table_row(input: TokenStream) -> TokenStream {
    let parsed_input = parse_macro_input!(input as DeriveInput);

    expand_table_row(parsed_input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_table_row(input: DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
    let struct_ident = input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();
    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "TableRow is only applicable to structs with named fields!",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new(
                struct_ident.span(),
                "TableRow is only applicable to structs with named fields!",
            ))
        }
    };

    let name_field = find_name_column(&fields).ok_or_else(|| {
        syn::Error::new(
            struct_ident.span(),
            "TableRow needs exactly one field marked with #[name_column]!",
        )
    })?;
    let field_names = fields
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .collect::<Vec<_>>();
    let column_titles = field_names
        .iter()
        .map(|ident| column_title(&ident.to_string()))
        .collect::<Vec<_>>();

    Ok(quote! {
        impl #impl_generics crate::output::TableRow for #struct_ident #type_generics #where_clause {
            fn name(&self) -> ::std::string::String {
                ::std::string::ToString::to_string(&self.#name_field)
            }

            fn column_titles() -> ::std::vec::Vec<&'static str> {
                ::std::vec![#(#column_titles),*]
            }

            fn cells(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![#(::std::string::ToString::to_string(&self.#field_names)),*]
            }
        }
    })
}

fn column_title(field_name: &str) -> String {
    field_name.replace('_', " ").to_uppercase()
}

fn find_name_column(fields: &Punctuated<Field, Comma>) -> Option<&Ident> {
    let mut marked = fields.iter().filter(|field| {
        field
            .attrs
            .iter()
            .any(|attribute| attribute.path().is_ident("name_column"))
    });

    match (marked.next(), marked.next()) {
        (Some(field), None) => field.ident.as_ref(),
        _ => None,
    }
}
