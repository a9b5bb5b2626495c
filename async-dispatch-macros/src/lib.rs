//! Procedural macros for async-dispatch

use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use proc_macro2::{Ident, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use std::collections::BTreeMap;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Action)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(action), supports(enum_any))]
struct ActionOpts {
    ident: syn::Ident,
    data: darling::ast::Data<ActionVariant, ()>,

    /// Enable category inference from the leading word of variant names
    #[darling(default)]
    infer_categories: bool,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(action))]
struct ActionVariant {
    ident: syn::Ident,
    fields: darling::ast::Fields<()>,

    /// Variant wraps an `AsyncAction` and routes its phases
    #[darling(default)]
    async_op: bool,

    /// Fully qualified type string for a plain variant
    #[darling(default)]
    action_type: Option<String>,

    /// Explicit category override
    #[darling(default)]
    category: Option<String>,

    /// Exclude from category inference
    #[darling(default)]
    skip_category: bool,
}

const PHASES: [(&str, &str); 5] = [
    ("Init", "Init"),
    ("Request", "Request"),
    ("Success", "Success"),
    ("Failure", "Failure"),
    ("Invalidate", "InvalidateData"),
];

/// Split a PascalCase string into parts
fn split_pascal_case(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for ch in s.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            parts.push(current);
            current = String::new();
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Convert snake_case to PascalCase
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

/// The module an action belongs to: its leading word, lowercased.
///
/// `ContractLoad` -> `contract`, `IspCreationProgress` -> `isp`.
/// Single-word names stay uncategorized.
fn infer_category(name: &str) -> Option<String> {
    let parts = split_pascal_case(name);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[0].to_lowercase())
}

fn pattern(name: &Ident, variant: &ActionVariant) -> TokenStream2 {
    let ident = &variant.ident;
    match variant.fields.style {
        darling::ast::Style::Unit => quote! { #name::#ident },
        darling::ast::Style::Tuple => quote! { #name::#ident(..) },
        darling::ast::Style::Struct => quote! { #name::#ident { .. } },
    }
}

fn check_async_variant(variant: &ActionVariant) -> Result<(), syn::Error> {
    let single_tuple =
        variant.fields.style == darling::ast::Style::Tuple && variant.fields.len() == 1;
    if variant.async_op && !single_tuple {
        return Err(syn::Error::new_spanned(
            &variant.ident,
            "#[action(async_op)] requires a single-field tuple variant wrapping an AsyncAction",
        ));
    }
    if variant.async_op && variant.action_type.is_some() {
        return Err(syn::Error::new_spanned(
            &variant.ident,
            "#[action(async_op)] variants take their type from the AsyncAction",
        ));
    }
    Ok(())
}

/// Derive macro for the Action trait
///
/// Generates:
/// - `Action::name()`: the variant name, suffixed with the phase for async
///   variants (`ContractLoadRequest`)
/// - `Action::action_type()`: the phase type string for async variants,
///   `#[action(action_type = "...")]` or the name for plain ones
/// - `AsyncActionSet`: routes the phases of `#[action(async_op)]` variants
///
/// With `#[action(infer_categories)]`, also generates:
/// - `category() -> Option<&'static str>` - Get action's category
/// - `category_enum() -> {Name}Category` - Get category as enum
/// - `is_{category}()` predicates for each category
/// - `{Name}Category` enum with all discovered categories
///
/// # Example
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// #[action(infer_categories)]
/// enum MyAction {
///     #[action(action_type = "mth/app/APP_BOOTSTRAPPED")]
///     AppBootstrapped,
///     #[action(async_op)]
///     ContractLoad(AsyncAction<String, Contract>),
///     Tick, // uncategorized
/// }
///
/// let action = MyAction::ContractLoad(LOAD_CONTRACT.request("c1".into(), None));
/// assert_eq!(action.name(), "ContractLoadRequest");
/// assert_eq!(action.action_type(), "mth/contract/LOAD_REQUEST");
/// assert_eq!(action.category(), Some("contract"));
/// assert!(action.is_contract());
/// ```
#[proc_macro_derive(Action, attributes(action))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match ActionOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;

    let variants = match &opts.data {
        darling::ast::Data::Enum(variants) => variants,
        _ => {
            return syn::Error::new_spanned(&input, "Action can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    for variant in variants.iter() {
        if let Err(err) = check_async_variant(variant) {
            return err.to_compile_error().into();
        }
    }

    let name_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        if v.async_op {
            let phase_arms = PHASES.iter().map(|(subtype, suffix)| {
                let subtype = format_ident!("{}", subtype);
                let full = format!("{}{}", ident, suffix);
                quote! { ::async_dispatch::AsyncSubtype::#subtype => #full }
            });
            quote! {
                #name::#ident(inner) => match inner.subtype() {
                    #(#phase_arms,)*
                }
            }
        } else {
            let pattern = pattern(name, v);
            let variant_str = ident.to_string();
            quote! { #pattern => #variant_str }
        }
    });

    let type_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        if v.async_op {
            quote! { #name::#ident(inner) => inner.action_type() }
        } else {
            let pattern = pattern(name, v);
            match &v.action_type {
                Some(action_type) => quote! { #pattern => #action_type },
                None => {
                    let variant_str = ident.to_string();
                    quote! { #pattern => #variant_str }
                }
            }
        }
    });

    let async_variants: Vec<&Ident> = variants
        .iter()
        .filter(|v| v.async_op)
        .map(|v| &v.ident)
        .collect();
    let plain_fallback = if async_variants.len() < variants.len() {
        quote! { _ => ::core::option::Option::None, }
    } else {
        quote! {}
    };

    let mut expanded = quote! {
        impl ::async_dispatch::Action for #name {
            fn name(&self) -> &'static str {
                match self {
                    #(#name_arms,)*
                }
            }

            fn action_type(&self) -> &'static str {
                match self {
                    #(#type_arms,)*
                }
            }
        }

        impl ::async_dispatch::AsyncActionSet for #name {
            fn subtype(&self) -> ::core::option::Option<::async_dispatch::AsyncSubtype> {
                match self {
                    #(#name::#async_variants(inner) => ::async_dispatch::AsyncActionSet::subtype(inner),)*
                    #plain_fallback
                }
            }

            fn subpath(&self) -> ::core::option::Option<&::async_dispatch::SubPath> {
                match self {
                    #(#name::#async_variants(inner) => ::async_dispatch::AsyncActionSet::subpath(inner),)*
                    #plain_fallback
                }
            }

            fn async_error(&self) -> ::core::option::Option<&::async_dispatch::FriendlyError> {
                match self {
                    #(#name::#async_variants(inner) => ::async_dispatch::AsyncActionSet::async_error(inner),)*
                    #plain_fallback
                }
            }

            fn resolve_init(
                &self,
                now: ::async_dispatch::Timestamp,
            ) -> ::core::option::Option<Self> {
                match self {
                    #(#name::#async_variants(inner) => {
                        ::async_dispatch::AsyncActionSet::resolve_init(inner, now).map(#name::#async_variants)
                    })*
                    #plain_fallback
                }
            }
        }
    };

    if opts.infer_categories {
        let mut categories: BTreeMap<String, Vec<&ActionVariant>> = BTreeMap::new();
        let mut variant_categories: Vec<(&ActionVariant, Option<String>)> = Vec::new();

        for v in variants.iter() {
            let cat = if v.skip_category {
                None
            } else if let Some(ref explicit_cat) = v.category {
                Some(explicit_cat.clone())
            } else {
                infer_category(&v.ident.to_string())
            };

            if let Some(ref category) = cat {
                categories.entry(category.clone()).or_default().push(v);
            }
            variant_categories.push((v, cat));
        }

        let category_arms: Vec<_> = variant_categories
            .iter()
            .map(|(variant, cat)| {
                let pattern = pattern(name, variant);
                let cat_expr = match cat {
                    Some(c) => quote! { ::core::option::Option::Some(#c) },
                    None => quote! { ::core::option::Option::None },
                };
                quote! { #pattern => #cat_expr }
            })
            .collect();

        let category_enum_name = format_ident!("{}Category", name);
        let category_variants: Vec<_> = categories
            .keys()
            .map(|c| format_ident!("{}", to_pascal_case(c)))
            .collect();
        let category_variant_names: Vec<_> = categories.keys().cloned().collect();

        let category_enum_arms: Vec<_> = variant_categories
            .iter()
            .map(|(variant, cat)| {
                let pattern = pattern(name, variant);
                let cat_variant = match cat {
                    Some(c) => format_ident!("{}", to_pascal_case(c)),
                    None => format_ident!("Uncategorized"),
                };
                quote! { #pattern => #category_enum_name::#cat_variant }
            })
            .collect();

        let predicates: Vec<_> = categories
            .iter()
            .map(|(cat, members)| {
                let predicate_name = format_ident!("is_{}", cat);
                let patterns: Vec<_> = members.iter().map(|v| pattern(name, v)).collect();
                let doc = format!(
                    "Returns true if this action belongs to the `{}` category.",
                    cat
                );

                quote! {
                    #[doc = #doc]
                    pub fn #predicate_name(&self) -> bool {
                        matches!(self, #(#patterns)|*)
                    }
                }
            })
            .collect();

        let category_enum_doc = format!(
            "Action categories for [`{}`].\n\n\
             Use [`{}::category_enum()`] to get the category of an action.",
            name, name
        );

        expanded = quote! {
            #expanded

            #[doc = #category_enum_doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum #category_enum_name {
                #(#category_variants,)*
                /// Actions that don't belong to any specific category.
                Uncategorized,
            }

            impl #category_enum_name {
                /// Get all category values
                pub fn all() -> &'static [Self] {
                    &[#(Self::#category_variants,)* Self::Uncategorized]
                }

                /// Get category name as string
                pub fn name(&self) -> &'static str {
                    match self {
                        #(Self::#category_variants => #category_variant_names,)*
                        Self::Uncategorized => "uncategorized",
                    }
                }
            }

            impl #name {
                /// Get the action's category (if categorized)
                pub fn category(&self) -> ::core::option::Option<&'static str> {
                    match self {
                        #(#category_arms,)*
                    }
                }

                /// Get the category as an enum value
                pub fn category_enum(&self) -> #category_enum_name {
                    match self {
                        #(#category_enum_arms,)*
                    }
                }

                #(#predicates)*
            }

            impl ::async_dispatch::ActionCategory for #name {
                fn category(&self) -> ::core::option::Option<&'static str> {
                    #name::category(self)
                }
            }
        };
    }

    TokenStream::from(expanded)
}
