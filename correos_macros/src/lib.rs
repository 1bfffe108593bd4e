//! Attribute-style target declaration for `correos`.
//!
//! `#[targets]` goes on an inherent `impl` block. Methods marked
//! `#[request(...)]` or `#[notification(...)]` become target descriptors and
//! the block gains an `impl correos::Owner`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
    FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Path, Result as SynResult, ReturnType,
    Token, Type,
};

struct TargetsArgs {
    owner: Option<LitStr>,
    labeled: bool,
    factory: Option<Path>,
}

impl Parse for TargetsArgs {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let mut args = TargetsArgs {
            owner: None,
            labeled: false,
            factory: None,
        };
        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            match ident.to_string().as_str() {
                "labeled" => args.labeled = true,
                "owner" => {
                    input.parse::<Token![=]>()?;
                    args.owner = Some(input.parse()?);
                }
                "factory" => {
                    input.parse::<Token![=]>()?;
                    args.factory = Some(input.parse()?);
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unexpected targets argument `{other}`"),
                    ))
                }
            }
            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

struct NameValue {
    ident: Ident,
    value: LitStr,
}

impl Parse for NameValue {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let ident: Ident = input.parse()?;
        input.parse::<Token![=]>()?;
        let value: LitStr = input.parse()?;
        Ok(NameValue { ident, value })
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Request,
    Notification,
}

struct TargetAttr {
    kind: Kind,
    name: String,
    description: String,
}

/// Remove the first `#[request]` / `#[notification]` attribute from `method` and parse it.
fn take_target_attr(method: &mut ImplItemFn) -> SynResult<Option<TargetAttr>> {
    let Some(position) = method
        .attrs
        .iter()
        .position(|a| a.path().is_ident("request") || a.path().is_ident("notification"))
    else {
        return Ok(None);
    };
    let attr = method.attrs.remove(position);
    let kind = if attr.path().is_ident("request") {
        Kind::Request
    } else {
        Kind::Notification
    };

    let mut target = TargetAttr {
        kind,
        name: String::new(),
        description: String::new(),
    };
    if let syn::Meta::List(list) = &attr.meta {
        let pairs = list.parse_args_with(Punctuated::<NameValue, Token![,]>::parse_terminated)?;
        for pair in pairs {
            match pair.ident.to_string().as_str() {
                "name" => target.name = pair.value.value(),
                "description" => target.description = pair.value.value(),
                other => {
                    return Err(syn::Error::new(
                        pair.ident.span(),
                        format!("unexpected target argument `{other}`"),
                    ))
                }
            }
        }
    }
    Ok(Some(target))
}

fn returns_result(output: &ReturnType) -> bool {
    if let ReturnType::Type(_, ty) = output {
        if let Type::Path(p) = ty.as_ref() {
            if let Some(seg) = p.path.segments.last() {
                return seg.ident == "Result";
            }
        }
    }
    false
}

fn descriptor_tokens(
    self_ty: &Type,
    method: &ImplItemFn,
    target: &TargetAttr,
) -> SynResult<TokenStream2> {
    let sig = &method.sig;
    if sig.asyncness.is_some() || !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            sig,
            "target methods must be synchronous and non-generic",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new_spanned(
                sig,
                "target methods must take `&self`",
            ))
        }
    }

    let mut arg_idents = Vec::new();
    let mut arg_types = Vec::new();
    for (index, input) in inputs.enumerate() {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new_spanned(input, "unexpected receiver"));
        };
        if let Type::Reference(_) = pat_type.ty.as_ref() {
            return Err(syn::Error::new_spanned(
                &pat_type.ty,
                "target arguments are decoded by value; use an owned type",
            ));
        }
        arg_idents.push(format_ident!("__arg{}", index));
        arg_types.push(pat_type.ty.as_ref().clone());
    }

    let arity = arg_idents.len();
    let indices = 0..arity;
    let method_ident = &sig.ident;
    let handler_name = LitStr::new(&method_ident.to_string(), Span::call_site());
    let name = LitStr::new(&target.name, Span::call_site());
    let description = LitStr::new(&target.description, Span::call_site());
    let kind = match target.kind {
        Kind::Request => quote! { ::correos::descriptor::TargetKind::Request },
        Kind::Notification => quote! { ::correos::descriptor::TargetKind::Notification },
    };
    let map_failure = if returns_result(&sig.output) {
        quote! { let output = output.map_err(::correos::error::HandlerError::failed)?; }
    } else {
        quote! {}
    };

    Ok(quote! {
        ::correos::descriptor::TargetDescriptor::builder::<#self_ty, _>(#kind, #handler_name, factory)
            .owner(<#self_ty as ::correos::discovery::Owner>::owner_id())
            .name(#name)
            .description(#description)
            .handler(|this: &#self_ty, args: &[::correos::Value]| {
                ::correos::descriptor::expect_arity(args, #arity)?;
                #(let #arg_idents: #arg_types = ::correos::descriptor::arg(args, #indices)?;)*
                let output = this.#method_ident(#(#arg_idents),*);
                #map_failure
                ::correos::descriptor::reply(output)
            })
    })
}

fn expand(args: TargetsArgs, mut item: ItemImpl) -> SynResult<TokenStream2> {
    if item.trait_.is_some() {
        return Err(syn::Error::new_spanned(
            &item.self_ty,
            "#[targets] goes on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[targets] does not support generic owners",
        ));
    }

    let self_ty = item.self_ty.as_ref().clone();
    let mut descriptors = Vec::new();
    for impl_item in &mut item.items {
        if let ImplItem::Fn(method) = impl_item {
            if let Some(target) = take_target_attr(method)? {
                descriptors.push(descriptor_tokens(&self_ty, method, &target)?);
            }
        }
    }

    let owner_id = match &args.owner {
        Some(owner) => quote! { #owner },
        None => {
            let type_name = quote!(#self_ty).to_string().replace(' ', "");
            let type_name = LitStr::new(&type_name, Span::call_site());
            quote! { ::core::concat!(::core::module_path!(), "::", #type_name) }
        }
    };
    let labeled = args.labeled;
    let factory = match &args.factory {
        Some(path) => quote! {
            |_owner: &::correos::descriptor::OwnerId|
                -> ::std::result::Result<::correos::descriptor::Receiver, ::correos::error::ConstructionError> {
                let receiver: ::correos::descriptor::Receiver = ::std::sync::Arc::new(#path()?);
                ::std::result::Result::Ok(receiver)
            }
        },
        None => quote! { ::correos::descriptor::DefaultFactory::<#self_ty>::new() },
    };
    let build = descriptors.iter().map(|descriptor| {
        quote! {
            {
                let factory = #factory;
                #descriptor
            }
        }
    });

    Ok(quote! {
        #item

        impl ::correos::discovery::Owner for #self_ty {
            const LABELED: bool = #labeled;

            fn owner_id() -> ::correos::descriptor::OwnerId {
                ::correos::descriptor::OwnerId::new(#owner_id)
            }

            fn targets() -> ::std::vec::Vec<::correos::descriptor::TargetDescriptor> {
                ::std::vec![#(#build),*]
            }
        }
    })
}

/// Declare the request and notification targets of a type.
///
/// ```rust,ignore
/// #[targets(owner = "Inventory", labeled, factory = Inventory::open)]
/// impl Inventory {
///     #[request(name = "stock", description = "Units on hand")]
///     fn stock(&self, sku: String) -> u32 { ... }
///
///     #[notification(name = "restocked")]
///     fn on_restock(&self, sku: String, units: u32) { ... }
/// }
/// ```
///
/// - `owner`: owner identity, default `module_path!()::Type`
/// - `labeled`: opt in under `RegistrationPolicy::LabeledOnly`
/// - `factory`: `fn() -> Result<Self, ConstructionError>`, default `Self::default()`
///
/// An omitted `name` is left empty and resolved by `EmptyNameHandling`.
/// Methods returning a `Result` report `Err` as `HandlerError::Failed`.
#[proc_macro_attribute]
pub fn targets(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TargetsArgs);
    let item = parse_macro_input!(item as ItemImpl);
    match expand(args, item) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}
