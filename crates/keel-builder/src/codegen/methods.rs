use crate::bind::{BindingKind, MethodBinding};
use crate::model::{Container, OpId, ParamLocation, TypeId, TypeRef};
use heck::ToSnakeCase;
use keel_model::{UpdateKind, Verb};
use proc_macro2::TokenStream;
use quote::quote;
use std::collections::HashSet;

use super::CodeGenerator;
use super::types::wrap_container;
use super::utils::{generate_doc_comment, make_ident};

pub(super) fn verb_tokens(verb: Verb) -> TokenStream {
    match verb {
        Verb::Get => quote!(keel_model::Verb::Get),
        Verb::Put => quote!(keel_model::Verb::Put),
        Verb::Post => quote!(keel_model::Verb::Post),
        Verb::Delete => quote!(keel_model::Verb::Delete),
        Verb::Options => quote!(keel_model::Verb::Options),
        Verb::Head => quote!(keel_model::Verb::Head),
        Verb::Patch => quote!(keel_model::Verb::Patch),
    }
}

/// Hands out parameter identifiers that do not clash with each other
struct ArgNames(HashSet<String>);

impl ArgNames {
    fn new() -> Self {
        Self(HashSet::from(["self".to_string()]))
    }

    fn ident(&mut self, wire: &str) -> syn::Ident {
        let snake = wire.to_snake_case();
        let mut candidate = if snake.is_empty() { "arg".to_string() } else { snake };
        let base = candidate.clone();
        let mut n = 2;
        while !self.0.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        make_ident(&candidate)
    }
}

impl CodeGenerator<'_> {
    fn response_tokens(&self, version: &str, response: Option<(TypeRef, Container)>) -> TokenStream {
        match response {
            Some((TypeRef::Named(id), container)) => {
                let inner = self.type_path(version, None, id);
                match container {
                    Container::None | Container::Optional => inner,
                    other => wrap_container(inner, other),
                }
            }
            _ => quote!(serde_json::Value),
        }
    }

    fn bound_method(&self, version: &str, binding: &MethodBinding) -> TokenStream {
        let op = self.build.model.op(binding.op);
        let method = make_ident(&binding.method_name);
        let verb = verb_tokens(op.verb);
        let path = op.path.as_str();
        let response = self.response_tokens(version, op.response);

        let mut names = ArgNames::new();
        let mut args: Vec<TokenStream> = Vec::new();
        let mut calls: Vec<TokenStream> = Vec::new();

        if binding.kind == BindingKind::Instance {
            args.push(quote!(&self));
        }

        for param in op.params.iter().filter(|p| p.location == ParamLocation::Path) {
            let ident = names.ident(&param.name);
            let wire = param.name.as_str();
            let ty = self.scalar_arg_tokens(param.ty);
            args.push(quote!(#ident: #ty));
            calls.push(quote!(.path_param(#wire, #ident)));
        }

        match (binding.kind, op.body()) {
            (BindingKind::Instance, _) => calls.push(quote!(.json_body(self))),
            (BindingKind::Static, Some(body)) => {
                let ident = names.ident(&body.name);
                let inner = self.type_ref_tokens(version, None, body.ty);
                let (ty, call) = match body.container {
                    Container::None => (quote!(&#inner), quote!(.json_body(#ident))),
                    Container::Optional => (quote!(Option<&#inner>), quote!(.maybe_json_body(#ident))),
                    Container::List => (quote!(&[#inner]), quote!(.json_body(#ident))),
                    Container::Map => (
                        quote!(&std::collections::BTreeMap<String, #inner>),
                        quote!(.json_body(#ident)),
                    ),
                };
                args.push(quote!(#ident: #ty));
                calls.push(call);
            }
            (BindingKind::Static, None) => {}
        }

        let query = op
            .params
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
            .collect::<Vec<_>>();
        // required ones are positional, optional ones follow
        let (required, optional): (Vec<_>, Vec<_>) = query.into_iter().partition(|p| p.required);
        for param in required.into_iter().chain(optional) {
            let ident = names.ident(&param.name);
            let wire = param.name.as_str();
            let scalar = self.scalar_arg_tokens(param.ty);
            match param.container {
                Container::List | Container::Map => {
                    args.push(quote!(#ident: &[#scalar]));
                    calls.push(quote!(.query_all(#wire, #ident)));
                }
                _ if param.required => {
                    args.push(quote!(#ident: #scalar));
                    calls.push(quote!(.query(#wire, Some(#ident))));
                }
                _ => {
                    args.push(quote!(#ident: Option<#scalar>));
                    calls.push(quote!(.query(#wire, #ident)));
                }
            }
        }

        let verb_line = format!(" `{} {}`", op.verb, op.path);
        let doc = match op.description.as_deref() {
            Some(description) => {
                let described = generate_doc_comment(Some(description));
                quote! {
                    #described
                    #[doc = ""]
                    #[doc = #verb_line]
                }
            }
            None => quote!(#[doc = #verb_line]),
        };

        quote! {
            #doc
            pub fn #method(#(#args),*) -> keel_model::ApiCall<#response> {
                keel_model::ApiCall::new(#verb, #path)
                    #(#calls)*
            }
        }
    }

    pub(super) fn methods_impl(&self, version: &str, id: TypeId, name: &syn::Ident) -> TokenStream {
        let methods = self.build.bindings.methods(id);
        if methods.is_empty() {
            return quote! {};
        }
        let methods = methods.iter().map(|b| self.bound_method(version, b));
        quote! {
            impl #name {
                #(#methods)*
            }
        }
    }

    fn op_spec(&self, op: OpId) -> TokenStream {
        let op = self.build.model.op(op);
        let verb = verb_tokens(op.verb);
        let path = op.path.as_str();
        let namespaced = op.namespaced;
        quote! {
            keel_model::OpSpec {
                verb: #verb,
                path: #path,
                namespaced: #namespaced,
            }
        }
    }

    pub(super) fn crud_impl(&self, id: TypeId, name: &syn::Ident) -> TokenStream {
        let Some(plan) = self.build.crud.get(&id) else {
            return quote! {};
        };
        let create = self.op_spec(plan.create);
        let delete = self.op_spec(plan.delete);
        let read = match plan.read {
            Some(op) => {
                let spec = self.op_spec(op);
                quote!(Some(#spec))
            }
            None => quote!(None),
        };
        let update = match plan.update {
            Some((op, kind)) => {
                let spec = self.op_spec(op);
                let kind = match kind {
                    UpdateKind::MergePatch => quote!(keel_model::UpdateKind::MergePatch),
                    UpdateKind::Replace => quote!(keel_model::UpdateKind::Replace),
                };
                quote! {
                    Some(keel_model::UpdateOp {
                        op: #spec,
                        kind: #kind,
                    })
                }
            }
            None => quote!(None),
        };

        quote! {
            impl keel_model::Crud for #name {
                const OPS: keel_model::CrudOps = keel_model::CrudOps {
                    create: #create,
                    read: #read,
                    update: #update,
                    delete: #delete,
                };
            }
        }
    }
}
