use crate::model::{Container, Primitive, PropertyDef, TypeId, TypeKind, TypeRef};
use crate::order::Emit;
use proc_macro2::TokenStream;
use quote::quote;
use std::collections::HashSet;

use super::CodeGenerator;
use super::types::{primitive_tokens, wrap_container};
use super::utils::{generate_doc_comment, make_ident, property_field_name, serde_camel_case};

/// Field name of the embedded base on a split type
pub(super) const BASE_FIELD: &str = "base";

fn unraw(ident: &syn::Ident) -> String {
    let s = ident.to_string();
    s.strip_prefix("r#").map(str::to_string).unwrap_or(s)
}

impl CodeGenerator<'_> {
    /// Field identifiers of every property of `id`, deduplicated
    pub(super) fn field_idents(&self, id: TypeId) -> Vec<syn::Ident> {
        let ty = self.build.model.ty(id);
        let mut seen: HashSet<String> = HashSet::new();
        if self.build.order.split_of(id).is_some() {
            seen.insert(BASE_FIELD.to_string());
        }
        ty.properties
            .iter()
            .map(|prop| {
                let snake = property_field_name(&prop.name);
                let mut candidate = make_ident(&snake);
                let mut n = 2;
                while !seen.insert(unraw(&candidate)) {
                    candidate = make_ident(&format!("{}_{}", snake, n));
                    n += 1;
                }
                candidate
            })
            .collect()
    }

    /// Expression reaching property `index` of `id` from `root` (`self` or a local)
    pub(super) fn field_access(&self, root: TokenStream, id: TypeId, index: usize) -> TokenStream {
        let ident = &self.field_idents(id)[index];
        match self.build.order.split_of(id) {
            Some(split) if !split.is_closing(index) => {
                let base = make_ident(BASE_FIELD);
                quote!(#root.#base.#ident)
            }
            _ => quote!(#root.#ident),
        }
    }

    fn field(
        &self,
        owner: TypeId,
        version: &str,
        prop: &PropertyDef,
        ident: &syn::Ident,
    ) -> TokenStream {
        let doc = generate_doc_comment(prop.description.as_deref());
        let self_ref = prop.ty.named() == Some(owner);
        let mut inner = self.type_ref_tokens(version, Some(owner), prop.ty);
        let mut container = prop.container;
        if self_ref && matches!(container, Container::None | Container::Optional) {
            inner = quote!(Box<#inner>);
            // a required self-reference has no finite value
            container = Container::Optional;
        }
        let ty = wrap_container(inner, container);

        let wire = prop.name.as_str();
        let rename = (serde_camel_case(&unraw(ident)) != wire).then(|| quote! {
            #[serde(rename = #wire)]
        });
        let skip = match container {
            Container::None => quote! {},
            Container::Optional => quote! {
                #[serde(default, skip_serializing_if = "Option::is_none")]
            },
            Container::List => quote! {
                #[serde(default, skip_serializing_if = "Vec::is_empty")]
            },
            Container::Map => quote! {
                #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
            },
        };

        quote! {
            #doc
            #rename
            #skip
            pub #ident: #ty,
        }
    }

    fn struct_tokens(
        &self,
        name: &syn::Ident,
        doc: TokenStream,
        fields: Vec<TokenStream>,
    ) -> TokenStream {
        quote! {
            #doc
            #[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Default)]
            #[serde(rename_all = "camelCase")]
            pub struct #name {
                #(#fields)*
            }
        }
    }

    /// Generate one emitted item with its inherent and trait impls
    pub(super) fn generate_item(&self, version: &str, emit: Emit) -> TokenStream {
        let id = emit.type_id();
        let ty = self.build.model.ty(id);
        let name = make_ident(self.build.names.resolved(id));
        let doc = generate_doc_comment(ty.description.as_deref());

        if let TypeKind::Scalar(primitive) = ty.kind {
            let target = primitive_tokens(primitive);
            return quote! {
                #doc
                pub type #name = #target;
            };
        }

        let idents = self.field_idents(id);
        let fields_where = |keep: &dyn Fn(usize) -> bool| -> Vec<TokenStream> {
            ty.properties
                .iter()
                .enumerate()
                .filter(|(i, _)| keep(*i))
                .map(|(i, prop)| self.field(id, version, prop, &idents[i]))
                .collect()
        };

        let body = match (emit, self.build.order.split_of(id)) {
            (Emit::Base(_), Some(split)) => {
                let base_name = make_ident(&split.base_name);
                let base_doc = format!(" Properties of [`{}`] that do not close its reference cycle", name);
                let fields = fields_where(&|i: usize| !split.is_closing(i));
                return self.struct_tokens(&base_name, quote!(#[doc = #base_doc]), fields);
            }
            (Emit::Derived(_), Some(split)) => {
                let base_name = make_ident(&split.base_name);
                let base = make_ident(BASE_FIELD);
                let mut fields = vec![quote! {
                    #[serde(flatten)]
                    pub #base: #base_name,
                }];
                fields.extend(fields_where(&|i: usize| split.is_closing(i)));
                let item = self.struct_tokens(&name, doc, fields);
                quote! {
                    #item

                    impl std::ops::Deref for #name {
                        type Target = #base_name;

                        fn deref(&self) -> &#base_name {
                            &self.#base
                        }
                    }

                    impl std::ops::DerefMut for #name {
                        fn deref_mut(&mut self) -> &mut #base_name {
                            &mut self.#base
                        }
                    }
                }
            }
            _ => self.struct_tokens(&name, doc, fields_where(&|_: usize| true)),
        };

        let document = self.document_impl(id, &name);
        let methods = self.methods_impl(version, id, &name);
        let crud = self.crud_impl(id, &name);
        quote! {
            #body
            #document
            #methods
            #crud
        }
    }

    /// Read an optional string field of `meta_ty` through `meta`
    fn string_accessor(&self, meta: TokenStream, meta_ty: TypeId, field: &str) -> Option<TokenStream> {
        let ty = self.build.model.ty(meta_ty);
        let index = ty.properties.iter().position(|p| p.name == field)?;
        let prop = &ty.properties[index];
        if prop.ty != TypeRef::Primitive(Primitive::String) {
            return None;
        }
        let access = self.field_access(meta, meta_ty, index);
        match prop.container {
            Container::Optional => Some(quote!(#access.as_deref())),
            Container::None => Some(quote!(Some(#access.as_str()))),
            _ => None,
        }
    }

    fn metadata_accessors(&self, id: TypeId) -> TokenStream {
        let ty = self.build.model.ty(id);
        let Some(index) = ty.properties.iter().position(|p| p.name == "metadata") else {
            return quote! {};
        };
        let prop = &ty.properties[index];
        let Some(meta_ty) = prop.ty.named() else {
            return quote! {};
        };
        let field = self.field_access(quote!(self), id, index);
        let meta = match prop.container {
            Container::Optional => quote!(#field.as_ref()?),
            Container::None => field,
            _ => return quote! {},
        };

        let name = self.string_accessor(meta.clone(), meta_ty, "name").map(|expr| {
            quote! {
                fn name(&self) -> Option<&str> {
                    #expr
                }
            }
        });
        let namespace = self.string_accessor(meta, meta_ty, "namespace").map(|expr| {
            quote! {
                fn namespace(&self) -> Option<&str> {
                    #expr
                }
            }
        });
        quote! { #name #namespace }
    }

    /// Assign a string marker property in `new()`
    fn marker_assignment(&self, id: TypeId, wire: &str, value: &str) -> TokenStream {
        let ty = self.build.model.ty(id);
        let Some(index) = ty.properties.iter().position(|p| p.name == wire) else {
            return quote! {};
        };
        let prop = &ty.properties[index];
        if prop.ty != TypeRef::Primitive(Primitive::String) {
            return quote! {};
        }
        let target = self.field_access(quote!(this), id, index);
        match prop.container {
            Container::Optional => quote! { #target = Some(#value.into()); },
            Container::None => quote! { #target = #value.into(); },
            _ => quote! {},
        }
    }

    fn document_impl(&self, id: TypeId, name: &syn::Ident) -> TokenStream {
        let ty = self.build.model.ty(id);
        let Some(info) = &ty.document else {
            return quote! {};
        };
        let api_version = info.api_version.as_str();
        let kind = info.kind.as_str();
        let accessors = self.metadata_accessors(id);
        let set_api_version = self.marker_assignment(id, "apiVersion", api_version);
        let set_kind = self.marker_assignment(id, "kind", kind);
        let new_doc = format!(" An empty `{}` with `apiVersion` and `kind` set", kind);

        quote! {
            impl keel_model::Document for #name {
                const API_VERSION: &'static str = #api_version;
                const KIND: &'static str = #kind;

                #accessors
            }

            impl #name {
                #[doc = #new_doc]
                pub fn new() -> Self {
                    let mut this = Self::default();
                    #set_api_version
                    #set_kind
                    this
                }
            }
        }
    }
}
