use crate::model::{Container, Primitive, TypeId, TypeKind, TypeRef};
use proc_macro2::TokenStream;
use quote::quote;

use super::CodeGenerator;
use super::utils::{make_ident, module_ident};

pub(super) fn primitive_tokens(primitive: Primitive) -> TokenStream {
    match primitive {
        Primitive::String | Primitive::Bytes | Primitive::DateTime => quote!(String),
        Primitive::IntOrString => quote!(keel_model::IntOrString),
        Primitive::Int32 => quote!(i32),
        Primitive::Int64 => quote!(i64),
        Primitive::Number => quote!(f64),
        Primitive::Boolean => quote!(bool),
        Primitive::Json => quote!(serde_json::Value),
    }
}

/// Borrowed form of a primitive, for method arguments
pub(super) fn primitive_arg_tokens(primitive: Primitive) -> TokenStream {
    match primitive {
        Primitive::String | Primitive::Bytes | Primitive::DateTime => quote!(&str),
        Primitive::IntOrString => quote!(&keel_model::IntOrString),
        Primitive::Json => quote!(&serde_json::Value),
        other => primitive_tokens(other),
    }
}

pub(super) fn wrap_container(inner: TokenStream, container: Container) -> TokenStream {
    match container {
        Container::None => inner,
        Container::Optional => quote!(Option<#inner>),
        Container::List => quote!(Vec<#inner>),
        Container::Map => quote!(std::collections::BTreeMap<String, #inner>),
    }
}

impl CodeGenerator<'_> {
    /// Path to `id` from inside `version`'s module.
    ///
    /// When `referrer` is the partner of a split type, the base is named instead.
    pub(super) fn type_path(
        &self,
        version: &str,
        referrer: Option<TypeId>,
        id: TypeId,
    ) -> TokenStream {
        let ty = self.build.model.ty(id);
        let name = referrer
            .and_then(|r| self.build.order.base_ref(r, id))
            .unwrap_or_else(|| self.build.names.resolved(id));
        let ident = make_ident(name);
        if ty.version == version {
            quote!(#ident)
        } else {
            let module = module_ident(&ty.version);
            quote!(super::#module::#ident)
        }
    }

    pub(super) fn type_ref_tokens(
        &self,
        version: &str,
        referrer: Option<TypeId>,
        ty: TypeRef,
    ) -> TokenStream {
        match ty {
            TypeRef::Named(id) => self.type_path(version, referrer, id),
            TypeRef::Primitive(p) => primitive_tokens(p),
        }
    }

    /// Argument type of a scalar path or query parameter
    pub(super) fn scalar_arg_tokens(&self, ty: TypeRef) -> TokenStream {
        let primitive = match ty {
            TypeRef::Primitive(p) => p,
            TypeRef::Named(id) => match self.build.model.ty(id).kind {
                TypeKind::Scalar(p) => p,
                // objects are passed in their string form
                TypeKind::Object => Primitive::String,
            },
        };
        primitive_arg_tokens(primitive)
    }
}
