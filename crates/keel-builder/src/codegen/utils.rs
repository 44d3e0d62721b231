use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;

/// Replace everything that cannot appear in an identifier with `_`
pub(crate) fn sanitize_name(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    match sanitized.chars().next() {
        None => "unknown".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{}", sanitized),
        Some(_) => sanitized,
    }
}

/// Snake-case field name for a schema property.
///
/// JSON-schema keywords such as `$ref` and `$schema` get fixed names, leading
/// dashes are dropped, and `x-kubernetes-*` extensions keep their full prefix so
/// they cannot collide with an ordinary property of the same suffix.
pub(crate) fn property_field_name(wire: &str) -> String {
    let snake = match wire {
        "$ref" => "ref_path".to_string(),
        "$schema" => "schema".to_string(),
        _ => {
            let trimmed = wire.trim_start_matches(['-', '$']);
            match trimmed.strip_prefix("x-kubernetes-") {
                Some(rest) => format!("x_kubernetes_{}", rest.to_snake_case()),
                None => trimmed.to_snake_case(),
            }
        }
    };
    match sanitize_name(&snake) {
        s if s == "unknown" || s.chars().all(|c| c == '_') => "field".to_string(),
        s => s,
    }
}

/// Create an identifier, using a raw identifier for keywords
pub(crate) fn make_ident(s: &str) -> syn::Ident {
    let sanitized = sanitize_name(s);
    // these cannot be raw identifiers
    if matches!(sanitized.as_str(), "self" | "Self" | "super" | "crate" | "_") {
        return syn::Ident::new(&format!("{}_", sanitized), proc_macro2::Span::call_site());
    }
    syn::parse_str::<syn::Ident>(&sanitized)
        .unwrap_or_else(|_| syn::Ident::new_raw(&sanitized, proc_macro2::Span::call_site()))
}

/// Module identifier for a release label or version
pub(crate) fn module_ident(s: &str) -> syn::Ident {
    make_ident(&s.to_ascii_lowercase())
}

/// Generate doc comment from optional description
pub(crate) fn generate_doc_comment(desc: Option<&str>) -> TokenStream {
    match desc.map(str::trim).filter(|d| !d.is_empty()) {
        Some(description) => {
            let lines = description.lines().map(|l| format!(" {}", l));
            quote! { #(#[doc = #lines])* }
        }
        None => quote! {},
    }
}

/// The wire name serde's `rename_all = "camelCase"` derives from a field name
pub(crate) fn serde_camel_case(field: &str) -> String {
    let mut pascal = String::new();
    let mut capitalize = true;
    for ch in field.chars() {
        if ch == '_' {
            capitalize = true;
        } else if capitalize {
            pascal.push(ch.to_ascii_uppercase());
            capitalize = false;
        } else {
            pascal.push(ch);
        }
    }
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_ident() {
        assert_eq!(make_ident("type").to_string(), "r#type");
        assert_eq!(make_ident("self").to_string(), "self_");
        assert_eq!(make_ident("x-kubernetes-list-type").to_string(), "x_kubernetes_list_type");
        assert_eq!(make_ident("1st").to_string(), "_1st");
    }

    #[test]
    fn test_property_field_name() {
        assert_eq!(property_field_name("$ref"), "ref_path");
        assert_eq!(property_field_name("$schema"), "schema");
        assert_eq!(property_field_name("x-kubernetes-list-map-keys"), "x_kubernetes_list_map_keys");
        assert_eq!(property_field_name("x-kubernetes-int-or-string"), "x_kubernetes_int_or_string");
        assert_eq!(property_field_name("-pre"), "pre");
        assert_eq!(property_field_name("hostIPC"), "host_ipc");
        assert_eq!(property_field_name("---"), "field");
        assert_eq!(property_field_name("3scale"), "_3scale");
    }

    #[test]
    fn test_serde_camel_case() {
        assert_eq!(serde_camel_case("api_version"), "apiVersion");
        assert_eq!(serde_camel_case("host_ipc"), "hostIpc");
        assert_eq!(serde_camel_case("ref"), "ref");
    }
}
