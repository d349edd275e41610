use crate::models::Language;

/// Tree-sitter query source per language. Capture names map to
/// [`crate::models::BlockKind`] via `BlockKind::from_capture`.
pub fn query_source(language: Language) -> Option<&'static str> {
    Some(match language {
        Language::Python => {
            r#"
            (function_definition) @function
            (decorated_definition) @function
            (class_definition) @class
            "#
        }
        Language::Rust => {
            r#"
            (function_item) @function
            (struct_item) @struct
            (enum_item) @enum
            (trait_item) @trait
            (impl_item) @impl
            (mod_item) @module
            "#
        }
        Language::JavaScript => {
            r#"
            (function_declaration) @function
            (generator_function_declaration) @function
            (method_definition) @method
            (class_declaration) @class
            "#
        }
        Language::TypeScript | Language::Tsx => {
            r#"
            (function_declaration) @function
            (method_definition) @method
            (class_declaration) @class
            (interface_declaration) @interface
            (enum_declaration) @enum
            "#
        }
        Language::Go => {
            r#"
            (function_declaration) @function
            (method_declaration) @method
            (type_declaration) @struct
            "#
        }
        Language::Java => {
            r#"
            (method_declaration) @method
            (constructor_declaration) @method
            (class_declaration) @class
            (interface_declaration) @interface
            (enum_declaration) @enum
            "#
        }
        Language::C => {
            r#"
            (function_definition) @function
            (struct_specifier) @struct
            (enum_specifier) @enum
            "#
        }
        Language::Cpp => {
            r#"
            (function_definition) @function
            (class_specifier) @class
            (struct_specifier) @struct
            (enum_specifier) @enum
            "#
        }
        Language::Markdown | Language::Text | Language::Other => return None,
    })
}
