//! Language module: which pipeline a file goes through and what surrounds its code.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::compiler::{component_name, MarkupCompiler, TsxCompiler};
use super::generator::{first_statement_offset, generate, GenerateOptions, GeneratedCode, SourceParts};
use super::mapping::{Capabilities, MappingSegment, OffsetMapping};
use super::{SyntheticSource, VirtualFileKind};
use crate::parser::INLINE_ATTRIBUTE;

/// Runtime globals every component can reference without importing.
pub const AMBIENT_DECLARATIONS: &str = r#"
declare const Astro: Readonly<{
    props: Record<string, any>;
    params: Record<string, string | undefined>;
    request: Request;
    url: URL;
    site: URL | undefined;
    generator: string;
    cookies: any;
    locals: Record<string, any>;
    slots: Record<string, any> & {
        has(name: string): boolean;
        render(name: string, args?: any[]): Promise<string>;
    };
    redirect(path: string, status?: number): Response;
    self: (props: Record<string, any>) => any;
}>;
declare const Fragment: any;
declare namespace JSX {
    type Element = any;
    interface IntrinsicElements {
        [name: string]: Record<string, any>;
    }
}
"#;

/// How a file is turned into synthetic sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageKind {
    /// Frontmatter, markup and embedded blocks.
    Astro,
    /// A component from another framework, served by a registered integration.
    Framework(String),
}

/// A component framework whose files can be imported from markup.
pub trait FrameworkIntegration: Send + Sync {
    /// Produce checkable code exporting the component as `class_name`.
    fn to_synthetic_source(&self, text: &str, class_name: &str) -> String;
}

/// Exposes a framework component as a class accepting any props.
///
/// Used when nothing knows the framework's own syntax; imports of the component
/// still resolve and type-check.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropsShim;

impl FrameworkIntegration for PropsShim {
    fn to_synthetic_source(&self, _text: &str, class_name: &str) -> String {
        format!(
            "export default class {class_name} {{\n    constructor(_props: Record<string, any>) {{}}\n}}\n"
        )
    }
}

/// Integrations keyed by file extension.
#[derive(Clone, Default)]
pub struct FrameworkRegistry {
    integrations: BTreeMap<String, Arc<dyn FrameworkIntegration>>,
}

impl std::fmt::Debug for FrameworkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.integrations.keys()).finish()
    }
}

impl FrameworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry serving each extension with [`PropsShim`].
    pub fn with_shims<S: AsRef<str>>(extensions: &[S]) -> Self {
        let mut registry = Self::new();
        for extension in extensions {
            registry.register(extension.as_ref(), Arc::new(PropsShim));
        }
        registry
    }

    /// Register an integration; a later registration for the same extension wins.
    pub fn register(&mut self, extension: &str, integration: Arc<dyn FrameworkIntegration>) {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.integrations.insert(extension, integration);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn FrameworkIntegration>> {
        self.integrations.get(&extension.to_ascii_lowercase())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.integrations.keys().map(String::as_str)
    }
}

/// Everything needed to turn any supported file into synthetic sources.
#[derive(Clone)]
pub struct LanguageModule {
    compiler: Arc<dyn MarkupCompiler>,
    inline_attributes: Vec<String>,
    ambient_declarations: String,
    frameworks: FrameworkRegistry,
}

impl std::fmt::Debug for LanguageModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModule")
            .field("inline_attributes", &self.inline_attributes)
            .field("frameworks", &self.frameworks)
            .finish_non_exhaustive()
    }
}

impl Default for LanguageModule {
    fn default() -> Self {
        let inline_attributes = vec![INLINE_ATTRIBUTE.to_string()];
        Self {
            compiler: Arc::new(TsxCompiler::new(inline_attributes.clone())),
            inline_attributes,
            ambient_declarations: AMBIENT_DECLARATIONS.to_string(),
            frameworks: FrameworkRegistry::new(),
        }
    }
}

impl LanguageModule {
    /// Built-in compiler configured with the given inline attributes.
    pub fn new(inline_attributes: Vec<String>) -> Self {
        Self {
            compiler: Arc::new(TsxCompiler::new(inline_attributes.clone())),
            inline_attributes,
            ..Self::default()
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn MarkupCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_frameworks(mut self, frameworks: FrameworkRegistry) -> Self {
        self.frameworks = frameworks;
        self
    }

    /// Append declarations after the built-in globals.
    pub fn with_extra_declarations(mut self, declarations: &str) -> Self {
        if !declarations.is_empty() {
            if !self.ambient_declarations.ends_with('\n') {
                self.ambient_declarations.push('\n');
            }
            self.ambient_declarations.push_str(declarations);
        }
        self
    }

    pub fn inline_attributes(&self) -> &[String] {
        &self.inline_attributes
    }

    pub fn ambient_declarations(&self) -> &str {
        &self.ambient_declarations
    }

    pub fn frameworks(&self) -> &FrameworkRegistry {
        &self.frameworks
    }

    pub fn kind_of(&self, file_name: &str) -> LanguageKind {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if self.frameworks.get(extension).is_some() {
            LanguageKind::Framework(extension.to_ascii_lowercase())
        } else {
            LanguageKind::Astro
        }
    }

    /// Synthetic sources for a parsed component document.
    pub fn generate(&self, parts: SourceParts<'_>, file_name: &str, version: u64) -> GeneratedCode {
        generate(
            self.compiler.as_ref(),
            parts,
            GenerateOptions {
                file_name,
                version,
                inline_attributes: &self.inline_attributes,
                ambient_declarations: &self.ambient_declarations,
            },
        )
    }

    /// Synthetic source for a framework component, or `None` when no integration
    /// serves the extension.
    pub fn generate_framework(
        &self,
        text: &str,
        file_name: &str,
        extension: &str,
        version: u64,
    ) -> Option<GeneratedCode> {
        let integration = self.frameworks.get(extension)?;
        let code = integration.to_synthetic_source(text, &component_name(file_name));
        let anchor = first_statement_offset(&code);
        let mapping = OffsetMapping::new(vec![MappingSegment::new(
            0..0,
            anchor..anchor,
            Capabilities::diagnostics_only(),
        )]);
        Some(GeneratedCode {
            primary: SyntheticSource::new(
                format!("{file_name}.tsx"),
                VirtualFileKind::Primary,
                code,
                version,
                mapping,
            ),
            satellites: Vec::new(),
            styles: Vec::new(),
            diagnostics: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_extensions_are_case_insensitive() {
        let module = LanguageModule::default().with_frameworks(FrameworkRegistry::with_shims(&[".Vue", "svelte"]));
        assert_eq!(
            module.kind_of("/src/Counter.VUE"),
            LanguageKind::Framework("vue".to_string())
        );
        assert_eq!(module.kind_of("/src/Page.astro"), LanguageKind::Astro);
        assert_eq!(module.frameworks().extensions().collect::<Vec<_>>(), vec!["svelte", "vue"]);
    }

    #[test]
    fn framework_source_uses_class_name_and_anchor() {
        let module = LanguageModule::default().with_frameworks(FrameworkRegistry::with_shims(&["svelte"]));
        let generated = module
            .generate_framework("<h1>hi</h1>", "/src/my-button.svelte", "svelte", 4)
            .unwrap();
        let primary = generated.primary;
        assert!(primary.text().starts_with("export default class MyButton {"));
        assert_eq!(primary.file_name, "/src/my-button.svelte.tsx");
        assert_eq!(primary.version, 4);
        assert_eq!(primary.mapping.len(), 1);
        assert_eq!(primary.mapping.to_original(0), Some(0));
        assert!(module.generate_framework("", "/a.vue", "vue", 1).is_none());
    }

    #[test]
    fn extra_declarations_follow_builtins() {
        let module = LanguageModule::default().with_extra_declarations("declare const Extra: 1;");
        let declarations = module.ambient_declarations();
        assert!(declarations.starts_with(AMBIENT_DECLARATIONS));
        assert!(declarations.ends_with("declare const Extra: 1;"));
    }

    struct Custom;

    impl FrameworkIntegration for Custom {
        fn to_synthetic_source(&self, text: &str, class_name: &str) -> String {
            format!("// {}\nexport default class {} {{}}\n", text.len(), class_name)
        }
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = FrameworkRegistry::with_shims(&["vue"]);
        registry.register("vue", Arc::new(Custom));
        let module = LanguageModule::default().with_frameworks(registry);
        let generated = module.generate_framework("abc", "/x/Card.vue", "vue", 1).unwrap();
        assert!(generated.primary.text().starts_with("// 3\n"));
        let anchor = &generated.primary.mapping.segments()[0];
        assert_eq!(anchor.generated.start, 5);
    }
}
