// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rendering of package content from templates.

Templates are addressed by name. [HandlebarsRenderer] names templates by
their path relative to the template directory with the `.hbs` extension
removed, so `templates/debian/control.hbs` is the `debian/control` template.
*/

use {
    crate::{
        control::ControlField,
        error::{DebpkgError, Result},
        package::PackageSpec,
    },
    handlebars::Handlebars,
    log::debug,
    serde_json::{Map, Value},
    std::path::Path,
};

/// Filename extension of template files.
pub const TEMPLATE_EXTENSION: &str = "hbs";

/// Variables available to a template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateContext {
    variables: Map<String, Value>,
}

impl TemplateContext {
    /// Construct a context holding package metadata.
    ///
    /// Optional fields that are unset are present as `null` so templates can
    /// test them with `{{#if}}`. `description_field` holds the complete value
    /// of a `Description` control field, with the long description encoded as
    /// continuation lines.
    pub fn from_spec(spec: &PackageSpec) -> Self {
        let optional = |v: Option<&str>| v.map(|s| Value::from(s)).unwrap_or(Value::Null);

        let mut variables = Map::new();
        variables.insert("package_name".into(), spec.name().into());
        variables.insert("version".into(), spec.version().to_string().into());
        variables.insert("architecture".into(), spec.architecture().into());
        variables.insert("maintainer".into(), spec.maintainer().into());
        variables.insert("description".into(), spec.description().into());
        variables.insert(
            "description_field".into(),
            description_field(spec).into(),
        );
        variables.insert("long_description".into(), optional(spec.long_description()));
        variables.insert("section".into(), optional(spec.section()));
        variables.insert("priority".into(), optional(spec.priority()));
        variables.insert("homepage".into(), optional(spec.homepage()));
        variables.insert("install_path".into(), spec.install_path().to_string().into());
        variables.insert("depends".into(), spec.depends().join(", ").into());

        Self { variables }
    }

    /// Set a variable, replacing any existing value.
    pub fn insert(&mut self, name: impl ToString, value: impl Into<Value>) {
        self.variables.insert(name.to_string(), value.into());
    }

    /// Set every variable in a map.
    pub fn extend(&mut self, variables: Map<String, Value>) {
        self.variables.extend(variables);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }
}

fn description_field(spec: &PackageSpec) -> String {
    let lines = std::iter::once(spec.description().to_string()).chain(
        spec.long_description()
            .into_iter()
            .flat_map(|d| d.lines().map(|l| l.to_string()).collect::<Vec<_>>()),
    );

    ControlField::from_lines("Description".into(), lines)
        .value_str()
        .to_string()
}

/// A capability to render named templates.
pub trait TemplateRenderer {
    /// Whether a template with the given name is available.
    fn has_template(&self, name: &str) -> bool;

    /// Render the named template.
    ///
    /// Fails with [DebpkgError::TemplateNotFound] if the template does not
    /// exist and with [DebpkgError::TemplateVariable] if it references an
    /// undefined variable.
    fn render(&self, name: &str, context: &TemplateContext) -> Result<Vec<u8>>;
}

/// Renders templates with the `handlebars` engine.
///
/// Each instance owns its own registry. Strict mode is enabled and HTML
/// escaping is disabled.
pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }
}

impl HandlebarsRenderer {
    /// Register every `.hbs` file under a directory.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut renderer = Self::default();

        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                DebpkgError::TemplateRegistration(dir.display().to_string(), e.to_string())
            })?;

            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION)
            {
                continue;
            }

            let name = path
                .strip_prefix(dir)
                .map_err(|e| {
                    DebpkgError::TemplateRegistration(path.display().to_string(), e.to_string())
                })?
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");

            let source = std::fs::read_to_string(path)
                .map_err(|e| DebpkgError::IoPath(path.display().to_string(), e))?;

            renderer.register(&name, &source)?;
        }

        Ok(renderer)
    }

    /// Register templates from `(name, source)` pairs.
    pub fn from_strings<'a>(templates: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut renderer = Self::default();

        for (name, source) in templates {
            renderer.register(name, source)?;
        }

        Ok(renderer)
    }

    /// Register a single template.
    pub fn register(&mut self, name: &str, source: &str) -> Result<()> {
        debug!("registering template {}", name);

        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| DebpkgError::TemplateRegistration(name.to_string(), e.to_string()))
    }

    /// Names of all registered templates, sorted.
    pub fn template_names(&self) -> Vec<String> {
        let mut names = self
            .handlebars
            .get_templates()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        names
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    fn render(&self, name: &str, context: &TemplateContext) -> Result<Vec<u8>> {
        if !self.has_template(name) {
            return Err(DebpkgError::TemplateNotFound(name.to_string()));
        }

        debug!("rendering template {}", name);

        self.handlebars
            .render(name, context.variables())
            .map(|s| s.into_bytes())
            .map_err(|e| {
                let message = e.to_string();

                if message.contains("strict mode") {
                    DebpkgError::TemplateVariable(format!("{}: {}", name, message))
                } else {
                    DebpkgError::TemplateRender(name.to_string(), message)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn spec() -> Result<PackageSpec> {
        Ok(PackageSpec::new(
            "sample-config-pkg",
            "1:1.0.0-1",
            "all",
            "Admin <admin@example.com>",
            "Sample package",
            "/opt/config",
        )?
        .with_depends(["openssl", "ca-certificates"]))
    }

    #[test]
    fn context_from_spec() -> Result<()> {
        let context = TemplateContext::from_spec(&spec()?);

        assert_eq!(context.get("package_name"), Some(&json!("sample-config-pkg")));
        assert_eq!(context.get("version"), Some(&json!("1:1.0.0-1")));
        assert_eq!(context.get("install_path"), Some(&json!("/opt/config")));
        assert_eq!(context.get("depends"), Some(&json!("openssl, ca-certificates")));
        assert_eq!(context.get("homepage"), Some(&Value::Null));
        assert_eq!(context.get("installed_size"), None);
        assert_eq!(context.get("description_field"), Some(&json!("Sample package")));

        let spec = spec()?.with_long_description("Line one.\n\nLine two.");
        assert_eq!(
            TemplateContext::from_spec(&spec).get("description_field"),
            Some(&json!("Sample package\n Line one.\n .\n Line two."))
        );

        Ok(())
    }

    #[test]
    fn render_strings() -> Result<()> {
        let renderer = HandlebarsRenderer::from_strings([
            ("greeting", "{{package_name}} -> {{install_path}}/{{config_name}}"),
            ("optional", "{{#if homepage}}Homepage: {{homepage}}{{/if}}"),
            ("script", "echo \"{{maintainer}}\" > /tmp/x && true"),
        ])?;

        let mut context = TemplateContext::from_spec(&spec()?);
        context.insert("config_name", "test.conf");

        assert!(renderer.has_template("greeting"));
        assert!(!renderer.has_template("missing"));
        assert_eq!(
            renderer.render("greeting", &context)?,
            b"sample-config-pkg -> /opt/config/test.conf"
        );
        assert_eq!(renderer.render("optional", &context)?, b"");
        assert_eq!(
            renderer.render("script", &context)?,
            b"echo \"Admin <admin@example.com>\" > /tmp/x && true"
        );

        Ok(())
    }

    #[test]
    fn render_errors() -> Result<()> {
        let renderer = HandlebarsRenderer::from_strings([("bad", "{{undefined_variable}}")])?;
        let context = TemplateContext::from_spec(&spec()?);

        assert!(matches!(
            renderer.render("bad", &context),
            Err(DebpkgError::TemplateVariable(_))
        ));
        assert!(matches!(
            renderer.render("missing", &context),
            Err(DebpkgError::TemplateNotFound(_))
        ));
        assert!(matches!(
            HandlebarsRenderer::from_strings([("broken", "{{#if homepage}}unclosed")]),
            Err(DebpkgError::TemplateRegistration(..))
        ));

        Ok(())
    }

    #[test]
    fn nested_user_variables() -> Result<()> {
        let renderer = HandlebarsRenderer::from_strings([("conf", "port={{config.port}}")])?;

        let mut context = TemplateContext::from_spec(&spec()?);
        let mut user = Map::new();
        user.insert("config".into(), json!({"port": 8443}));
        context.extend(user);

        assert_eq!(renderer.render("conf", &context)?, b"port=8443");

        Ok(())
    }

    #[test]
    fn from_directory() -> Result<()> {
        let td = tempfile::tempdir()?;
        std::fs::create_dir_all(td.path().join("debian"))?;
        std::fs::write(td.path().join("debian").join("control.hbs"), "Package: {{package_name}}\n")?;
        std::fs::write(td.path().join("config.conf.hbs"), "name={{package_name}}\n")?;
        std::fs::write(td.path().join("README.md"), "ignored")?;

        let renderer = HandlebarsRenderer::from_directory(td.path())?;

        assert_eq!(
            renderer.template_names(),
            vec!["config.conf".to_string(), "debian/control".to_string()]
        );
        assert_eq!(
            renderer.render("debian/control", &TemplateContext::from_spec(&spec()?))?,
            b"Package: sample-config-pkg\n"
        );

        Ok(())
    }
}
