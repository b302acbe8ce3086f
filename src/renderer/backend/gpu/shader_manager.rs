//! Shader Template Manager
//!
//! WGSL sources are minijinja templates embedded with rust-embed. Templates
//! pull shared code from `chunks/` with `{$ include "name" $}` and receive the
//! program's defines (cluster grid dimensions) as template variables.
//!
//! Compiled modules are cached by the xxh3-128 hash of the final source, so
//! two programs sharing a stage with equal defines share one module.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::{error, trace};
use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::Result;

const SHADER_DIR: &str = "src/renderer/backend/shaders";

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/renderer/backend/shaders"]
struct ShaderAssets;

fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        match SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
        {
            Ok(syntax) => env.set_syntax(syntax),
            Err(e) => error!("Failed to configure shader template syntax: {e}"),
        }
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);

        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        env
    })
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    // Debug builds read from disk first so shader edits apply without a rebuild.
    #[cfg(debug_assertions)]
    {
        let path = std::path::Path::new(SHADER_DIR).join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(ErrorKind::TemplateNotFound, format!("Failed to read {}: {e}", path.display()))
            });
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

/// Renders template `name` with `defines` as variables.
pub fn render_template(name: &str, defines: &BTreeMap<String, String>) -> Result<String> {
    let template = get_env().get_template(name)?;
    Ok(template.render(defines)?)
}

/// Shader module cache keyed by the hash of the rendered source.
#[derive(Default)]
pub struct ShaderManager {
    module_cache: FxHashMap<u128, wgpu::ShaderModule>,
}

impl ShaderManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders and compiles template `name` (or reuses a cached module).
    /// Returns the source hash, which [`Self::module`] resolves.
    pub fn get_or_compile(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        defines: &BTreeMap<String, String>,
    ) -> Result<u128> {
        let source = render_template(name, defines)?;
        trace!("Generated shader {name}:\n{source}");

        let hash = xxh3_128(source.as_bytes());
        self.module_cache.entry(hash).or_insert_with(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Shader Module {name}")),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        Ok(hash)
    }

    #[must_use]
    pub fn module(&self, hash: u128) -> Option<&wgpu::ShaderModule> {
        self.module_cache.get(&hash)
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.module_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::settings::ClusterGrid;

    #[test]
    fn cluster_constants_are_substituted() {
        let defines = ClusterGrid::default().shader_defines();
        let source = render_template("cs_clustered_lightculling", &defines).unwrap();
        assert!(source.contains("const CLUSTERS_X: u32 = 16u;"));
        assert!(source.contains("const MAX_LIGHTS_PER_CLUSTER: u32 = 100u;"));
        assert!(!source.contains("{{"));
    }

    #[test]
    fn every_program_template_renders() {
        let defines = ClusterGrid::default().shader_defines();
        for name in [
            "cs_clustered_clusterbuilding",
            "cs_clustered_lightculling",
            "vs_clustered",
            "fs_clustered",
            "fs_clustered_debug_vis",
            "fs_forward",
        ] {
            let source = render_template(name, &defines).unwrap();
            assert!(source.contains("fn "), "{name} rendered empty");
        }
    }

    #[test]
    fn missing_define_is_an_error() {
        assert!(render_template("cs_clustered_clusterbuilding", &BTreeMap::new()).is_err());
    }
}
