//! Script pipeline
//!
//! Application scripts are transpiled one by one, concatenated into a single
//! bundle, minified in prod and renamed with the suffix (`index.js` ->
//! `index.min.js`). A source map is always written.

use crate::config::{Environment, ScriptConfig};
use crate::error::{ConfigResult, TaskResult};
use crate::pipeline::sourcemap::{map_url, script_comment, LineMappings};
use crate::pipeline::{into_text, read_text, slash_path, write_output, FileSet, SourceMap};
use crate::runner::{apply_step, shell_quote, Context, Task};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Insert `suffix` before the extension: `index.js` + `.min` -> `index.min.js`
pub fn suffixed_name(name: &str, suffix: &str) -> String {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{}{}.{}",
            stem.to_string_lossy(),
            suffix,
            ext.to_string_lossy()
        ),
        _ => format!("{}{}", name, suffix),
    }
}

/// Bundles application scripts
pub struct ScriptTask {
    sources: FileSet,
    dest: PathBuf,
    maps: String,
    bundle: String,
    transpile: Option<String>,
    minify: Option<String>,
    env: Environment,
}

impl ScriptTask {
    pub fn from_config(config: &ScriptConfig, env: Environment) -> ConfigResult<Self> {
        Ok(ScriptTask {
            sources: FileSet::new(&config.sources)?,
            dest: PathBuf::from(&config.dest),
            maps: config.maps.clone(),
            bundle: suffixed_name(&config.bundle, &config.suffix),
            transpile: config.transpile.clone(),
            minify: config.minify.clone(),
            env,
        })
    }
}

#[async_trait]
impl Task for ScriptTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let files = self.sources.collect(&ctx.root)?;
        if files.is_empty() {
            tracing::debug!("no application scripts; bundle not written");
            return Ok(());
        }

        let mut map = SourceMap::new(&self.bundle);
        let mut mappings = LineMappings::new();
        let mut segments = Vec::with_capacity(files.len());

        for file in &files {
            let original = read_text(&file.path).await?;
            let mut vars = ctx.base_vars();
            vars.insert(
                "file".to_string(),
                shell_quote(&file.path.display().to_string()),
            );

            let output = apply_step(
                ctx,
                "transpile",
                self.transpile.as_deref(),
                &vars,
                &file.path,
                original.clone().into_bytes(),
            )
            .await?;
            let segment = into_text("transpile", &file.path, output)?;

            let index = map.add_source(&slash_path(ctx.relative(&file.path)), &original);
            mappings.map_segment(index, &segment);
            segments.push(segment);
        }

        let bundle = segments.join("\n");
        let bundle_path = ctx.resolve(&self.dest).join(&self.bundle);

        let mut bundle = match (self.env.is_prod(), self.minify.as_deref()) {
            (true, Some(minify)) => {
                let vars = ctx.base_vars();
                let out = apply_step(
                    ctx,
                    "minify-js",
                    Some(minify),
                    &vars,
                    &bundle_path,
                    bundle.into_bytes(),
                )
                .await?;
                // Line mappings no longer hold once the bundle is rewritten
                into_text("minify-js", &bundle_path, out)?
            }
            _ => {
                map = map.with_mappings(mappings.finish());
                bundle
            }
        };

        let url = map_url(Path::new(&self.bundle), &self.maps);
        bundle.push_str(&script_comment(&url));

        write_output(&bundle_path, bundle.as_bytes()).await?;
        let map_path = ctx
            .resolve(&self.dest)
            .join(&self.maps)
            .join(format!("{}.map", self.bundle));
        write_output(&map_path, &map.to_json()).await?;

        tracing::debug!(scripts = files.len(), bundle = %self.bundle, env = %self.env, "bundle written");
        ctx.reloader.reload();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("bundle scripts into {}/{}", self.dest.display(), self.bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn script_config() -> ScriptConfig {
        ScriptConfig {
            transpile: Some("sed 's/const /var /g'".to_string()),
            minify: Some("tr -d ' \\n'".to_string()),
            ..ScriptConfig::default()
        }
    }

    #[test]
    fn test_suffixed_name() {
        assert_eq!(suffixed_name("index.js", ".min"), "index.min.js");
        assert_eq!(suffixed_name("app.bundle.js", ".min"), "app.bundle.min.js");
        assert_eq!(suffixed_name("bundle", ".min"), "bundle.min");
        assert_eq!(suffixed_name("index.js", ""), "index.js");
    }

    #[tokio::test]
    async fn test_bundle_concatenates_in_path_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/javascript/b.js", "const b = 2;");
        write(temp.path(), "src/javascript/a.js", "const a = 1;");
        write(temp.path(), "src/javascript/lib/jquery.js", "jquery();");

        let task = ScriptTask::from_config(&script_config(), Environment::Dev).unwrap();
        let ctx = Context::new(temp.path().to_path_buf());
        task.run(&ctx).await.unwrap();

        let bundle = fs::read_to_string(temp.path().join("dist/js/index.min.js")).unwrap();
        assert_eq!(
            bundle,
            "var a = 1;\nvar b = 2;\n//# sourceMappingURL=maps/index.min.js.map\n"
        );

        let map: serde_json::Value = serde_json::from_slice(
            &fs::read(temp.path().join("dist/js/maps/index.min.js.map")).unwrap(),
        )
        .unwrap();
        assert_eq!(map["sources"][0], "src/javascript/a.js");
        assert_eq!(map["sources"][1], "src/javascript/b.js");
        assert_eq!(map["sourcesContent"][1], "const b = 2;");
        assert_eq!(map["mappings"], "AAAA;ACAA");
    }

    #[tokio::test]
    async fn test_prod_bundle_is_minified() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/javascript/a.js", "const x = 1;\n\nconst y = 2;\n");
        let ctx = Context::new(temp.path().to_path_buf());

        ScriptTask::from_config(&script_config(), Environment::Dev)
            .unwrap()
            .run(&ctx)
            .await
            .unwrap();
        let dev = fs::read(temp.path().join("dist/js/index.min.js")).unwrap();

        ScriptTask::from_config(&script_config(), Environment::Prod)
            .unwrap()
            .run(&ctx)
            .await
            .unwrap();
        let prod = fs::read_to_string(temp.path().join("dist/js/index.min.js")).unwrap();

        assert!(prod.len() < dev.len());
        assert!(prod.starts_with("varx=1;vary=2;"));
        assert!(temp.path().join("dist/js/maps/index.min.js.map").exists());
    }

    #[tokio::test]
    async fn test_transpile_failure_names_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/javascript/bad.js", "syntax error(");

        let config = ScriptConfig {
            transpile: Some("echo 'Unexpected token' >&2; exit 1".to_string()),
            ..script_config()
        };
        let task = ScriptTask::from_config(&config, Environment::Dev).unwrap();
        let ctx = Context::new(temp.path().to_path_buf());

        let err = task.run(&ctx).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("src/javascript/bad.js"));
        assert!(message.contains("Unexpected token"));
        assert!(!temp.path().join("dist/js/index.min.js").exists());
    }
}
