//! Stylesheet pipeline
//!
//! `scss` compiles preprocessor sources to `.css` next to their source;
//! `css` prefixes every compiled stylesheet, minifies in prod and always
//! writes a source map into the maps folder.

use crate::config::{Environment, StyleConfig};
use crate::error::{ConfigResult, TaskResult};
use crate::pipeline::sourcemap::{map_url, style_comment};
use crate::pipeline::{
    into_text, read_source, read_text, slash_path, write_output, FileSet, SourceMap,
};
use crate::runner::{apply_step, shell_quote, Context, Task};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn file_vars(ctx: &Context, path: &Path) -> HashMap<String, String> {
    let mut vars = ctx.base_vars();
    vars.insert("file".to_string(), shell_quote(&path.display().to_string()));
    let dir = path.parent().unwrap_or(ctx.root.as_path());
    vars.insert("dir".to_string(), shell_quote(&dir.display().to_string()));
    vars
}

/// Compiles `.scss` sources in place
pub struct ScssTask {
    sources: FileSet,
    compile: Option<String>,
}

impl ScssTask {
    pub fn new(sources: FileSet, compile: Option<String>) -> Self {
        ScssTask { sources, compile }
    }
}

/// Partials are only ever imported
fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('_'))
        .unwrap_or(false)
}

#[async_trait]
impl Task for ScssTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let mut compiled = 0usize;

        for file in self.sources.collect(&ctx.root)? {
            if is_partial(&file.path) {
                continue;
            }

            let source = read_source(&file.path).await?;
            let vars = file_vars(ctx, &file.path);
            let css = apply_step(ctx, "scss", self.compile.as_deref(), &vars, &file.path, source)
                .await?;

            let target = file.path.with_extension("css");
            // Rewriting identical output would re-trigger the watcher
            if let Ok(existing) = tokio::fs::read(&target).await {
                if existing == css {
                    continue;
                }
            }
            write_output(&target, &css).await?;
            compiled += 1;
        }

        tracing::debug!(compiled, "compiled stylesheets");
        Ok(())
    }

    fn describe(&self) -> String {
        "compile preprocessor stylesheets in place".to_string()
    }
}

/// Prefixes (and in prod minifies) compiled stylesheets into the output tree
pub struct StyleTask {
    sources: FileSet,
    dest: PathBuf,
    maps: String,
    prefix: Option<String>,
    minify: Option<String>,
    compatibility: String,
    env: Environment,
}

impl StyleTask {
    pub fn from_config(config: &StyleConfig, env: Environment) -> ConfigResult<Self> {
        Ok(StyleTask {
            sources: FileSet::new(&config.compiled)?,
            dest: PathBuf::from(&config.dest),
            maps: config.maps.clone(),
            prefix: config.prefix.clone(),
            minify: config.minify.clone(),
            compatibility: config.compatibility.clone(),
            env,
        })
    }

    async fn process(&self, ctx: &Context, path: &Path, relative: &Path) -> TaskResult<()> {
        let original = read_text(path).await?;
        let mut vars = file_vars(ctx, path);
        vars.insert("compatibility".to_string(), shell_quote(&self.compatibility));

        let mut css = apply_step(
            ctx,
            "autoprefixer",
            self.prefix.as_deref(),
            &vars,
            path,
            original.clone().into_bytes(),
        )
        .await?;

        if self.env.is_prod() {
            css = apply_step(ctx, "minify-css", self.minify.as_deref(), &vars, path, css).await?;
        }

        let mut css = into_text("css", path, css)?;
        let url = map_url(relative, &self.maps);
        css.push_str(&style_comment(&url));

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut map = SourceMap::new(&file_name);
        map.add_source(&slash_path(ctx.relative(path)), &original);

        let dest = ctx.resolve(&self.dest);
        write_output(&dest.join(relative), css.as_bytes()).await?;
        let map_path = dest
            .join(&self.maps)
            .join(format!("{}.map", slash_path(relative)));
        write_output(&map_path, &map.to_json()).await
    }
}

#[async_trait]
impl Task for StyleTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let files = self.sources.collect(&ctx.root)?;
        for file in &files {
            self.process(ctx, &file.path, &file.relative).await?;
        }

        tracing::debug!(stylesheets = files.len(), env = %self.env, "stylesheets written");
        ctx.reloader.reload();
        Ok(())
    }

    fn describe(&self) -> String {
        let minify = if self.env.is_prod() { " and minify" } else { "" };
        format!("prefix{} stylesheets into {}", minify, self.dest.display())
    }
}
