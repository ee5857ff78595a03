//! Markup pipeline
//!
//! Pages are assembled from components: every `<component src="..." />` tag
//! is replaced by the named file rendered through a [`TemplateEngine`]. The
//! tag's `data` attribute (a JSON object) and its other attributes are layered
//! over the configured data before rendering. Rendered components are expanded
//! again, so components can contain components.

use crate::config::{Environment, MarkupConfig};
use crate::error::{ConfigError, ConfigResult, TaskError, TaskResult};
use crate::pipeline::template::TemplateEngine;
use crate::pipeline::{into_text, read_text, write_output, FileSet};
use crate::runner::{apply_step, shell_quote, Context, Task};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde_json::{Map, Value};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Deepest component nesting before expansion gives up
pub const MAX_DEPTH: usize = 32;

fn attr_regex() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| {
        Regex::new(r#"([\w:.-]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+)))?"#)
            .expect("valid attribute regex")
    })
}

/// Replaces component tags with rendered component files
pub struct ComponentExpander {
    tag: Regex,
    paths: Vec<PathBuf>,
    data: Map<String, Value>,
    engine: Arc<dyn TemplateEngine>,
}

impl ComponentExpander {
    /// `paths` are searched in order (relative to the project root) before
    /// the directory of the file holding the tag
    pub fn new(
        tag: &str,
        paths: Vec<PathBuf>,
        data: Map<String, Value>,
        engine: Arc<dyn TemplateEngine>,
    ) -> ConfigResult<Self> {
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConfigError::Invalid(format!(
                "markup.tag '{}' is not a valid element name",
                tag
            )));
        }

        let name = regex::escape(tag);
        let pattern = format!(
            r#"<{name}((?:\s+[\w:.-]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>/]+))?)*)\s*(?:/>|>\s*</{name}\s*>)"#
        );
        let tag = Regex::new(&pattern).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(ComponentExpander {
            tag,
            paths,
            data,
            engine,
        })
    }

    /// Expand every component tag in `content`, which was read from `file`
    pub async fn expand(&self, root: &Path, file: &Path, content: &str) -> TaskResult<String> {
        let mut stack = Vec::new();
        self.expand_in(root, file, content, &mut stack).await
    }

    fn expand_in<'a>(
        &'a self,
        root: &'a Path,
        file: &'a Path,
        content: &'a str,
        stack: &'a mut Vec<PathBuf>,
    ) -> BoxFuture<'a, TaskResult<String>> {
        async move {
            let component_error = |message: String| TaskError::Component {
                file: file.strip_prefix(root).unwrap_or(file).to_path_buf(),
                message,
            };

            let tags: Vec<(Range<usize>, String)> = self
                .tag
                .captures_iter(content)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                    Some((whole.range(), attrs.to_string()))
                })
                .collect();

            let mut out = String::with_capacity(content.len());
            let mut last = 0;

            for (whole, attrs) in tags {
                out.push_str(&content[last..whole.start]);
                last = whole.end;

                let (src, data) = self.tag_data(&attrs).map_err(component_error)?;

                let path = self
                    .resolve(root, file, &src)
                    .await
                    .ok_or_else(|| component_error(format!("component '{}' not found", src)))?;

                if let Some(pos) = stack.iter().position(|p| *p == path) {
                    let mut chain: Vec<String> = stack[pos..]
                        .iter()
                        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
                        .collect();
                    chain.push(src.clone());
                    return Err(component_error(format!(
                        "circular component: {}",
                        chain.join(" -> ")
                    )));
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(component_error(format!(
                        "components nested deeper than {}",
                        MAX_DEPTH
                    )));
                }

                let template = read_text(&path).await?;
                let rendered = self
                    .engine
                    .render(&template, &Value::Object(data))
                    .map_err(|e| TaskError::Template {
                        file: path.strip_prefix(root).unwrap_or(&path).to_path_buf(),
                        message: e.to_string(),
                    })?;

                stack.push(path.clone());
                let expanded = self.expand_in(root, &path, &rendered, stack).await;
                stack.pop();
                out.push_str(&expanded?);
            }

            out.push_str(&content[last..]);
            Ok(out)
        }
        .boxed()
    }

    /// Split a tag's attributes into its `src` and the render data
    fn tag_data(&self, attrs: &str) -> Result<(String, Map<String, Value>), String> {
        let mut data = self.data.clone();
        let mut src = None;

        for caps in attr_regex().captures_iter(attrs) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str());

            match (name, value) {
                ("src", Some(value)) => src = Some(value.to_string()),
                ("data", Some(json)) => match serde_json::from_str::<Value>(json) {
                    Ok(Value::Object(fields)) => data.extend(fields),
                    Ok(_) => return Err("data attribute must be a JSON object".to_string()),
                    Err(e) => return Err(format!("invalid data attribute: {}", e)),
                },
                (name, Some(value)) => {
                    data.insert(name.to_string(), Value::String(value.to_string()));
                }
                (name, None) => {
                    data.insert(name.to_string(), Value::Bool(true));
                }
            }
        }

        match src {
            Some(src) if !src.is_empty() => Ok((src, data)),
            _ => Err("component tag without a src attribute".to_string()),
        }
    }

    async fn resolve(&self, root: &Path, file: &Path, src: &str) -> Option<PathBuf> {
        let candidates = self
            .paths
            .iter()
            .map(|dir| root.join(dir).join(src))
            .chain(file.parent().map(|dir| dir.join(src)));

        for candidate in candidates {
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|meta| meta.is_file())
            {
                return Some(candidate);
            }
        }
        None
    }
}

/// Assembles pages into the output tree, minifying in prod
pub struct HtmlTask {
    sources: FileSet,
    dest: PathBuf,
    expander: ComponentExpander,
    minify: Option<String>,
    env: Environment,
}

impl HtmlTask {
    pub fn from_config(
        config: &MarkupConfig,
        env: Environment,
        engine: Arc<dyn TemplateEngine>,
    ) -> ConfigResult<Self> {
        let mut data = Map::new();
        data.insert("env".to_string(), Value::String(env.as_str().to_string()));
        data.extend(config.data.clone());

        let paths = config.paths.iter().map(PathBuf::from).collect();

        Ok(HtmlTask {
            sources: FileSet::new(&config.sources)?,
            dest: PathBuf::from(&config.dest),
            expander: ComponentExpander::new(&config.tag, paths, data, engine)?,
            minify: config.minify.clone(),
            env,
        })
    }
}

#[async_trait]
impl Task for HtmlTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let files = self.sources.collect(&ctx.root)?;
        let dest = ctx.resolve(&self.dest);

        for file in &files {
            let page = read_text(&file.path).await?;
            let mut html = self.expander.expand(&ctx.root, &file.path, &page).await?;

            if self.env.is_prod() {
                let mut vars = ctx.base_vars();
                vars.insert(
                    "file".to_string(),
                    shell_quote(&file.path.display().to_string()),
                );
                let out = apply_step(
                    ctx,
                    "minify-html",
                    self.minify.as_deref(),
                    &vars,
                    &file.path,
                    html.into_bytes(),
                )
                .await?;
                html = into_text("minify-html", &file.path, out)?;
            }

            write_output(&dest.join(&file.relative), html.as_bytes()).await?;
        }

        tracing::debug!(pages = files.len(), env = %self.env, "pages written");
        ctx.reloader.reload();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("assemble pages into {}", self.dest.display())
    }
}
