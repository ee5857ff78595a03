//! Core configuration types
//!
//! This module defines the data structures that represent a pipework.yml
//! configuration file. Every field has a default, so an empty file (or no file
//! at all) describes the stock `src/` -> `dist/` layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Environment variable selecting dev or prod
    pub env_var: String,

    /// Interpreter used for tool commands (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Markup (HTML component) pipeline
    pub markup: MarkupConfig,

    /// Stylesheet pipeline
    pub styles: StyleConfig,

    /// Script pipeline
    pub scripts: ScriptConfig,

    /// Image pipeline
    pub images: ImageConfig,

    /// Destination tree removed by the clean task
    pub dest: String,

    /// Development server
    pub server: ServerConfig,

    /// Glob-to-task watch rules
    pub watch: Vec<WatchRule>,

    /// Named phase lists
    pub sequences: BTreeMap<String, Vec<Vec<String>>>,

    /// User-defined shell tasks
    pub tasks: BTreeMap<String, ShellTask>,
}

impl Default for Config {
    fn default() -> Self {
        let default_phases = vec![
            names(&["start", "clean"]),
            names(&["serve", "css", "js", "image", "html", "watch"]),
            names(&["finish"]),
        ];
        let build_phases = vec![
            names(&["start", "clean"]),
            names(&["css", "js", "image", "html"]),
            names(&["finish"]),
        ];

        let mut sequences = BTreeMap::new();
        sequences.insert("default".to_string(), default_phases);
        sequences.insert("build".to_string(), build_phases);

        Config {
            env_var: "NODE_ENV".to_string(),
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            markup: MarkupConfig::default(),
            styles: StyleConfig::default(),
            scripts: ScriptConfig::default(),
            images: ImageConfig::default(),
            dest: "dist".to_string(),
            server: ServerConfig::default(),
            watch: vec![
                WatchRule::new("src/**/*.html", &["html"]),
                WatchRule::new("src/style/**/*.{css,scss,less}", &["css"]),
                WatchRule::new("src/javascript/**/*.js", &["js"]),
                WatchRule::new("src/image/**/*.{jpg,png,jpeg,gif,svg}", &["image"]),
            ],
            sequences,
            tasks: BTreeMap::new(),
        }
    }
}

/// Markup pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarkupConfig {
    /// Page and component globs
    pub sources: Vec<String>,

    /// Output directory
    pub dest: String,

    /// Tag name marking a component reference
    pub tag: String,

    /// Component search path
    pub paths: Vec<String>,

    /// Fixed data merged into every component render (env is added at runtime)
    pub data: serde_json::Map<String, serde_json::Value>,

    /// Minifier used in prod
    pub minify: Option<String>,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        let mut data = serde_json::Map::new();
        data.insert("header".to_string(), serde_json::Value::Bool(false));

        MarkupConfig {
            sources: names(&["src/views/**/*.html", "src/components/**/*.html"]),
            dest: "dist".to_string(),
            tag: "component".to_string(),
            paths: names(&["src/components"]),
            data,
            minify: Some(
                "npx html-minifier --collapse-whitespace --remove-comments --minify-css true --minify-js true"
                    .to_string(),
            ),
        }
    }
}

/// Stylesheet pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Preprocessor sources, compiled in place
    pub sources: Vec<String>,

    /// Compiled stylesheets fed to prefixing/minification
    pub compiled: Vec<String>,

    /// Vendor stylesheets, copied verbatim
    pub vendor: Vec<String>,

    /// Output directory
    pub dest: String,

    /// Vendor output directory
    pub vendor_dest: String,

    /// Source map directory, relative to `dest`
    pub maps: String,

    /// Preprocessor command
    pub compile: Option<String>,

    /// Vendor-prefix command
    pub prefix: Option<String>,

    /// Minifier used in prod
    pub minify: Option<String>,

    /// Legacy browser baseline handed to the minifier
    pub compatibility: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        StyleConfig {
            sources: names(&["src/style/**/*.scss", "!src/style/lib/*"]),
            compiled: names(&["src/style/**/*.css", "!src/style/lib/*"]),
            vendor: names(&["src/style/lib/*"]),
            dest: "dist/css".to_string(),
            vendor_dest: "dist/css/lib".to_string(),
            maps: "maps".to_string(),
            compile: Some("npx sass --stdin --load-path=${dir}".to_string()),
            prefix: Some("npx postcss --use autoprefixer --no-map".to_string()),
            minify: Some("npx cleancss --compatibility ${compatibility}".to_string()),
            compatibility: "ie8".to_string(),
        }
    }
}

/// Script pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Application scripts
    pub sources: Vec<String>,

    /// Vendor scripts, copied verbatim
    pub vendor: Vec<String>,

    /// Output directory
    pub dest: String,

    /// Vendor output directory
    pub vendor_dest: String,

    /// Source map directory, relative to `dest`
    pub maps: String,

    /// Bundle file name before the suffix is applied
    pub bundle: String,

    /// Suffix inserted before the bundle extension
    pub suffix: String,

    /// Transpiler command, run per file
    pub transpile: Option<String>,

    /// Minifier used in prod, run on the bundle
    pub minify: Option<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        ScriptConfig {
            sources: names(&["src/javascript/**/*.js", "!src/javascript/lib/*"]),
            vendor: names(&["src/javascript/lib/*"]),
            dest: "dist/js".to_string(),
            vendor_dest: "dist/js/lib".to_string(),
            maps: "maps".to_string(),
            bundle: "index.js".to_string(),
            suffix: ".min".to_string(),
            transpile: Some(
                "npx babel --presets @babel/preset-env --filename ${file}".to_string(),
            ),
            minify: Some("npx terser --compress --mangle".to_string()),
        }
    }
}

/// Image pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image globs
    pub sources: Vec<String>,

    /// Output directory
    pub dest: String,

    /// Optimization aggressiveness (0-7)
    pub optimization_level: u8,

    /// Progressive JPEG encoding
    pub progressive: bool,

    /// Interlaced GIF rendering
    pub interlaced: bool,

    /// Multi-pass SVG optimization
    pub multipass: bool,

    /// Optimizer command per lowercase extension
    pub optimizers: BTreeMap<String, Option<String>>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        let jpeg = "npx imagemin --plugin.jpegtran.progressive=${progressive}";
        let mut optimizers = BTreeMap::new();
        optimizers.insert("jpg".to_string(), Some(jpeg.to_string()));
        optimizers.insert("jpeg".to_string(), Some(jpeg.to_string()));
        optimizers.insert(
            "png".to_string(),
            Some("npx imagemin --plugin.optipng.optimizationLevel=${optimization_level}".to_string()),
        );
        optimizers.insert(
            "gif".to_string(),
            Some("npx imagemin --plugin.gifsicle.interlaced=${interlaced}".to_string()),
        );
        optimizers.insert(
            "svg".to_string(),
            Some("npx imagemin --plugin.svgo.multipass=${multipass}".to_string()),
        );

        ImageConfig {
            sources: names(&["src/image/**/*.{jpg,png,jpeg,gif,svg}"]),
            dest: "dist/image".to_string(),
            optimization_level: 5,
            progressive: true,
            interlaced: true,
            multipass: true,
            optimizers,
        }
    }
}

/// Development server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Directory served
    pub root: String,

    /// Push reload events to connected browsers
    pub livereload: bool,

    /// Open a browser window on first start
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_string(),
            port: 2333,
            root: "dist".to_string(),
            livereload: true,
            open: true,
        }
    }
}

/// A watch rule: re-run `tasks` when a file matching `pattern` changes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WatchRule {
    pub pattern: String,
    pub tasks: Vec<String>,
}

impl WatchRule {
    pub fn new(pattern: &str, tasks: &[&str]) -> Self {
        WatchRule {
            pattern: pattern.to_string(),
            tasks: names(tasks),
        }
    }
}

/// A user-defined task running a shell command
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShellTask {
    /// Usage description for `--list`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Tasks that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,

    /// Commands to run, in order
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub run: Vec<String>,
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Custom deserializer for commands that handles both single values and arrays
fn deserialize_commands<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(D::Error::custom("run items must be strings")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("run must be a string or array")),
    }
}
