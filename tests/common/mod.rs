//! Common test utilities

#![allow(dead_code)]

use pipework::config::{load_project_file, Environment, Project};
use pipework::error::SequenceError;
use pipework::pipeline::build_graph;
use pipework::runner::{Context, Sequencer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A pipework.yml whose tools are plain shell utilities
pub const SITE_CONFIG: &str = r#"
styles:
  compile: cat
  prefix: "sed 's/display: flex/display: -webkit-flex; display: flex/'"
  minify: tr -d ' \n'
scripts:
  transpile: "sed 's/const /var /g'"
  minify: tr -d ' \n'
markup:
  minify: tr -d '\n'
images:
  optimizers:
    svg: tr -d ' '
server:
  host: 127.0.0.1
  port: 0
  open: false
"#;

/// Create a temporary directory with a pipework.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("pipework.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Write a file below `root`, creating parent directories
pub fn write(root: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small site exercising every pipeline
pub fn create_site(config: &str) -> (TempDir, PathBuf) {
    let (temp_dir, config_path) = create_test_config(config);
    let root = temp_dir.path();

    write(root, "src/style/main.scss", "a {\n  display: flex;\n}\n");
    write(root, "src/style/_vars.scss", "$gap: 4px;\n");
    write(root, "src/style/lib/reset.css", "* { margin: 0; }\n");

    write(root, "src/javascript/a.js", "const a = 1;\n");
    write(root, "src/javascript/b.js", "const b = a + 1;\n");
    write(root, "src/javascript/lib/vendor.js", "window.vendor = true;\n");

    write(
        root,
        "src/components/header.html",
        "<header>{{if header}}<h1>{{ title }}</h1>{{else}}<nav>{{ env }}</nav>{{/if}}</header>",
    );
    write(
        root,
        "src/views/index.html",
        "<html>\n<body>\n<component src=\"header.html\" data='{\"title\": \"Home\"}' />\n</body>\n</html>\n",
    );

    write(root, "src/image/logo.svg", "<svg> <g/> </svg>");
    write(root, "src/image/photo.png", [0x89u8, b'P', b'N', b'G']);

    (temp_dir, config_path)
}

/// Load the project rooted at `config_path`
pub fn project(config_path: &Path) -> Project {
    load_project_file(config_path).unwrap()
}

/// Run a named sequence of the project in `env`
pub async fn run_sequence(
    project: &Project,
    env: Environment,
    name: &str,
) -> Result<(), SequenceError> {
    let phases = project.config.sequences.get(name).unwrap().clone();
    sequencer(project, env).run_phases(&phases).await
}

/// A sequencer over the project's full task graph
pub fn sequencer(project: &Project, env: Environment) -> Sequencer {
    let ctx = Arc::new(Context::for_project(project, env));
    let graph = Arc::new(build_graph(project, env).unwrap());
    Sequencer::new(graph, ctx)
}

/// Every file below `dir` with its contents, sorted by path
pub fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

/// Total size of the files below `dir` with extension `ext`
pub fn total_size(dir: &Path, ext: &str) -> usize {
    snapshot(dir)
        .iter()
        .filter(|(path, _)| path.extension().and_then(|e| e.to_str()) == Some(ext))
        .map(|(_, contents)| contents.len())
        .sum()
}
