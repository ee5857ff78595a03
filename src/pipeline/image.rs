//! Image pipeline: per-format optimizers, verbatim copy otherwise

use crate::config::ImageConfig;
use crate::error::{ConfigResult, TaskResult};
use crate::pipeline::{read_source, write_output, FileSet};
use crate::runner::{apply_step, shell_quote, Context, Task};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub struct ImageTask {
    sources: FileSet,
    dest: PathBuf,
    optimizers: BTreeMap<String, Option<String>>,
    settings: HashMap<String, String>,
}

impl ImageTask {
    pub fn from_config(config: &ImageConfig) -> ConfigResult<Self> {
        let mut settings = HashMap::new();
        settings.insert(
            "optimization_level".to_string(),
            config.optimization_level.to_string(),
        );
        settings.insert("progressive".to_string(), config.progressive.to_string());
        settings.insert("interlaced".to_string(), config.interlaced.to_string());
        settings.insert("multipass".to_string(), config.multipass.to_string());

        let optimizers = config
            .optimizers
            .iter()
            .map(|(ext, cmd)| (ext.to_ascii_lowercase(), cmd.clone()))
            .collect();

        Ok(ImageTask {
            sources: FileSet::new(&config.sources)?,
            dest: PathBuf::from(&config.dest),
            optimizers,
            settings,
        })
    }

    fn optimizer_for(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.optimizers.get(&ext)?.as_deref()
    }
}

#[async_trait]
impl Task for ImageTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let files = self.sources.collect(&ctx.root)?;
        let dest = ctx.resolve(&self.dest);
        let mut optimized = 0usize;

        for file in &files {
            let original = read_source(&file.path).await?;
            let optimizer = self.optimizer_for(&file.path);

            let mut vars = ctx.base_vars();
            vars.extend(self.settings.clone());
            vars.insert(
                "file".to_string(),
                shell_quote(&file.path.display().to_string()),
            );

            let before = original.len();
            let output = apply_step(ctx, "imagemin", optimizer, &vars, &file.path, original).await?;
            if optimizer.is_some() {
                optimized += 1;
                tracing::debug!(
                    file = %ctx.relative(&file.path).display(),
                    before,
                    after = output.len(),
                    "optimized image"
                );
            }

            write_output(&dest.join(&file.relative), &output).await?;
        }

        tracing::debug!(images = files.len(), optimized, "images written");
        ctx.reloader.reload();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("optimize images into {}", self.dest.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_images_optimized_per_format() {
        let temp = TempDir::new().unwrap();
        let image_dir = temp.path().join("src/image/icons");
        fs::create_dir_all(&image_dir).unwrap();
        fs::write(image_dir.join("logo.svg"), "<svg>  </svg>").unwrap();
        fs::write(image_dir.join("photo.jpg"), [0xFFu8, 0xD8, 0xFF]).unwrap();
        fs::write(image_dir.join("notes.txt"), "skip").unwrap();

        let mut optimizers = BTreeMap::new();
        optimizers.insert("svg".to_string(), Some("tr -d ' '; printf ${multipass}".to_string()));
        optimizers.insert("jpg".to_string(), None);

        let config = ImageConfig {
            optimizers,
            ..ImageConfig::default()
        };
        let task = ImageTask::from_config(&config).unwrap();
        let ctx = Context::new(temp.path().to_path_buf());
        task.run(&ctx).await.unwrap();

        let svg = fs::read_to_string(temp.path().join("dist/image/icons/logo.svg")).unwrap();
        assert_eq!(svg, "<svg></svg>true");
        let jpg = fs::read(temp.path().join("dist/image/icons/photo.jpg")).unwrap();
        assert_eq!(jpg, vec![0xFF, 0xD8, 0xFF]);
        assert!(!temp.path().join("dist/image/icons/notes.txt").exists());
    }
}
