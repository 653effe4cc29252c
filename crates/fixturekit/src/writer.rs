//! Writing stage output to disk.
//!
//! Each stage becomes `<prefix>nodes-<count>.<ext>` and
//! `<prefix>pods-<count>.<ext>`. With the per-stage layout those land in
//! `<root>/<count>/` together with a simulator manifest.

use crate::document::to_stream;
use crate::error::{Error, Result};
use crate::generator::StageOutput;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_API_VERSION: &str = "simon/v1alpha1";
const MANIFEST_KIND: &str = "Config";

/// How stage files are arranged under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// All stage files side by side in the root
    Flat,
    /// One directory per stage, plus a manifest
    PerStage,
}

/// Paths written for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFiles {
    pub dir: PathBuf,
    pub nodes: PathBuf,
    pub pods: PathBuf,
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulatorManifest {
    api_version: &'static str,
    kind: &'static str,
    metadata: ManifestMetadata,
    spec: ManifestSpec,
}

#[derive(Debug, Serialize)]
struct ManifestMetadata {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestSpec {
    cluster: ClusterSource,
    app_list: Vec<AppSource>,
    new_node: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterSource {
    custom_config: String,
}

#[derive(Debug, Serialize)]
struct AppSource {
    name: String,
    path: String,
}

/// Serializes stage output under one output root.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
    prefix: String,
    extension: String,
    layout: Layout,
    new_node_template: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            extension: "yaml".to_string(),
            layout: Layout::Flat,
            new_node_template: PathBuf::from("new-node.yaml"),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Template path the simulator manifest points new nodes at.
    pub fn with_new_node_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.new_node_template = path.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Paths a stage with `node_count` nodes is written to.
    pub fn stage_files(&self, node_count: usize) -> StageFiles {
        let dir = match self.layout {
            Layout::Flat => self.root.clone(),
            Layout::PerStage => self.root.join(node_count.to_string()),
        };
        let file = |kind: &str| {
            dir.join(format!(
                "{}{kind}-{node_count}.{}",
                self.prefix, self.extension
            ))
        };
        StageFiles {
            nodes: file("nodes"),
            pods: file("pods"),
            manifest: (self.layout == Layout::PerStage).then(|| file("config")),
            dir,
        }
    }

    /// Write one stage, returning the paths written.
    pub fn write_stage(&self, stage: &StageOutput) -> Result<StageFiles> {
        let files = self.stage_files(stage.node_count());
        fs::create_dir_all(&files.dir).map_err(|source| Error::Write {
            path: files.dir.clone(),
            source,
        })?;

        write_file(&files.nodes, &to_stream(&stage.nodes)?)?;
        write_file(&files.pods, &to_stream(&stage.pods)?)?;
        if let Some(manifest) = &files.manifest {
            let content = serde_yaml::to_string(&self.manifest(stage.node_count(), &files))?;
            write_file(manifest, &content)?;
        }

        log::debug!(
            "stage {} written: {} nodes, {} pods",
            stage.index + 1,
            stage.nodes.len(),
            stage.pods.len()
        );
        Ok(files)
    }

    fn manifest(&self, node_count: usize, files: &StageFiles) -> SimulatorManifest {
        SimulatorManifest {
            api_version: MANIFEST_API_VERSION,
            kind: MANIFEST_KIND,
            metadata: ManifestMetadata {
                name: format!("{}{node_count}", self.prefix_or("simulator-")),
            },
            spec: ManifestSpec {
                cluster: ClusterSource {
                    custom_config: files.nodes.display().to_string(),
                },
                app_list: vec![AppSource {
                    name: format!("pods-{node_count}"),
                    path: files.pods.display().to_string(),
                }],
                new_node: self.new_node_template.display().to_string(),
            },
        }
    }

    fn prefix_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            fallback
        } else {
            &self.prefix
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}
