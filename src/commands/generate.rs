//! Generate - staged node and pod fixtures
//!
//! Loads the node and pod streams, packs pods onto nodes stage by stage and
//! writes one node file and one pod file per stage.

use anyhow::{Context as _, Result};
use colored::Colorize;
use fixturekit::document::{load_single, load_stream};
use fixturekit::record::{nodes_from_documents, pods_from_documents};
use fixturekit::{
    HollowNodeTemplate, Layout, NodeRecord, OutputWriter, PodRecord, StageFiles, StagedGenerator,
};
use std::fs;

use crate::Context;
use crate::cli::GenerateArgs;
use crate::config::{FileConfig, GenerateConfig};
use crate::progress::{self, SpinnerReporter};
use crate::ui;

struct Inputs {
    nodes: Vec<NodeRecord>,
    pods: Vec<PodRecord>,
    template: Option<HollowNodeTemplate>,
}

struct StageSummary {
    node_count: usize,
    placed: usize,
    missed: usize,
    pending: usize,
    files: StageFiles,
}

pub fn run(ctx: &Context, args: GenerateArgs) -> Result<()> {
    let file = match FileConfig::discover(args.config.as_deref())? {
        Some((path, file)) => {
            log::info!("Loaded config {}", path.display());
            file
        }
        None => FileConfig::default(),
    };
    let config = GenerateConfig::resolve(&args, file)?;

    if !ctx.quiet {
        ui::timestamped(&format!(
            "{} backend selected",
            config.backend.to_string().cyan()
        ));
    }

    if ctx.verbose > 0 && !ctx.quiet {
        show_config(&config);
    }

    let pb = progress::spinner("Loading...", ctx.quiet);
    let inputs = match load_inputs(&config) {
        Ok(inputs) => inputs,
        Err(e) => {
            progress::finish_error(&pb, "Loading failed");
            return Err(e);
        }
    };
    progress::finish_success(
        &pb,
        &format!(
            "Loaded {} and {}",
            ui::plural(inputs.nodes.len(), "node", "nodes"),
            ui::plural(inputs.pods.len(), "pod", "pods")
        ),
    );
    if inputs.nodes.len() < config.node_count {
        ui::warn(&format!(
            "Requested {} nodes but {} only has {}",
            config.node_count,
            config.nodes_path.display(),
            inputs.nodes.len()
        ));
    }

    let packer = config.backend.packer(inputs.template, config.policy)?;
    let layout = if packer.node_variant().routes_per_stage() {
        Layout::PerStage
    } else {
        Layout::Flat
    };
    let writer = OutputWriter::new(&config.output_folder, config.backend.file_prefix())
        .with_extension(config.extension.as_str())
        .with_layout(layout)
        .with_new_node_template(&config.new_node_template);
    let generator = StagedGenerator::new(
        inputs.nodes,
        inputs.pods,
        config.increment,
        packer,
        config.mode,
    );

    if args.dry_run {
        show_plan(&config, &generator, &writer);
        return Ok(());
    }

    fs::create_dir_all(&config.output_folder).with_context(|| {
        format!(
            "Could not create output folder {}",
            config.output_folder.display()
        )
    })?;

    let total = generator.plans().len();
    let pb = progress::spinner("Generating...", ctx.quiet);
    let mut generator = generator.with_progress(SpinnerReporter::new(pb.clone()));
    let mut summaries = Vec::with_capacity(total);

    for stage in generator.by_ref() {
        let files = match writer.write_stage(&stage) {
            Ok(files) => files,
            Err(e) => {
                progress::finish_error(&pb, "Generation failed");
                return Err(e).with_context(|| {
                    format!(
                        "Failed to write stage {} of {total} ({} nodes)",
                        stage.index + 1,
                        stage.node_count()
                    )
                });
            }
        };

        if !ctx.quiet {
            pb.suspend(|| {
                ui::timestamped(&format!(
                    "[{}/{total}] Generated {} nodes, {} placed",
                    stage.index + 1,
                    stage.node_count(),
                    ui::plural(stage.placements.len(), "pod", "pods")
                ));
            });
        }
        summaries.push(StageSummary {
            node_count: stage.node_count(),
            placed: stage.placements.len(),
            missed: stage.misses.len(),
            pending: stage.pending,
            files,
        });
    }
    progress::finish_success(
        &pb,
        &format!("Generated {}", ui::plural(summaries.len(), "stage", "stages")),
    );

    if !ctx.quiet {
        show_summary(&summaries, generator.pending().len());
        ui::success(&format!(
            "Files saved to output folder: {}",
            config.output_folder.display()
        ));
    }
    Ok(())
}

fn load_inputs(config: &GenerateConfig) -> Result<Inputs> {
    let template = if config.backend.needs_template() {
        let doc = load_single(&config.hollow_node_template)?;
        let template = HollowNodeTemplate::new(doc).with_context(|| {
            format!("Unusable template {}", config.hollow_node_template.display())
        })?;
        Some(template)
    } else {
        None
    };

    let nodes = nodes_from_documents(load_stream(&config.nodes_path, Some(config.node_count))?)
        .with_context(|| format!("Invalid node in {}", config.nodes_path.display()))?;
    let pods = pods_from_documents(load_stream(&config.pods_path, None)?)
        .with_context(|| format!("Invalid pod in {}", config.pods_path.display()))?;

    Ok(Inputs {
        nodes,
        pods,
        template,
    })
}

fn show_config(config: &GenerateConfig) {
    ui::header("Settings");
    ui::kv("Output folder", &config.output_folder.display().to_string());
    ui::kv("Nodes", &config.nodes_path.display().to_string());
    ui::kv("Pods", &config.pods_path.display().to_string());
    ui::kv("Node count", &config.node_count.to_string());
    ui::kv("Increment", &config.increment.to_string());
    ui::kv("Miss policy", &config.policy.to_string());
    ui::kv("Output", &config.mode.to_string());
    if config.backend.needs_template() {
        ui::kv("Template", &config.hollow_node_template.display().to_string());
    }
    println!();
}

fn show_plan(config: &GenerateConfig, generator: &StagedGenerator<'_>, writer: &OutputWriter) {
    ui::header("Stage plan");
    ui::kv("Backend", config.backend.name());
    ui::kv("Miss policy", &config.policy.to_string());
    ui::kv("Output", &generator.mode().to_string());
    ui::kv("Pods", &generator.pending().len().to_string());
    println!();

    let total = generator.plans().len();
    for (i, plan) in generator.plans().iter().enumerate() {
        let files = writer.stage_files(plan.node_count());
        ui::step(i + 1, total, &format!("nodes {plan}"));
        ui::dim(&files.nodes.display().to_string());
        ui::dim(&files.pods.display().to_string());
        if let Some(manifest) = &files.manifest {
            ui::dim(&manifest.display().to_string());
        }
    }
    if total == 0 {
        ui::warn("No nodes loaded, nothing would be generated");
    }
    println!();
    ui::info("Dry run - nothing written");
}

fn show_summary(summaries: &[StageSummary], never_placed: usize) {
    ui::header("Summary");
    for summary in summaries {
        let missed = if summary.missed > 0 {
            format!(", {} missed", summary.missed).yellow().to_string()
        } else {
            String::new()
        };
        ui::kv(
            &format!("{} nodes", summary.node_count),
            &format!(
                "{} placed{missed}, {} pending",
                ui::plural(summary.placed, "pod", "pods"),
                summary.pending
            ),
        );
        ui::dim(&summary.files.nodes.display().to_string());
        ui::dim(&summary.files.pods.display().to_string());
        if let Some(manifest) = &summary.files.manifest {
            ui::dim(&manifest.display().to_string());
        }
    }
    if never_placed > 0 {
        ui::dim(&format!(
            "{} never fit any node and were left out",
            ui::plural(never_placed, "pod", "pods")
        ));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const NODES: &str = "\
metadata:
  name: a
  labels: {zone: z1}
status:
  capacity: {cpu: 4000m, memory: 8192Mi}
  allocatable: {cpu: 4000m, memory: 8192Mi}
---
metadata:
  name: b
  labels: {zone: z2}
status:
  capacity: {cpu: 2000m, memory: 4096Mi}
  allocatable: {cpu: 2000m, memory: 4096Mi}
---
metadata:
  name: c
  labels: {zone: z3}
status:
  capacity: {cpu: 1000m, memory: 2048Mi}
  allocatable: {cpu: 1000m, memory: 2048Mi}
";

    fn pod(name: &str, cpu: u64, memory: u64) -> String {
        format!(
            "metadata: {{name: {name}}}\nspec:\n  containers:\n  - name: main\n    resources:\n      requests: {{cpu: {cpu}m, memory: {memory}Mi}}\n"
        )
    }

    fn setup(tmp: &TempDir) -> GenerateArgs {
        let nodes = tmp.path().join("nodes.yaml");
        let pods = tmp.path().join("pods.yaml");
        fs::write(&nodes, NODES).unwrap();
        fs::write(
            &pods,
            [
                pod("p1", 1000, 1024),
                pod("p2", 3000, 4096),
                pod("p3", 500, 512),
                pod("p4", 2000, 8192),
            ]
            .join("---\n"),
        )
        .unwrap();

        GenerateArgs {
            output_folder: Some(tmp.path().join("out")),
            nodes_path: Some(nodes),
            pods_path: Some(pods),
            config: Some(tmp.path().join("empty.toml")),
            ..Default::default()
        }
    }

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    fn docs(path: PathBuf) -> Vec<serde_yaml::Value> {
        fixturekit::document::parse_stream(&fs::read_to_string(path).unwrap(), None).unwrap()
    }

    #[test]
    fn test_generate_single_stage() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.toml"), "").unwrap();
        let args = setup(&tmp);

        run(&quiet(), args).unwrap();

        let out = tmp.path().join("out");
        assert_eq!(docs(out.join("nodes-3.yaml")).len(), 3);
        let pods = docs(out.join("pods-3.yaml"));
        let names: Vec<_> = pods
            .iter()
            .map(|p| p["metadata"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["p1", "p2", "p3"]);
    }

    #[test]
    fn test_generate_kwok_stages() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.toml"), "backend = \"kwok\"\n").unwrap();
        let args = GenerateArgs {
            increment: Some(2),
            ..setup(&tmp)
        };

        run(&quiet(), args).unwrap();

        let out = tmp.path().join("out");
        let first = docs(out.join("kwok-nodes-2.yaml"));
        let last = docs(out.join("kwok-nodes-3.yaml"));
        assert_eq!(first.len(), 2);
        assert_eq!(last.len(), 3);
        assert_eq!(
            last[2]["metadata"]["annotations"]["kwok.x-k8s.io/node"],
            serde_yaml::Value::from("fake")
        );
        let pods = docs(out.join("kwok-pods-3.yaml"));
        assert!(pods.iter().all(|p| p["spec"]["tolerations"].is_sequence()));
    }

    #[test]
    fn test_generate_simulator_layout() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.toml"), "").unwrap();
        let args = GenerateArgs {
            increment: Some(2),
            backend: Some(crate::cli::BackendArg::Simulator),
            ..setup(&tmp)
        };

        run(&quiet(), args).unwrap();

        let out = tmp.path().join("out");
        assert!(out.join("2").join("simulator-config-2.yaml").exists());
        // delta output: the second stage only has node c
        assert_eq!(docs(out.join("3").join("simulator-nodes-3.yaml")).len(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.toml"), "").unwrap();
        let args = GenerateArgs {
            dry_run: true,
            ..setup(&tmp)
        };

        run(&quiet(), args).unwrap();
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn test_missing_template_fails_before_output() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.toml"), "").unwrap();
        let args = GenerateArgs {
            backend: Some(crate::cli::BackendArg::Kubemark),
            hollow_node_template: Some(tmp.path().join("missing.yml")),
            ..setup(&tmp)
        };

        assert!(run(&quiet(), args).is_err());
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn test_bad_quantity_fails_before_output() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.toml"), "").unwrap();
        let args = setup(&tmp);
        fs::write(args.pods_path.as_ref().unwrap(), pod("p1", 1, 1).replace("1m", "lots")).unwrap();

        let err = run(&quiet(), args).unwrap_err();
        assert!(format!("{err:#}").contains("lots"));
        assert!(!tmp.path().join("out").exists());
    }
}
