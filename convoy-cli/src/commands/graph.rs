use crate::delivery;
use crate::output;

use clap::Args;
use color_eyre::Result;

use pipeline_engine::JobGraph;

/// Show the pipeline's jobs, dependencies, and execution tiers
#[derive(Args, Debug)]
pub struct GraphArgs {}

pub fn execute(_args: GraphArgs) -> Result<()> {
    let pipeline = delivery::pipeline();
    let graph = JobGraph::from_pipeline(&pipeline)
        .map_err(|e| color_eyre::eyre::eyre!("invalid pipeline: {}", e))?;

    output::header(&format!(
        "Pipeline '{}' ({} jobs, triggers on: {})",
        pipeline.name,
        graph.len(),
        pipeline.trigger.branches.join(", ")
    ));

    for (index, tier) in graph.tiers().iter().enumerate() {
        println!("tier {}:", index);
        for node in tier {
            let deps = if node.dependencies.is_empty() {
                String::new()
            } else {
                format!("  <- {}", node.dependencies.join(", "))
            };
            let matrix = if node.job.matrix.is_empty() {
                String::new()
            } else {
                format!(
                    "  [{}]",
                    node.job
                        .matrix
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            println!(
                "  {} ({} steps){}{}",
                node.job.name,
                node.job.steps.len(),
                matrix,
                deps
            );
        }
    }

    Ok(())
}
