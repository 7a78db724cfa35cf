//! End-to-end FedAvg simulation on synthetic blobs
//!
//! Run with `cargo run --example simulate [config.toml]`; `FEDSIM_*`
//! environment variables override individual settings.

use std::path::PathBuf;
use std::sync::Arc;

use fedsim::client::LocalOptions;
use fedsim::logging::init_tracing;
use fedsim::partition::{DataIndices, Separation};
use fedsim::{
    DatasetArgs, ExperimentContext, InMemoryDataset, ModelKind, ParamMode, Partition, RunConfig,
    Server, SgdClient, TracingObserver,
};

const N_CLIENTS: usize = 20;
const SAMPLES_PER_CLIENT: usize = 50;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(false);

    let path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = RunConfig::load(path.as_deref())?;
    if path.is_none() {
        config.global_epoch = 20;
        config.join_ratio = 0.3;
        config.test_gap = 5;
        config.local_lr = 0.1;
    }

    println!("fedsim {} demo\n", fedsim::VERSION);
    println!(
        "Simulating {} clients, {} rounds, join ratio {}...\n",
        N_CLIENTS, config.global_epoch, config.join_ratio
    );

    // Each client holds a contiguous slice; 80% train, 20% test.
    let partition = Partition {
        separation: Separation {
            train: (0..N_CLIENTS).collect(),
            test: (0..N_CLIENTS).collect(),
            total: N_CLIENTS,
        },
        data_indices: (0..N_CLIENTS)
            .map(|c| {
                let start = c * SAMPLES_PER_CLIENT;
                let split = start + SAMPLES_PER_CLIENT * 4 / 5;
                DataIndices {
                    train: (start..split).collect(),
                    test: (split..start + SAMPLES_PER_CLIENT).collect(),
                }
            })
            .collect(),
        data_indices_pretrain: None,
    };
    let dataset = Arc::new(InMemoryDataset::synthetic_blobs(
        N_CLIENTS * SAMPLES_PER_CLIENT,
        8,
        4,
        1.5,
        config.seed,
    ));

    let ctx = ExperimentContext::new(config, partition, DatasetArgs::default())?;
    let kind: ModelKind = ctx.config.model.parse()?;
    let model = kind.build(8, 4, ctx.config.seed);
    let trainer = SgdClient::new(
        model.as_ref(),
        dataset,
        &ctx.partition,
        LocalOptions::from(&ctx.config),
    );

    let algo = ctx.config.algo.clone();
    let report = Server::new(algo, ctx, ParamMode::Shared, model, trainer)?
        .with_observer(TracingObserver)
        .run()?;

    println!("Test results:");
    for (round, summary) in &report.test_results {
        println!("   [{:>3}] loss {}  acc {}", round, summary.loss, summary.accuracy);
    }
    println!("\nTest accuracy milestones (after local training):");
    for m in &report.convergence.test_after {
        println!("   {}% reached at round {} ({:.2}%)", m.threshold, m.round, m.accuracy);
    }
    println!(
        "\nAggregated {} rounds, final parameter norm {:.4}",
        report.audit.len(),
        report.final_global.l2_norm()
    );
    Ok(())
}
