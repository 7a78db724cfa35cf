//! Integration tests for the fedsim orchestrator

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};

use fedsim::client::LocalOptions;
use fedsim::ledger::SplitMetrics;
use fedsim::partition::{DataIndices, Separation};
use fedsim::{
    ClientId, ClientMetrics, ClientTrainer, DatasetArgs, EvalStats, ExperimentContext,
    InMemoryDataset, LocalUpdate, Metrics, ModelKind, ParamMode, ParameterSnapshot, Partition,
    RoundObserver, RunConfig, RunReport, SampleStream, Server, SgdClient, SimError, SplitPolicy,
};

#[derive(Clone, Debug, PartialEq)]
enum Event {
    RoundStart(usize),
    Train(ClientId, f32),
    RoundEnd(usize),
}

type EventLog = Arc<Mutex<Vec<Event>>>;

/// Moves every parameter of client `c` to the value `c`.
struct StubTrainer {
    events: EventLog,
    sizes: Vec<u64>,
    fail_on: Option<ClientId>,
    keep_local: bool,
}

impl StubTrainer {
    fn new(sizes: Vec<u64>) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            sizes,
            fail_on: None,
            keep_local: true,
        }
    }
}

impl ClientTrainer for StubTrainer {
    fn train(
        &self,
        client: ClientId,
        params: &ParameterSnapshot,
        _verbose: bool,
    ) -> Result<LocalUpdate, SimError> {
        let seen = params.values()[1].iter().next().copied().unwrap();
        self.events.lock().unwrap().push(Event::Train(client, seen));
        if self.fail_on == Some(client) {
            return Err(SimError::Trainer(format!("client {} diverged", client)));
        }

        let mut end = params.zeros_like();
        for value in end.values_mut() {
            value.fill(client as f32);
        }
        let size = self.sizes[client];
        let metrics = ClientMetrics {
            before: SplitMetrics {
                train: Metrics::new(size / 2, 1.0, size),
                test: Metrics::new(1, 1.0, 4),
            },
            after: SplitMetrics {
                train: Metrics::new(size, 0.5, size),
                test: Metrics::new(3, 0.5, 4),
            },
        };
        Ok(LocalUpdate {
            delta: params.sub(&end)?,
            weight: size,
            metrics,
            local_params: self.keep_local.then_some(end),
        })
    }

    fn test(&self, _client: ClientId, _params: &ParameterSnapshot) -> Result<EvalStats, SimError> {
        Ok(EvalStats {
            before: Metrics::new(1, 2.0, 4),
            after: Metrics::new(2, 1.0, 4),
        })
    }
}

struct Recorder(EventLog);

impl RoundObserver for Recorder {
    fn on_round_start(&mut self, round: usize, _selected: &[ClientId]) {
        self.0.lock().unwrap().push(Event::RoundStart(round));
    }

    fn on_round_end(&mut self, round: usize, _summary: &fedsim::RoundSummary) {
        self.0.lock().unwrap().push(Event::RoundEnd(round));
    }
}

fn partition(n_clients: usize, samples_per_client: usize) -> Partition {
    let ids: Vec<ClientId> = (0..n_clients).collect();
    Partition {
        separation: Separation {
            train: ids.clone(),
            test: ids,
            total: n_clients,
        },
        data_indices: (0..n_clients)
            .map(|c| {
                let start = c * samples_per_client;
                let split = start + samples_per_client * 3 / 4;
                DataIndices {
                    train: (start..split).collect(),
                    test: (split..start + samples_per_client).collect(),
                }
            })
            .collect(),
        data_indices_pretrain: None,
    }
}

fn config(rounds: usize, join_ratio: f64) -> RunConfig {
    RunConfig {
        global_epoch: rounds,
        join_ratio,
        local_epoch: 2,
        local_lr: 0.1,
        batch_size: 8,
        test_gap: 2,
        ..RunConfig::default()
    }
}

fn context(config: RunConfig, partition: Partition) -> ExperimentContext {
    ExperimentContext::new(config, partition, DatasetArgs::default()).unwrap()
}

fn stub_server(
    config: RunConfig,
    mode: ParamMode,
    trainer: StubTrainer,
) -> (Server<StubTrainer>, EventLog) {
    let events = Arc::clone(&trainer.events);
    let n = trainer.sizes.len();
    let model = ModelKind::Logistic.build(2, 2, 0);
    let server = Server::new("FedAvg", context(config, partition(n, 8)), mode, model, trainer)
        .unwrap()
        .with_observer(Recorder(Arc::clone(&events)));
    (server, events)
}

fn sgd_run(parallel: bool) -> RunReport {
    let config = RunConfig {
        parallel_clients: parallel,
        save_allstats: true,
        ..config(4, 0.5)
    };
    let ctx = context(config, partition(6, 20));
    let dataset = InMemoryDataset::synthetic_blobs(120, 3, 2, 0.5, 11);
    let model = ModelKind::Logistic.build(3, 2, ctx.config.seed);
    let trainer = SgdClient::new(
        model.as_ref(),
        Arc::new(dataset),
        &ctx.partition,
        LocalOptions::from(&ctx.config),
    );
    Server::new("FedAvg", ctx, ParamMode::Shared, model, trainer)
        .unwrap()
        .run()
        .unwrap()
}

#[test]
fn test_sgd_run_is_deterministic() {
    let a = sgd_run(false);
    let b = sgd_run(false);
    assert_eq!(a.ledger.len(), 12);
    assert_eq!(a.ledger, b.ledger);
    assert_eq!(a.allstats, b.allstats);
    assert_eq!(a.convergence, b.convergence);
    assert_eq!(a.audit, b.audit);
    assert_eq!(a.test_results, b.test_results);
    assert_eq!(a.final_global, b.final_global);
}

#[test]
fn test_parallel_clients_match_sequential() {
    let sequential = sgd_run(false);
    let parallel = sgd_run(true);
    assert_eq!(sequential.final_global, parallel.final_global);
    assert_eq!(sequential.audit, parallel.audit);
    assert_eq!(sequential.ledger, parallel.ledger);
    assert_eq!(sequential.allstats, parallel.allstats);
    assert_eq!(sequential.convergence, parallel.convergence);
    assert_eq!(sequential.test_results, parallel.test_results);
}

#[test]
fn test_round_barrier_and_sorted_order() {
    let sizes = vec![10, 20, 30, 40, 50];
    let trainer = StubTrainer::new(sizes.clone());
    let (server, events) = stub_server(config(4, 0.6), ParamMode::Shared, trainer);
    let stream = server.sample_stream().clone();
    server.run().unwrap();

    let events = events.lock().unwrap().clone();
    let mut cursor = events.iter();
    let mut previous: Option<f32> = None;
    for (round, selected) in stream.iter() {
        assert_eq!(cursor.next(), Some(&Event::RoundStart(round)));
        for &client in selected {
            match cursor.next() {
                Some(Event::Train(c, seen)) => {
                    assert_eq!(*c, client);
                    if let Some(expected) = previous {
                        assert!((seen - expected).abs() < 1e-4, "round {} saw {}", round, seen);
                    }
                }
                other => panic!("expected train call for {}, got {:?}", client, other),
            }
        }
        assert_eq!(cursor.next(), Some(&Event::RoundEnd(round)));

        let total: u64 = selected.iter().map(|&c| sizes[c]).sum();
        let aggregated: f64 = selected
            .iter()
            .map(|&c| sizes[c] as f64 / total as f64 * c as f64)
            .sum();
        previous = Some(aggregated as f32);
    }
    assert_eq!(cursor.next(), None);
}

#[test]
fn test_weight_conservation_in_audit() {
    let sizes = vec![3, 1, 4, 1, 5];
    let trainer = StubTrainer::new(sizes.clone());
    let (server, _) = stub_server(config(5, 0.6), ParamMode::Shared, trainer);
    let stream = server.sample_stream().clone();
    let report = server.run().unwrap();

    assert_eq!(report.audit.len(), 5);
    let mut expected_total = 0;
    for (round, selected) in stream.iter() {
        let entry = report.audit.round(round).unwrap();
        let round_weight: u64 = selected.iter().map(|&c| sizes[c]).sum();
        assert_eq!(entry.n_clients, selected.len());
        assert_eq!(entry.total_weight, round_weight);
        expected_total += round_weight;
    }
    assert_eq!(report.audit.total_weight(), expected_total);
    let rounds: Vec<usize> = report.audit.iter().map(|e| e.round).collect();
    assert_eq!(rounds, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_ledger_records_each_pair_once() {
    let (server, _) = stub_server(config(3, 0.6), ParamMode::Shared, StubTrainer::new(vec![10; 5]));
    let stream = server.sample_stream().clone();
    let mut report = server.run().unwrap();

    assert_eq!(stream.len(), 3);
    assert!(stream.iter().all(|(_, selected)| selected.len() == 3));
    assert_eq!(report.ledger.len(), 9);

    for (round, selected) in stream.iter() {
        for &client in selected {
            let again = report.ledger.record(client, round, ClientMetrics::default());
            assert!(matches!(again, Err(SimError::DuplicateRecord { .. })));
        }
    }
    assert_eq!(report.ledger.len(), 9);
}

#[test]
fn test_sample_stream_is_shared_across_algorithms() {
    let (a, _) = stub_server(config(6, 0.4), ParamMode::Shared, StubTrainer::new(vec![5; 5]));
    let (b, _) = stub_server(config(6, 0.4), ParamMode::Personalized, StubTrainer::new(vec![7; 5]));
    assert_eq!(a.sample_stream(), b.sample_stream());
    assert_eq!(
        a.sample_stream(),
        &SampleStream::generate(&[0, 1, 2, 3, 4], 0.4, 6, RunConfig::default().seed).unwrap()
    );
}

#[test]
fn test_test_results_keys_and_format() {
    let (server, _) = stub_server(config(5, 0.6), ParamMode::Shared, StubTrainer::new(vec![10; 5]));
    let report = server.run().unwrap();

    let keys: Vec<usize> = report.test_results.keys().copied().collect();
    assert_eq!(keys, vec![0, 2, 4]);
    assert_eq!(report.test_results[&0].accuracy, "25.00% -> 50.00%");
    assert_eq!(report.test_results[&0].loss, "0.5000 -> 0.2500");
}

#[test]
fn test_shared_mode_hands_out_one_snapshot() {
    let (server, _) = stub_server(config(2, 0.6), ParamMode::Shared, StubTrainer::new(vec![10; 5]));
    let store = server.store();
    assert!(Arc::ptr_eq(&store.snapshot_for(0), &store.snapshot_for(4)));
    assert_eq!(store.client_table().count(), 0);
}

#[test]
fn test_personalized_mode_keeps_clients_isolated() {
    let trainer = StubTrainer::new(vec![10; 5]);
    let (server, _) = stub_server(config(1, 0.4), ParamMode::Personalized, trainer);
    let initial = server.store().global().clone();
    let selected = server.sample_stream().round(0).unwrap().to_vec();
    let report = server.run().unwrap();

    assert_eq!(report.client_params.len(), 5);
    for (client, params) in &report.client_params {
        if selected.contains(client) {
            assert!(params.values().iter().all(|v| v.iter().all(|&x| x == *client as f32)));
        } else {
            assert_eq!(params, &initial);
        }
    }
    assert_ne!(report.final_global, initial);
}

#[test]
fn test_personalized_requires_local_params() {
    let mut trainer = StubTrainer::new(vec![10; 5]);
    trainer.keep_local = false;
    let (server, _) = stub_server(config(2, 0.6), ParamMode::Personalized, trainer);
    assert!(matches!(
        server.run(),
        Err(SimError::MissingLocalParameters { .. })
    ));
}

#[test]
fn test_trainer_error_aborts_run() {
    let mut trainer = StubTrainer::new(vec![10; 5]);
    trainer.fail_on = Some(2);
    let (server, _) = stub_server(config(10, 1.0), ParamMode::Shared, trainer);
    assert!(matches!(server.run(), Err(SimError::Trainer(_))));
}

#[test]
fn test_zero_weight_round_fails() {
    let (server, _) = stub_server(config(2, 0.6), ParamMode::Shared, StubTrainer::new(vec![0; 5]));
    assert!(matches!(server.run(), Err(SimError::ZeroAggregationWeight)));
}

#[test]
fn test_user_split_reports_no_test_accuracy() {
    let mut p = partition(4, 8);
    p.separation.train = vec![0, 1];
    p.separation.test = vec![2, 3];
    let user = DatasetArgs {
        split: SplitPolicy::User,
        ..DatasetArgs::default()
    };
    let config = RunConfig {
        save_allstats: true,
        ..config(2, 1.0)
    };
    let ctx = ExperimentContext::new(config, p, user).unwrap();
    let model = ModelKind::Logistic.build(2, 2, 0);
    let trainer = StubTrainer::new(vec![8; 4]);
    let server = Server::new("FedAvg", ctx, ParamMode::Shared, model, trainer).unwrap();
    let report = server.run().unwrap();

    assert_eq!(
        report.allstats[&0][&1],
        "acc (train): 50.00% -> 100.00%, acc (test): 0.00% -> 0.00%"
    );
    assert!(!report.allstats.contains_key(&2));
}

#[test]
fn test_persisted_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        dataset: "blobs".to_string(),
        log: true,
        save_allstats: true,
        save_model: true,
        log_dir: dir.path().join("logs"),
        model_dir: dir.path().join("models"),
        ..config(3, 0.6)
    };
    let (server, _) = stub_server(config, ParamMode::Shared, StubTrainer::new(vec![10; 5]));
    let report = server.run().unwrap();

    let log = fs::read_to_string(dir.path().join("logs/blobs/FedAvg.log")).unwrap();
    assert!(log.starts_with("==================== ALGORITHM: FedAvg"));
    assert!(log.contains("Convergence on test data:"));

    let allstats: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(
        &fs::read_to_string(dir.path().join("logs/blobs/FedAvg_allstats.json")).unwrap(),
    )
    .unwrap();
    let (_, rounds) = allstats.iter().next().unwrap();
    assert!(rounds.values().all(|s| s.starts_with("acc (train): ")));

    let saved: ParameterSnapshot = serde_json::from_str(
        &fs::read_to_string(dir.path().join("models/FedAvg_blobs_3_logistic.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved, report.final_global);
}

#[test]
fn test_pretraining_reseeds_parameters() {
    let mut p = partition(4, 20);
    p.data_indices_pretrain = Some(DataIndices {
        train: (80..121).collect(),
        test: vec![],
    });
    let config = RunConfig {
        pretrain_epoch: 3,
        pretrain_lr: 0.5,
        ..config(1, 0.5)
    };
    let ctx = context(config, p);
    let dataset = Arc::new(InMemoryDataset::synthetic_blobs(121, 3, 2, 0.5, 3));
    let model = ModelKind::Logistic.build(3, 2, 0);
    let initial = model.trainable_parameters();
    let trainer = SgdClient::new(
        model.as_ref(),
        dataset.clone(),
        &ctx.partition,
        LocalOptions::from(&ctx.config),
    );

    let server = Server::new("FedAvg", ctx.clone(), ParamMode::Shared, model.clone(), trainer)
        .unwrap()
        .with_pretrain_data(dataset);
    let report = server.run().unwrap();
    assert_ne!(report.final_global, initial);

    let trainer = SgdClient::new(
        model.as_ref(),
        Arc::new(InMemoryDataset::synthetic_blobs(121, 3, 2, 0.5, 3)),
        &ctx.partition,
        LocalOptions::from(&ctx.config),
    );
    let without_data = Server::new("FedAvg", ctx, ParamMode::Shared, model, trainer).unwrap();
    assert!(matches!(
        without_data.run(),
        Err(SimError::MissingPretrainData)
    ));
}

#[test]
fn test_server_rejects_unvalidated_context() {
    let ctx = ExperimentContext {
        config: RunConfig {
            test_gap: 0,
            ..config(2, 0.6)
        },
        partition: partition(5, 8),
        dataset_args: DatasetArgs::default(),
    };
    let model = ModelKind::Logistic.build(2, 2, 0);
    let trainer = StubTrainer::new(vec![10; 5]);
    let server = Server::new("FedAvg", ctx, ParamMode::Shared, model, trainer);
    assert!(matches!(server, Err(SimError::InvalidConfig(_))));

    let mut broken = partition(5, 8);
    broken.separation.train.push(7);
    let ctx = ExperimentContext {
        config: config(2, 0.6),
        partition: broken,
        dataset_args: DatasetArgs::default(),
    };
    let model = ModelKind::Logistic.build(2, 2, 0);
    let trainer = StubTrainer::new(vec![10; 5]);
    let server = Server::new("FedAvg", ctx, ParamMode::Shared, model, trainer);
    assert!(matches!(server, Err(SimError::InvalidConfig(_))));
}

#[test]
fn test_missing_partition_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        dataset: "cifar10".to_string(),
        data_root: dir.path().to_path_buf(),
        ..RunConfig::default()
    };
    assert!(matches!(
        ExperimentContext::load(config),
        Err(SimError::PartitionNotFound { .. })
    ));
}

#[test]
fn test_context_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let dataset_dir = dir.path().join("blobs");
    fs::create_dir_all(&dataset_dir).unwrap();
    fs::write(
        dataset_dir.join("partition.json"),
        serde_json::to_string(&partition(5, 8)).unwrap(),
    )
    .unwrap();
    fs::write(dataset_dir.join("args.json"), r#"{"split": "sample", "fraction": 0.75}"#).unwrap();

    let config = RunConfig {
        dataset: "blobs".to_string(),
        data_root: dir.path().to_path_buf(),
        client_num_in_total: Some(5),
        ..RunConfig::default()
    };
    let ctx = ExperimentContext::load(config).unwrap();
    assert_eq!(ctx.partition.train_clients().len(), 5);
    assert_eq!(ctx.dataset_args.split, SplitPolicy::Sample);
}
