//! Sweeps over a synthetic dataset written to disk: per-cell artifacts,
//! the running-max summary and resuming by position.

use std::fs;
use std::path::{Path, PathBuf};

use voxreg_core::sweep::{PARAMS_FILE, SCORES_MEAN_FILE, SCORES_SEM_FILE, SUMMARY_FILE};
use voxreg_core::{
    CrossValidation, DataConfig, EncodingError, ExperimentParams, NpyStoryLoader, PredictorChoice, ResolvedParams, ResultsSummary,
    RidgeImplementation, ShuffleState, Sweep, SyntheticConfig, SyntheticDataset,
};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("voxreg_sweep_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writes a small dataset and returns its directory with the resolved params
fn setup(name: &str, do_shuffle: bool) -> (PathBuf, ResolvedParams) {
    let root = scratch(name);
    let dataset = SyntheticDataset::generate(&SyntheticConfig {
        n_stories: 3,
        min_rows: 40,
        max_rows: 50,
        embedding_dim: 4,
        n_voxels: 5,
        subjects: vec!["UTS01".to_string()],
        seed: 1,
        ..SyntheticConfig::default()
    });
    dataset.write(&root.join("data")).unwrap();

    let data = DataConfig {
        data_dir: root.join("data"),
        runs_dir: root.join("runs"),
        stories: dataset.stories.clone(),
        ..DataConfig::default()
    };
    let params = ExperimentParams {
        cross_validation: CrossValidation::Loocv,
        predictor: vec![PredictorChoice::Envelope],
        n_train_stories: vec![1],
        subject: vec!["UTS01".to_string()],
        n_delays: 2,
        ridge_implementation: RidgeImplementation::RidgeCv,
        do_shuffle,
        seed: Some(3),
        ..ExperimentParams::default()
    }
    .resolve(&data)
    .unwrap();
    (root, params)
}

fn loader(root: &Path, params: &ResolvedParams) -> NpyStoryLoader {
    NpyStoryLoader::new(root.join("data"), params.n_delays, params.interpolation, params.use_cache)
}

/// Same keys, values equal up to JSON float parsing
fn assert_close(a: &ResultsSummary, b: &ResultsSummary) {
    assert_eq!(a.len(), b.len());
    for (key, value) in a.iter() {
        let other = b.get(key).unwrap();
        assert!((value - other).abs() < 1e-12, "{:?}: {} vs {}", key, value, other);
    }
}

#[test]
fn summary_is_persisted_after_every_cell() {
    let (root, params) = setup("persist", true);
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    let sweep = Sweep::new(&params, &loader, &run_folder);
    let cells = sweep.cells();
    assert_eq!(cells.len(), 2);

    let summary_path = sweep.summary_path();
    let mut on_disk = Vec::new();
    let summary = sweep
        .run_with(|_, _| on_disk.push(ResultsSummary::load(&summary_path).unwrap()))
        .unwrap();

    // after the first cell only its own value is on disk
    assert_eq!(on_disk[0].len(), 1);
    assert!(on_disk[0].get(&cells[0].key()).is_some());
    assert!(on_disk[0].get(&cells[1].key()).is_none());

    // after the second both are
    assert_eq!(on_disk[1].len(), 2);
    assert_close(&on_disk[1], &summary);
    assert_eq!(summary.len(), 2);
    assert_eq!(cells[0].shuffle, ShuffleState::NotShuffled);
    assert_eq!(cells[1].shuffle, ShuffleState::Shuffled);
    assert!(summary.get(&cells[0].key()).unwrap() > 0.0);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert!(json["envelope"]["UTS01"]["1"]["not_shuffled"].is_number());
    assert!(json["envelope"]["UTS01"]["1"]["shuffled"].is_number());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn cell_artifacts_are_written() {
    let (root, params) = setup("artifacts", false);
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    Sweep::new(&params, &loader, &run_folder).run().unwrap();

    assert!(run_folder.join(PARAMS_FILE).exists());
    assert!(run_folder.join(SUMMARY_FILE).exists());

    let cell_dir = run_folder.join("UTS01").join("envelope").join("1").join("not_shuffled");
    let mean: ndarray::Array1<f64> = ndarray_npy::read_npy(cell_dir.join(SCORES_MEAN_FILE)).unwrap();
    let sem: ndarray::Array1<f64> = ndarray_npy::read_npy(cell_dir.join(SCORES_SEM_FILE)).unwrap();
    assert_eq!(mean.len(), 5);
    assert_eq!(sem.len(), 5);

    // LOOCV with one training story runs over the first two stories
    for fold in 0..2 {
        let fold_dir = cell_dir.join(format!("fold_{}", fold));
        let weights: ndarray::Array2<f64> = ndarray_npy::read_npy(fold_dir.join("weights.npy")).unwrap();
        // one envelope column, two delays
        assert_eq!(weights.dim(), (2, 5));
        assert!(fold_dir.join("scores.npy").exists());
        assert!(fold_dir.join("best_alphas.npy").exists());
        assert!(fold_dir.join("partition.json").exists());
    }
    assert!(!cell_dir.join("fold_2").exists());

    let saved: ResolvedParams =
        serde_json::from_str(&fs::read_to_string(run_folder.join(PARAMS_FILE)).unwrap()).unwrap();
    assert_eq!(saved, params);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resume_skips_finished_cells_and_keeps_their_results() {
    let (root, params) = setup("resume", true);
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    let full = Sweep::new(&params, &loader, &run_folder).run().unwrap();

    // pretend the run died after the first cell
    let cells = Sweep::new(&params, &loader, &run_folder).cells();
    let mut partial = ResultsSummary::new();
    partial.insert(cells[0].key(), full.get(&cells[0].key()).unwrap());
    partial.persist(&run_folder.join(SUMMARY_FILE)).unwrap();

    let resumed_params = ResolvedParams {
        resume_from: 1,
        ..params.clone()
    };
    let mut visited = Vec::new();
    let resumed = Sweep::new(&resumed_params, &loader, &run_folder)
        .run_with(|cell, _| visited.push(cell.index))
        .unwrap();

    assert_eq!(visited, vec![1]);
    assert_eq!(resumed.len(), 2);
    assert_close(&resumed, &full);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resumed_cell_overwrites_stale_summary_entry() {
    let (root, params) = setup("stale", true);
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    let full = Sweep::new(&params, &loader, &run_folder).run().unwrap();

    // an earlier session left a larger value for the cell being rerun
    let cells = Sweep::new(&params, &loader, &run_folder).cells();
    let mut stale = full.clone();
    stale.insert(cells[1].key(), 0.99);
    stale.persist(&run_folder.join(SUMMARY_FILE)).unwrap();

    let resumed_params = ResolvedParams {
        resume_from: 1,
        ..params.clone()
    };
    let resumed = Sweep::new(&resumed_params, &loader, &run_folder).run().unwrap();
    assert_close(&resumed, &full);

    let mean: ndarray::Array1<f64> = ndarray_npy::read_npy(
        cells[1].output_dir(&run_folder).join(SCORES_MEAN_FILE),
    )
    .unwrap();
    let best = mean.iter().copied().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    let stored = resumed.get(&cells[1].key()).unwrap();
    assert_eq!(stored, best);
    assert_ne!(stored, 0.99);

    let on_disk = ResultsSummary::load(&run_folder.join(SUMMARY_FILE)).unwrap();
    assert_close(&on_disk, &full);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resume_without_seed_reuses_recorded_seed() {
    let (root, params) = setup("reseed", true);
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    let full = Sweep::new(&params, &loader, &run_folder).run().unwrap();

    // `--resume-from 1` without `--seed` draws a fresh seed at resolve time
    let resumed_params = ResolvedParams {
        seed_arg: None,
        seed: params.seed.wrapping_add(1),
        resume_from: 1,
        ..params.clone()
    };
    let resumed = Sweep::new(&resumed_params, &loader, &run_folder).run().unwrap();
    assert_close(&resumed, &full);

    // the original record is left untouched
    let saved = ResolvedParams::load(&run_folder.join(PARAMS_FILE)).unwrap();
    assert_eq!(saved, params);
    assert_eq!(saved.resume_from, 0);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resume_rejects_conflicting_seed_or_grid() {
    let (root, params) = setup("conflict", true);
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    Sweep::new(&params, &loader, &run_folder).run().unwrap();

    let reseeded = ResolvedParams {
        seed_arg: Some(params.seed + 1),
        seed: params.seed + 1,
        resume_from: 1,
        ..params.clone()
    };
    let err = Sweep::new(&reseeded, &loader, &run_folder).run().unwrap_err();
    assert!(matches!(err, EncodingError::ResumeMismatch(_)));

    let other_grid = ResolvedParams {
        n_delays: params.n_delays + 1,
        resume_from: 1,
        ..params.clone()
    };
    let err = Sweep::new(&other_grid, &loader, &run_folder).run().unwrap_err();
    assert!(matches!(err, EncodingError::ResumeMismatch(_)));

    let saved = ResolvedParams::load(&run_folder.join(PARAMS_FILE)).unwrap();
    assert_eq!(saved, params);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn sampling_policy_with_bootstrap_ridge() {
    let (root, base) = setup("sampling", false);
    let params = ResolvedParams {
        cross_validation: CrossValidation::Simple,
        n_train_stories: vec![2],
        n_repeats: 3,
        ridge_implementation: RidgeImplementation::RidgeHuth,
        keep_train_stories_in_mem: false,
        ..base
    };
    let loader = loader(&root, &params);
    let run_folder = root.join("runs").join("r1");
    let summary = Sweep::new(&params, &loader, &run_folder).run().unwrap();
    assert_eq!(summary.len(), 1);

    let cell_dir = run_folder.join("UTS01").join("envelope").join("2").join("not_shuffled");
    for fold in 0..3 {
        let partition: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(cell_dir.join(format!("fold_{}", fold)).join("partition.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(partition["train"].as_array().unwrap().len(), 2);
        assert_eq!(partition["test"].as_array().unwrap().len(), 1);
    }

    let too_big = ResolvedParams {
        n_train_stories: vec![3],
        ..params
    };
    let err = Sweep::new(&too_big, &loader, root.join("runs").join("r2")).run().unwrap_err();
    assert!(matches!(err, EncodingError::TrainSizeTooLarge { .. }));

    let _ = fs::remove_dir_all(&root);
}
