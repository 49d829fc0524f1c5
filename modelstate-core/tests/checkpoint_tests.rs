/*!
End-to-end checkpoint tests: stateful components through the engine to local
storage and back, for both state formats.
*/

use modelstate_core::dispatch::{persist_tagged, restore_tagged};
use modelstate_core::state::{
    CategoryExamplesCollector, Decomposition, DecompositionRestoreParams,
    DistributionRestoreParams, LoopProgress, ModelRestoreParams, Prior, TimeSeriesDecomposition,
    TimeSeriesModelState,
};
use modelstate_core::{
    create_engine_from_config, CheckpointConfig, CheckpointMetadata, PersistError, Tag, TagMode,
};
use tempfile::TempDir;

const MODELS_TAG: Tag = Tag::new("a", "models");
const EXAMPLES_TAG: Tag = Tag::new("b", "examples");
const PRIOR_TAG: Tag = Tag::new("c", "prior");

fn params() -> ModelRestoreParams {
    ModelRestoreParams {
        decomposition: DecompositionRestoreParams::new(0.012, 3600),
        distribution: DistributionRestoreParams::new(0.012),
    }
}

fn series_model(id: usize) -> TimeSeriesModelState {
    let params = params();
    let mut decomposition = TimeSeriesDecomposition::new(&params.decomposition);
    decomposition.observe(1_700_000_000 + id as i64 * 60);
    decomposition.set_trend(vec![12.5, -0.25, 1e-9]);
    decomposition
        .add_component(86_400)
        .unwrap()
        .values
        .extend([0.5, -0.5, f64::MIN_POSITIVE]);

    let mut model = TimeSeriesModelState::new(
        id,
        Decomposition::Full(decomposition),
        Prior::poisson(&params.distribution),
    );
    let mut progress = LoopProgress::new(50);
    progress.increment(17);
    model.progress = Some(progress);
    model
}

fn job_state() -> (Vec<TimeSeriesModelState>, CategoryExamplesCollector) {
    let models = vec![series_model(0), series_model(1)];
    let mut examples = CategoryExamplesCollector::new(3);
    examples.add(2, "connection reset by peer");
    examples.add(2, "connection refused <10.0.0.7>");
    examples.add(9, "disk & quota exceeded");
    (models, examples)
}

fn roundtrip(config: CheckpointConfig) {
    let temp_dir = TempDir::new().unwrap();
    let engine = create_engine_from_config(&config.with_base_path(temp_dir.path())).unwrap();
    let (models, examples) = job_state();
    let prior = Prior::normal(&params().distribution);

    let mut inserter = engine.inserter("anomaly_detector");
    for model in &models {
        inserter.insert_state(MODELS_TAG, model);
    }
    inserter.insert_state(EXAMPLES_TAG, &examples);
    inserter.insert_level(PRIOR_TAG, |inserter| persist_tagged(&prior, inserter));

    let path = format!("jobs/forecast/0.{}.gz", engine.state_format().kind().extension());
    let saved = engine
        .save_document(
            &inserter.into_document(),
            &CheckpointMetadata::new("forecast", 0).with_description("end to end"),
            &path,
        )
        .unwrap();
    assert!(temp_dir.path().join(&path).is_file());

    let params = params();
    let (metadata, (restored_models, restored_examples, restored_prior)) = engine
        .load_with(&path, |traverser| {
            let mut models = Vec::new();
            let mut examples = None;
            let mut prior = None;
            traverser.each_node(|traverser| {
                let name = traverser.name();
                if MODELS_TAG == name {
                    models.push(traverser.traverse_sub_level(|traverser| {
                        TimeSeriesModelState::restore(&params, traverser)
                    })?);
                } else if EXAMPLES_TAG == name {
                    examples = Some(traverser.restore::<CategoryExamplesCollector>()?);
                } else if PRIOR_TAG == name {
                    prior = Some(traverser.traverse_sub_level(|traverser| {
                        restore_tagged::<Prior>(&params.distribution, traverser)
                    })?);
                }
                Ok(())
            })?;
            Ok((models, examples, prior))
        })
        .unwrap();

    assert_eq!(metadata.content_hash, saved.content_hash);
    assert_eq!(metadata.state_format, engine.state_format().kind());
    assert_eq!(restored_models, models);
    assert_eq!(restored_examples, Some(examples));
    assert_eq!(restored_prior, Some(prior));
}

#[test]
fn test_compact_json_job_roundtrip() {
    roundtrip(CheckpointConfig::default_json());
}

#[test]
fn test_compact_xml_job_roundtrip() {
    roundtrip(CheckpointConfig::default_xml());
}

#[test]
fn test_readable_xml_job_roundtrip() {
    roundtrip(CheckpointConfig::readable_xml());
}

#[test]
fn test_readable_tags_are_recorded() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = CheckpointConfig::default_json().with_base_path(temp_dir.path());
    config.readable_tags = true;
    let engine = create_engine_from_config(&config).unwrap();

    let model = series_model(4);
    engine
        .save_state("model", &model, &CheckpointMetadata::new("job", 0), "m.json.gz")
        .unwrap();

    let (metadata, document) = engine.load("m.json.gz").unwrap();
    assert_eq!(metadata.tag_mode, TagMode::Readable);
    assert_eq!(document.children[0].name, "id");
}

#[test]
fn test_stub_decomposition_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let engine =
        create_engine_from_config(&CheckpointConfig::default_xml().with_base_path(temp_dir.path()))
            .unwrap();
    let params = params();
    let model = TimeSeriesModelState::new(
        3,
        Decomposition::Stub,
        Prior::normal(&params.distribution),
    );
    assert!(!model.is_forecastable);

    engine
        .save_state("model", &model, &CheckpointMetadata::new("job", 1), "stub.xml.gz")
        .unwrap();
    let (_, restored) = engine
        .load_with("stub.xml.gz", |traverser| TimeSeriesModelState::restore(&params, traverser))
        .unwrap();
    assert_eq!(restored, model);
}

#[test]
fn test_corrupted_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let engine =
        create_engine_from_config(&CheckpointConfig::default_json().with_base_path(temp_dir.path()))
            .unwrap();
    let (_, examples) = job_state();
    engine
        .save_state("examples", &examples, &CheckpointMetadata::new("job", 0), "c.json.gz")
        .unwrap();

    let file = temp_dir.path().join("c.json.gz");
    let mut bytes = std::fs::read(&file).unwrap();
    bytes.truncate(bytes.len() / 2);
    std::fs::write(&file, bytes).unwrap();

    assert!(matches!(
        engine.verify("c.json.gz"),
        Err(PersistError::Compression(_))
    ));
}

#[test]
fn test_checkpoint_series_listing() {
    let temp_dir = TempDir::new().unwrap();
    let engine =
        create_engine_from_config(&CheckpointConfig::default_json().with_base_path(temp_dir.path()))
            .unwrap();

    for index in 0..4u64 {
        let mut progress = LoopProgress::new(4);
        progress.increment(index as usize);
        let metadata = CheckpointMetadata::new("training", index);
        let path = format!("training/{}", metadata.suggested_filename());
        engine.save_state("progress", &progress, &metadata, &path).unwrap();
    }

    let paths = engine.list("training/").unwrap();
    assert_eq!(paths.len(), 4);
    let mut indices: Vec<u64> = paths
        .iter()
        .map(|path| engine.metadata(path).unwrap().checkpoint_index)
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}
