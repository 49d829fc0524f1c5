/*!
Chunked export of trained models: chunk arithmetic over real exports,
reconstruction and the pruned ensemble scenario.
*/

use modelstate_core::model::{
    AggregateOutput, DecisionType, Ensemble, FrequencyEncoding, NodeKind, OneHotEncoding,
    SplitNode, TargetMeanEncoding, TargetType, TrainedModel, Tree, TreeNode,
};
use modelstate_core::{
    ChunkedExporter, CompressedDocument, CompressionAdapter, ExportConfig, GzipCompressor,
    ModelDefinition, NoCompression, PersistError,
};
use serde_json::Value;
use std::collections::BTreeMap;

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn split(feature: usize, threshold: f64, left: usize, right: usize) -> SplitNode {
    SplitNode {
        split_feature: feature,
        threshold,
        default_left: true,
        decision_type: DecisionType::Lt,
        left_child: left,
        right_child: right,
        split_gain: Some(threshold * 2.0),
    }
}

/// A complete binary tree of `depth` levels splitting on `features` in turn.
fn deep_tree(feature_names: &[String], features: &[usize], depth: usize) -> Tree {
    let internal = (1usize << depth) - 1;
    let mut nodes = Vec::new();
    for index in 0..internal {
        let level = (index + 1).ilog2() as usize;
        let feature = features[level % features.len()];
        nodes.push(TreeNode::split(
            index,
            100,
            split(feature, index as f64 * 0.125, 2 * index + 1, 2 * index + 2),
        ));
    }
    for index in internal..(2 * internal + 1) {
        nodes.push(TreeNode::leaf(index, 10, vec![index as f64 / 7.0]));
    }
    Tree::new(feature_names.to_vec(), TargetType::Regression, nodes).unwrap()
}

fn large_definition(trees: usize) -> ModelDefinition {
    let feature_names = names(&["colour_red", "size_freq", "shape_mean", "f4", "f5"]);
    let members = (0..trees)
        .map(|tree| deep_tree(&feature_names, &[tree % 5, (tree + 2) % 5], 6))
        .collect();
    let ensemble = Ensemble::new(
        feature_names,
        TargetType::Regression,
        members,
        AggregateOutput::WeightedSum(vec![0.5; trees]),
    )
    .unwrap();

    let mut definition = ModelDefinition::new(ensemble.into());
    definition.add_preprocessor(OneHotEncoding::new(
        "colour",
        BTreeMap::from([("red".to_string(), "colour_red".to_string())]),
    ));
    definition.add_preprocessor(FrequencyEncoding::new(
        "size",
        "size_freq",
        BTreeMap::from([("small".to_string(), 0.25), ("large".to_string(), 0.75)]),
    ));
    definition.add_preprocessor(TargetMeanEncoding::new(
        "shape",
        "shape_mean",
        BTreeMap::from([("round".to_string(), 1.5)]),
        0.5,
    ));
    definition
}

fn encoded_text(documents: &[CompressedDocument]) -> String {
    documents.iter().map(|d| d.definition.as_str()).collect()
}

#[test]
fn test_document_count_follows_encoded_length() {
    let definition = large_definition(12);
    let whole = ChunkedExporter::new().export_documents(&definition).unwrap();
    assert_eq!(whole.len(), 1);
    let encoded = encoded_text(&whole);
    let length = encoded.len();
    assert!(length > 1000);

    for max in [64, 100, 997, length / 3, length, length - 1, length + 1] {
        let exporter = ChunkedExporter::new().with_max_document_size(max).unwrap();
        let documents = exporter.export_documents(&definition).unwrap();

        let (k, r) = (length / max, length % max);
        let expected = if r == 0 { k } else { k + 1 };
        assert_eq!(documents.len(), expected, "max {max}");
        for (index, document) in documents.iter().enumerate() {
            assert_eq!(document.doc_num, index);
            assert_eq!(document.eos, index + 1 == documents.len());
            assert!(document.definition.len() <= max);
        }
        assert_eq!(encoded_text(&documents), encoded);
        assert_eq!(exporter.reassemble_definition(documents).unwrap(), definition);
    }
}

#[test]
fn test_reassembled_json_is_byte_identical() {
    let definition = large_definition(3);
    let exporter = ChunkedExporter::from_config(&ExportConfig {
        max_document_size: 128,
        compression_level: 9,
    })
    .unwrap();

    let documents = exporter.export_documents(&definition).unwrap();
    let json = exporter.reassemble(documents).unwrap();
    assert_eq!(json, definition.json_string().unwrap().into_bytes());
}

#[test]
fn test_exported_stream_is_gzip_of_definition() {
    use base64::Engine as _;

    let definition = large_definition(2);
    let documents = ChunkedExporter::new().export_documents(&definition).unwrap();
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(encoded_text(&documents))
        .unwrap();
    assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
    let json = GzipCompressor::new().decompress(&compressed).unwrap();
    assert_eq!(json, definition.json_string().unwrap().into_bytes());
}

#[test]
fn test_json_lines_roundtrip() {
    let definition = large_definition(4);
    let exporter = ChunkedExporter::with_compressor(NoCompression::new())
        .with_max_document_size(256)
        .unwrap();

    let lines = exporter.export_json_lines(&definition, Vec::new()).unwrap();
    let text = String::from_utf8(lines.clone()).unwrap();
    let parsed: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(parsed.len() > 1);
    assert!(parsed
        .iter()
        .all(|document| document["compressed_definition"]["doc_num"].is_u64()));
    assert_eq!(
        parsed.last().unwrap()["compressed_definition"]["eos"],
        Value::Bool(true)
    );

    let json = exporter.reassemble_json_lines(lines.as_slice()).unwrap();
    assert_eq!(ModelDefinition::from_json_slice(&json).unwrap(), definition);
}

#[test]
fn test_broken_sequences_are_rejected() {
    let exporter = ChunkedExporter::new().with_max_document_size(40).unwrap();
    let documents = exporter.export_documents(&large_definition(1)).unwrap();
    assert!(documents.len() > 2);

    let mut missing_middle = documents.clone();
    missing_middle.remove(1);
    assert!(matches!(
        exporter.reassemble(missing_middle),
        Err(PersistError::Format(_))
    ));

    let mut no_end = documents.clone();
    no_end.pop();
    assert!(exporter.reassemble(no_end).is_err());

    let mut after_end = documents.clone();
    after_end.push(CompressedDocument {
        doc_num: documents.len(),
        definition: "AAAA".to_string(),
        eos: false,
    });
    assert!(exporter.reassemble(after_end).is_err());

    assert!(matches!(
        ChunkedExporter::new().with_max_document_size(0),
        Err(PersistError::SizeBoundViolation { max: 0, .. })
    ));
}

#[test]
fn test_pruned_ensemble_scenario_survives_export() {
    let feature_names = names(&["f1", "f2", "f3"]);
    let stump = |feature: usize, left: f64, right: f64| {
        Tree::new(
            feature_names.clone(),
            TargetType::Regression,
            vec![
                TreeNode::split(0, 4, split(feature, 0.5, 1, 2)),
                TreeNode::leaf(1, 2, vec![left]),
                TreeNode::leaf(2, 2, vec![right]),
            ],
        )
        .unwrap()
    };
    let ensemble = Ensemble::new(
        feature_names.clone(),
        TargetType::Regression,
        vec![stump(0, 1.0, 2.0), stump(2, 10.0, 20.0)],
        AggregateOutput::WeightedSum(vec![1.0, 1.0]),
    )
    .unwrap();
    let before = ensemble.evaluate(&[0.0, 9.0, 1.0]).unwrap();

    let mut definition = ModelDefinition::new(ensemble.into());
    assert_eq!(
        definition.trained_model_mut().remove_unused_features(),
        ["f1", "f3"]
    );

    let exporter = ChunkedExporter::new().with_max_document_size(32).unwrap();
    let restored = exporter
        .reassemble_definition(exporter.export_documents(&definition).unwrap())
        .unwrap();
    assert_eq!(restored, definition);

    let TrainedModel::Ensemble(ensemble) = restored.trained_model() else {
        panic!("expected an ensemble");
    };
    assert_eq!(ensemble.feature_names(), ["f1", "f3"]);
    for tree in ensemble.trees() {
        assert_eq!(tree.feature_names(), ["f1", "f3"]);
    }
    assert_eq!(ensemble.evaluate(&[0.0, 1.0]).unwrap(), before);
}

#[test]
fn test_non_finite_values_survive_export() {
    let tree = Tree::new(
        names(&["x"]),
        TargetType::Regression,
        vec![
            TreeNode::split(0, 4, split(0, f64::INFINITY, 1, 2)),
            TreeNode::leaf(1, 2, vec![f64::NAN]),
            TreeNode::leaf(2, 2, vec![f64::NEG_INFINITY, 0.5]),
        ],
    )
    .unwrap();
    let definition = ModelDefinition::new(tree.into());
    let json = definition.json_string().unwrap();
    assert!(json.contains(r#""leaf_value":"nan""#));
    assert!(!json.contains("null"));

    let exporter = ChunkedExporter::new().with_max_document_size(16).unwrap();
    let restored = exporter
        .reassemble_definition(exporter.export_documents(&definition).unwrap())
        .unwrap();
    let TrainedModel::Tree(tree) = restored.trained_model() else {
        panic!("expected a tree");
    };
    let NodeKind::Split(root) = &tree.nodes()[0].kind else {
        panic!("expected a split");
    };
    assert_eq!(root.threshold, f64::INFINITY);
    assert_eq!(root.split_gain, Some(f64::INFINITY));
    let NodeKind::Leaf(nan_leaf) = &tree.nodes()[1].kind else {
        panic!("expected a leaf");
    };
    assert!(nan_leaf[0].is_nan());
    assert_eq!(tree.nodes()[2].kind, NodeKind::Leaf(vec![f64::NEG_INFINITY, 0.5]));
}
