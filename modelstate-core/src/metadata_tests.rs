#[cfg(test)]
mod tests {
    use crate::formats::StateFormatKind;
    use crate::metadata::CheckpointMetadata;
    use crate::tag::TagMode;
    use crate::PersistError;

    #[test]
    fn test_metadata_validation() {
        let metadata = CheckpointMetadata::new("job", 0).with_content_hash(b"state");
        assert!(metadata.validate().is_ok());

        let empty_job = CheckpointMetadata::new("", 0).with_content_hash(b"state");
        assert!(matches!(
            empty_job.validate(),
            Err(PersistError::MissingMetadata(field)) if field == "job_id"
        ));

        let unhashed = CheckpointMetadata::new("job", 0);
        assert!(matches!(
            unhashed.validate(),
            Err(PersistError::MissingMetadata(field)) if field == "content_hash"
        ));
    }

    #[test]
    fn test_metadata_special_characters() {
        let job_id = "job/with:special_chars_🚀";
        let metadata = CheckpointMetadata::new(job_id, 1)
            .with_description("ñandú <&> \"quoted\"")
            .with_content_hash(b"x");

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, metadata);
    }

    #[test]
    fn test_metadata_json_structure() {
        let metadata = CheckpointMetadata::new("forecast_job", 5)
            .with_encoding(StateFormatKind::Xml, TagMode::Readable)
            .with_content_hash(b"<model_state/>")
            .with_compressed_size(40);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["job_id"], "forecast_job");
        assert_eq!(json["checkpoint_index"], 5);
        assert_eq!(json["state_format"], "xml");
        assert_eq!(json["tag_mode"], "readable");
        assert_eq!(json["uncompressed_size"], 14);
        assert_eq!(json["compressed_size"], 40);
        assert_eq!(json["compression_algorithm"], "gzip");
        assert_eq!(json["format_version"], 1);
    }

    #[test]
    fn test_metadata_format_version_compatibility() {
        let mut metadata = CheckpointMetadata::new("job", 0);
        assert!(metadata.is_compatible());

        metadata.format_version = 2;
        assert!(!metadata.is_compatible());
    }

    #[test]
    fn test_checkpoint_ids_are_unique() {
        let first = CheckpointMetadata::new("job", 0);
        let second = CheckpointMetadata::new("job", 0);
        assert_ne!(first.checkpoint_id, second.checkpoint_id);
    }

    #[test]
    fn test_metadata_concurrent_creation() {
        use std::thread;

        let handles: Vec<_> = (0..10u64)
            .map(|i| {
                thread::spawn(move || {
                    CheckpointMetadata::new(format!("job_{i}"), i)
                        .with_content_hash(format!("state {i}").as_bytes())
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let metadata = handle.join().unwrap();
            assert_eq!(metadata.job_id, format!("job_{i}"));
            assert_eq!(metadata.checkpoint_index, i as u64);
            assert!(metadata
                .verify_integrity(format!("state {i}").as_bytes())
                .is_ok());
        }
    }
}
