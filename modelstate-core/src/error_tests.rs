/*!
Tests for error handling and error types.
*/

#[cfg(test)]
mod tests {
    use crate::error::PersistError;
    use std::io;

    #[test]
    fn test_persist_error_display() {
        let error = PersistError::validation("test validation error");
        assert_eq!(error.to_string(), "Validation error: test validation error");

        let error = PersistError::compression("test compression error");
        assert_eq!(error.to_string(), "Compression error: test compression error");

        let error = PersistError::format("unterminated element");
        assert_eq!(error.to_string(), "Format error: unterminated element");
    }

    #[test]
    fn test_tag_mismatch_display() {
        let error = PersistError::TagMismatch {
            family: "decomposition".to_string(),
            found: 2,
        };
        assert_eq!(
            error.to_string(),
            "Expected exactly 1 decomposition tag, found 2"
        );
    }

    #[test]
    fn test_value_decode_display() {
        let error = PersistError::value_decode("abc", "f64");
        assert!(error.to_string().contains("'abc'"));
        assert!(error.to_string().contains("f64"));
    }

    #[test]
    fn test_size_bound_violation_display() {
        let error = PersistError::SizeBoundViolation { size: 1, max: 0 };
        assert!(error.to_string().contains("maximum document size 0"));
    }

    #[test]
    fn test_persist_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let persist_error = PersistError::from(io_error);

        match persist_error {
            PersistError::Io(ref io_err) => assert_eq!(io_err.kind(), io::ErrorKind::NotFound),
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_persist_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let persist_error = PersistError::from(json_error);

        assert!(matches!(persist_error, PersistError::Json(_)));
    }

    #[test]
    fn test_integrity_check_failed_error() {
        let error = PersistError::IntegrityCheckFailed {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };

        assert!(error.to_string().contains("abc123"));
        assert!(error.to_string().contains("def456"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PersistError>();
        assert_sync::<PersistError>();
    }

    #[test]
    fn test_error_result_type() {
        fn returns_error() -> crate::Result<()> {
            Err(PersistError::ScopeImbalance("ended root".to_string()))
        }

        assert!(matches!(
            returns_error(),
            Err(PersistError::ScopeImbalance(_))
        ));
    }
}
