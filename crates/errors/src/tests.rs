mod error_tests {
    use crate::*;

    #[test]
    fn test_error_display() {
        let err = TaskAssigningError::TaskNotFound { id: 123 };
        assert_eq!(err.to_string(), "任务未找到: 123");

        let err = TaskAssigningError::immutable("哨兵任务 -1");
        assert_eq!(err.to_string(), "不可变实体不允许修改: 哨兵任务 -1");

        let err = TaskAssigningError::MalformedRowGrouping { task_id: 7 };
        assert!(err.to_string().contains("任务 7"));
    }

    #[test]
    fn test_status_mismatch_names_task_status_and_allowed_set() {
        let err = TaskAssigningError::status_mismatch(42, "Completed", &["Ready", "Reserved"]);
        let message = err.to_string();
        assert!(message.contains("42"));
        assert!(message.contains("Completed"));
        assert!(message.contains("Ready"));
        assert!(message.contains("Reserved"));

        match err {
            TaskAssigningError::StatusMismatch { allowed, .. } => {
                assert_eq!(allowed, vec!["Ready".to_string(), "Reserved".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_programming_error() {
        assert!(TaskAssigningError::immutable("x").is_programming_error());
        assert!(TaskAssigningError::invariant("x").is_programming_error());
        assert!(!TaskAssigningError::task_not_found(1).is_programming_error());
        assert!(!TaskAssigningError::status_mismatch(1, "Completed", &["Ready"]).is_programming_error());
    }

    #[test]
    fn test_is_retryable() {
        assert!(TaskAssigningError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!TaskAssigningError::status_mismatch(1, "Completed", &["Ready"]).is_retryable());
        assert!(!TaskAssigningError::config_error("bad").is_retryable());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(TaskAssigningError::task_not_found(1).user_message(), "请求的任务不存在");
        assert_eq!(
            TaskAssigningError::invalid_row("owner").user_message(),
            "查询结果格式错误"
        );
        assert_eq!(
            TaskAssigningError::Internal("boom".to_string()).user_message(),
            "系统繁忙，请稍后重试"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: TaskAssigningError = json_error.into();
        assert!(matches!(err, TaskAssigningError::Serialization(_)));
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: TaskAssigningError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, TaskAssigningError::Internal(ref m) if m == "boom"));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TaskAssigningError>();
    }
}
