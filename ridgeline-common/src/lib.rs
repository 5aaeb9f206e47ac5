//! Common types for the ridgeline routing toolkit

pub mod error;

pub use error::{
    suggest_name, ConfigError, PointFailure, PointFailureReason, Result, RouteError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_name_finds_close_profile() {
        let profiles = ["car", "bike", "foot_fastest"];
        assert_eq!(
            suggest_name("foot_fastst", profiles.iter().copied()),
            Some("foot_fastest".to_string())
        );
    }

    #[test]
    fn suggest_name_ignores_exact_and_unrelated() {
        let profiles = ["car", "bike"];
        assert_eq!(suggest_name("CAR", profiles.iter().copied()), None);
        assert_eq!(suggest_name("helicopter", profiles.iter().copied()), None);
    }

    #[test]
    fn unknown_profile_message_carries_suggestion() {
        let err = RouteError::from(ConfigError::UnknownProfile {
            name: "cra".to_string(),
            suggestion: Some("car".to_string()),
        });
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "configuration error: profile 'cra' does not exist (did you mean 'car'?)"
        );
    }

    #[test]
    fn search_limit_is_not_fatal() {
        let err = RouteError::SearchLimit {
            visited: 11,
            limit: 10,
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("limit is 10"));
    }

    #[test]
    fn point_resolution_lists_every_failure() {
        let err = RouteError::PointResolution {
            failures: vec![
                PointFailure {
                    index: 0,
                    lat: 1.0,
                    lon: 2.0,
                    reason: PointFailureReason::NoMatch,
                },
                PointFailure {
                    index: 2,
                    lat: 3.0,
                    lon: 4.0,
                    reason: PointFailureReason::EmptyIndex,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("point 0"));
        assert!(msg.contains("point 2"));
        assert!(msg.contains("location index is empty"));
    }
}
