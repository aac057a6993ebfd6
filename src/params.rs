use std::str::FromStr;

use crate::models::{ActionType, Category, Service};
use crate::service::SkipSegmentsQuery;

fn error_message(parameter: &str) -> String {
    format!("{} parameter does not match format requirements.", parameter)
}

fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

// A list may come as a JSON array under the plural key, or as repeated
// singular keys. `Ok(None)` means neither was given.
fn raw_list(pairs: &[(String, String)], plural: &str, singular: &str) -> Result<Option<Vec<String>>, String> {
    if let Some(raw) = first(pairs, plural) {
        return serde_json::from_str::<Vec<String>>(raw)
            .map(Some)
            .map_err(|_| error_message(plural));
    }

    let values: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k == singular)
        .map(|(_, v)| v.clone())
        .collect();
    Ok(if values.is_empty() { None } else { Some(values) })
}

fn enum_list<T: FromStr + Copy>(
    pairs: &[(String, String)],
    plural: &str,
    singular: &str,
    default: &[T],
) -> Result<Vec<T>, String> {
    match raw_list(pairs, plural, singular)? {
        Some(values) => values
            .iter()
            .map(|value| value.parse::<T>().map_err(|_| error_message(plural)))
            .collect(),
        None => Ok(default.to_vec()),
    }
}

/// Parses the query string of a skip-segments request. All problems are
/// collected so the client sees them at once.
pub fn parse_skip_segments(pairs: &[(String, String)]) -> Result<SkipSegmentsQuery, Vec<String>> {
    let mut errors = Vec::new();

    let categories = match enum_list(pairs, "categories", "category", &Category::DEFAULTS) {
        Ok(categories) if categories.is_empty() => {
            errors.push("No valid categories provided.".to_string());
            Vec::new()
        }
        Ok(categories) => categories,
        Err(e) => {
            errors.push(e);
            Vec::new()
        }
    };

    let action_types = enum_list(pairs, "actionTypes", "actionType", &ActionType::DEFAULTS).unwrap_or_else(|e| {
        errors.push(e);
        Vec::new()
    });

    let required_segments = match raw_list(pairs, "requiredSegments", "requiredSegment") {
        Ok(values) => values
            .unwrap_or_default()
            .into_iter()
            .filter(|uuid| !uuid.is_empty())
            .collect(),
        Err(e) => {
            errors.push(e);
            Vec::new()
        }
    };

    // Unknown services fall back to the default, like older clients expect
    let service = first(pairs, "service")
        .and_then(|s| s.parse::<Service>().ok())
        .unwrap_or_default();

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(SkipSegmentsQuery {
        categories,
        action_types,
        required_segments,
        service,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let query = parse_skip_segments(&[]).unwrap();
        assert_eq!(query.categories, Category::DEFAULTS.to_vec());
        assert!(!query.categories.contains(&Category::Chapter));
        assert_eq!(query.action_types, ActionType::DEFAULTS.to_vec());
        assert!(query.required_segments.is_empty());
        assert_eq!(query.service, Service::YouTube);
    }

    #[test]
    fn test_json_arrays() {
        let query = parse_skip_segments(&pairs(&[
            ("categories", r#"["sponsor","intro"]"#),
            ("actionTypes", r#"["skip"]"#),
            ("requiredSegments", r#"["abc",""]"#),
            ("service", "peertube"),
        ]))
        .unwrap();
        assert_eq!(query.categories, vec![Category::Sponsor, Category::Intro]);
        assert_eq!(query.action_types, vec![ActionType::Skip]);
        assert_eq!(query.required_segments, vec!["abc".to_string()]);
        assert_eq!(query.service, Service::PeerTube);
    }

    #[test]
    fn test_repeated_singular_keys() {
        let query = parse_skip_segments(&pairs(&[
            ("category", "sponsor"),
            ("category", "poi_highlight"),
            ("requiredSegment", "u1"),
        ]))
        .unwrap();
        assert_eq!(query.categories, vec![Category::Sponsor, Category::PoiHighlight]);
        assert_eq!(query.required_segments, vec!["u1".to_string()]);
    }

    #[test]
    fn test_errors_are_collected() {
        let errors = parse_skip_segments(&pairs(&[
            ("categories", "sponsor"),
            ("actionType", "explode"),
        ]))
        .unwrap_err();
        assert_eq!(
            errors,
            vec![
                "categories parameter does not match format requirements.".to_string(),
                "actionTypes parameter does not match format requirements.".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_category_list() {
        let errors = parse_skip_segments(&pairs(&[("categories", "[]")])).unwrap_err();
        assert_eq!(errors, vec!["No valid categories provided.".to_string()]);
    }

    #[test]
    fn test_unknown_service_falls_back() {
        let query = parse_skip_segments(&pairs(&[("service", "vimeo")])).unwrap();
        assert_eq!(query.service, Service::YouTube);
    }
}
