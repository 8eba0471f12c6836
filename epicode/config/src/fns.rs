use hashbrown::HashMap;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::{CliError, ParamValue, SHORTEN_MIN_LENGTH};

/// Finds the longest substring shared by all names.
///
/// Candidates are taken from the first name, scanning start positions left
/// to right, so on ties the leftmost substring wins. Fewer than two names
/// (or an empty first name) yield an empty string.
///
/// # Example
///
/// ```rust
/// use config::common_substring;
///
/// let names = vec!["sampleA_H3K4me3".to_string(), "sampleA_H3K27ac".to_string()];
/// assert_eq!(common_substring(&names), "sampleA_H3K");
/// ```
pub fn common_substring<S: AsRef<str>>(names: &[S]) -> String {
    let mut substr = String::new();

    if names.len() < 2 || names[0].as_ref().is_empty() {
        return substr;
    }

    let first: Vec<char> = names[0].as_ref().chars().collect();
    let mut best = 0;

    for i in 0..first.len() {
        for j in (best + 1)..=(first.len() - i) {
            let candidate: String = first[i..i + j].iter().collect();
            if names.iter().all(|name| name.as_ref().contains(&candidate)) {
                best = j;
                substr = candidate;
            }
        }
    }

    substr
}

/// Removes the common substring of all names when it is long enough to be
/// a shared prefix/suffix rather than a coincidence.
pub fn shorten_names(names: &[String]) -> Vec<String> {
    let fx = common_substring(names);

    if fx.chars().count() > SHORTEN_MIN_LENGTH {
        log::info!("Shortening names by removing: {}", fx);
        names.iter().map(|name| name.replace(&fx, "")).collect()
    } else {
        names.to_vec()
    }
}

/// Parses a "key:value,key:value" string, guessing int > float > string
/// for every value.
pub fn parse_params(params: Option<&str>) -> Result<HashMap<String, ParamValue>, CliError> {
    let mut kwargs = HashMap::new();

    let params = match params {
        Some(params) if !params.trim().is_empty() => params,
        _ => return Ok(kwargs),
    };

    for param in params.split(',') {
        let (k, v) = match param.split_once(':') {
            Some((k, v)) if !k.is_empty() && !v.contains(':') => (k.trim(), v.trim()),
            _ => {
                return Err(CliError::InvalidInput(format!(
                    "ERROR: malformed parameter {:?}, expected key:value",
                    param
                )))
            }
        };

        let value = if let Ok(v) = v.parse::<i64>() {
            ParamValue::Int(v)
        } else if let Ok(v) = v.parse::<f64>() {
            ParamValue::Float(v)
        } else {
            ParamValue::Str(v.to_string())
        };

        kwargs.insert(k.to_string(), value);
    }

    Ok(kwargs)
}

/// Deterministic run id derived from the input files of a run
pub fn run_id<P: AsRef<Path>>(parts: &[P]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.as_ref().hash(&mut hasher);
    }

    hasher.finish().to_string()
}

/// Replaces only the last occurrence of `from` in `name`
pub fn replace_last(name: &str, from: &str, to: &str) -> String {
    match name.rfind(from) {
        Some(idx) => format!("{}{}{}", &name[..idx], to, &name[idx + from.len()..]),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_substring() {
        let names = vec![
            "HepG2_H3K4me3_rep1".to_string(),
            "HepG2_H3K27ac_rep1".to_string(),
            "HepG2_H3K36me3_rep1".to_string(),
        ];

        assert_eq!(common_substring(&names), "HepG2_H3K");
        assert_eq!(common_substring(&names[..1]), "");
        assert_eq!(common_substring(&["".to_string(), "abc".to_string()]), "");
    }

    #[test]
    fn test_common_substring_prefers_leftmost_on_ties() {
        let names = vec!["abXcd".to_string(), "cdYab".to_string()];
        assert_eq!(common_substring(&names), "ab");
    }

    #[test]
    fn test_shorten_names_requires_long_common_part() {
        let names = vec![
            "wgEncodeH3k4me3".to_string(),
            "wgEncodeH3k27ac".to_string(),
        ];
        assert_eq!(shorten_names(&names), vec!["4me3", "27ac"]);

        let names = vec!["H3K4me3".to_string(), "H3K27ac".to_string()];
        assert_eq!(shorten_names(&names), names);
    }

    #[test]
    fn test_parse_params_guesses_types() {
        let params = parse_params(Some("max_iter:200,tol:1e-5,mode:fast")).unwrap();

        assert_eq!(params.get("max_iter"), Some(&ParamValue::Int(200)));
        assert_eq!(params.get("tol"), Some(&ParamValue::Float(1e-5)));
        assert_eq!(
            params.get("mode"),
            Some(&ParamValue::Str("fast".to_string()))
        );

        assert!(parse_params(None).unwrap().is_empty());
        assert!(parse_params(Some("max_iter")).is_err());
        assert!(parse_params(Some("a:b:c")).is_err());
    }

    #[test]
    fn test_run_id_is_stable() {
        let a = run_id(&["regions.bed", "a.bam", "b.bam"]);
        let b = run_id(&["regions.bed", "a.bam", "b.bam"]);
        let c = run_id(&["regions.bed", "b.bam", "a.bam"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_replace_last() {
        assert_eq!(replace_last("a:b:a", ":a", ":g"), "a:b:g");
        assert_eq!(replace_last("H3K4me3:b", ":b", ":l"), "H3K4me3:l");
        assert_eq!(replace_last("H3K4me3", ":a", ":g"), "H3K4me3");
    }
}
